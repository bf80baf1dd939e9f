//! The opaque-predicate elimination pass

use std::time::Instant;

use tracing::debug;

use crate::features::printing::print_expression;
use crate::features::smt::solver::{SatResult, SmtSolver};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::pass::{MetricsRecorder, Pass, PassContext, PassOutcome, Warning};
use crate::shared::models::node::{LiteralValue, NodeId, NodeKind};
use crate::shared::models::IrState;

use super::lowering::ir_to_smt;
use super::patterns::{match_opaque, PatternVerdict};

pub struct OpaquePredicatePass;

impl Pass for OpaquePredicatePass {
    fn name(&self) -> &'static str {
        "opaque-predicate-elimination"
    }

    fn description(&self) -> &'static str {
        "collapse branch conditions whose truth value is fixed on all inputs"
    }

    fn mutates_control_flow(&self) -> bool {
        true
    }

    fn run(&self, mut state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome> {
        let mut recorder = MetricsRecorder::start();
        let mut warnings = Vec::new();
        let mut changed = false;

        // The solver session is owned by this pass and disposed on exit
        let mut solver = ctx.solver.map(|f| f.open());
        if let Some(s) = solver.as_mut() {
            s.initialize();
            s.set_timeout(ctx.config.smt_query_timeout_ms);
        }
        let pass_deadline = Instant::now();

        // Branch-condition sites, collected before mutation
        let sites = condition_sites(&state);
        for site in sites {
            ctx.cancel.check("opaque-predicate-elimination")?;
            let Some(expr) = site.test(&state) else { continue };
            if matches!(state.kind(expr), Some(NodeKind::Literal { .. })) {
                continue;
            }

            let verdict = compute_verdict(&state, expr, &mut solver, ctx, &pass_deadline);
            let Some(verdict) = verdict else { continue };

            if verdict.confidence < ctx.config.apply_confidence_threshold {
                warnings.push(
                    Warning::suggestion(
                        "opaque.low_confidence",
                        format!(
                            "`{}` looks {} (pattern {}, confidence {:.2})",
                            print_expression(&state, expr),
                            if verdict.value { "always true" } else { "always false" },
                            verdict.pattern,
                            verdict.confidence
                        ),
                        if verdict.value { "true" } else { "false" },
                    )
                    .at(expr),
                );
                continue;
            }

            debug!(
                pattern = verdict.pattern,
                value = verdict.value,
                confidence = verdict.confidence,
                "opaque predicate collapsed"
            );
            apply_verdict(&mut state, &site, expr, verdict.value, &mut recorder);
            changed = true;
        }

        if let Some(mut s) = solver {
            s.dispose();
        }

        let metrics = recorder.finish();
        Ok(if changed {
            PassOutcome::changed(state, metrics).with_warnings(warnings)
        } else {
            PassOutcome::unchanged(state, metrics).with_warnings(warnings)
        })
    }
}

/// Where a boolean test sits
#[derive(Debug, Clone, Copy)]
enum Site {
    IfTest(NodeId),
    WhileTest(NodeId),
    DoWhileTest(NodeId),
    ForTest(NodeId),
    TernaryTest(NodeId),
}

impl Site {
    fn test(&self, state: &IrState) -> Option<NodeId> {
        match self {
            Site::IfTest(stmt) => match state.kind(*stmt)? {
                NodeKind::If { test, .. } => Some(*test),
                _ => None,
            },
            Site::WhileTest(stmt) => match state.kind(*stmt)? {
                NodeKind::While { test, .. } => Some(*test),
                _ => None,
            },
            Site::DoWhileTest(stmt) => match state.kind(*stmt)? {
                NodeKind::DoWhile { test, .. } => Some(*test),
                _ => None,
            },
            Site::ForTest(stmt) => match state.kind(*stmt)? {
                NodeKind::For { test, .. } => *test,
                _ => None,
            },
            Site::TernaryTest(expr) => match state.kind(*expr)? {
                NodeKind::Conditional { test, .. } => Some(*test),
                _ => None,
            },
        }
    }
}

fn condition_sites(state: &IrState) -> Vec<Site> {
    let mut sites = Vec::new();
    for node in state.subtree_nodes(state.root) {
        match state.kind(node) {
            Some(NodeKind::If { .. }) => sites.push(Site::IfTest(node)),
            Some(NodeKind::While { .. }) => sites.push(Site::WhileTest(node)),
            Some(NodeKind::DoWhile { .. }) => sites.push(Site::DoWhileTest(node)),
            Some(NodeKind::For { test: Some(_), .. }) => sites.push(Site::ForTest(node)),
            Some(NodeKind::Conditional { .. }) => sites.push(Site::TernaryTest(node)),
            _ => {}
        }
    }
    sites
}

/// Lower the test and ask the solver about both polarities. The answer
/// pair (negation unsat, expression sat) certifies a tautology, the
/// mirror pair a contradiction; timeouts read as unknown.
fn compute_verdict(
    state: &IrState,
    expr: NodeId,
    solver: &mut Option<Box<dyn SmtSolver>>,
    ctx: &PassContext<'_>,
    pass_started: &Instant,
) -> Option<PatternVerdict> {
    match match_opaque(state, expr) {
        Some(v) => Some(v),
        None => solver_verdict(state, expr, solver.as_deref_mut(), ctx, pass_started),
    }
}

fn solver_verdict(
    state: &IrState,
    expr: NodeId,
    solver: Option<&mut (dyn SmtSolver + 'static)>,
    ctx: &PassContext<'_>,
    pass_started: &Instant,
) -> Option<PatternVerdict> {
    let solver = solver?;
    let smt_expr = ir_to_smt(state, expr)?;
    let complexity = smt_expr.node_count();
    if complexity > ctx.config.smt_complexity_bound {
        return None;
    }
    if pass_started.elapsed().as_millis() as u64 > ctx.config.smt_pass_budget_ms {
        return None;
    }

    solver.push();
    solver.add_constraint(smt_expr.clone());
    let positive = solver.check_sat();
    solver.pop();

    solver.push();
    solver.add_constraint(smt_expr.negated());
    let negative = solver.check_sat();
    solver.pop();

    let value = match (negative, positive) {
        (SatResult::Unsat, SatResult::Sat) => true,
        (SatResult::Sat, SatResult::Unsat) => false,
        _ => return None,
    };
    // Solver certainty, discounted by expression size
    let confidence = (0.95 - complexity as f64 * 0.005).max(0.7);
    Some(PatternVerdict {
        value,
        confidence,
        pattern: "smt",
    })
}

/// Replace the test with its literal and canonicalize the construct
fn apply_verdict(
    state: &mut IrState,
    site: &Site,
    test: NodeId,
    value: bool,
    recorder: &mut MetricsRecorder,
) {
    // The old condition subtree dies; the test slot becomes a literal
    for node in state.subtree_nodes(test) {
        if node != test {
            state.nodes.remove(&node);
            recorder.removed(1);
        }
    }
    state.replace_kind(
        test,
        NodeKind::Literal {
            value: LiteralValue::Boolean(value),
        },
    );
    recorder.changed(1);

    match site {
        Site::IfTest(stmt) => {
            let Some(NodeKind::If {
                consequent,
                alternate,
                ..
            }) = state.kind(*stmt).cloned()
            else {
                return;
            };
            state.nodes.remove(&test);
            let (keep, drop) = if value {
                (Some(consequent), alternate)
            } else {
                (alternate, Some(consequent))
            };
            if let Some(drop) = drop {
                for node in state.subtree_nodes(drop) {
                    state.nodes.remove(&node);
                    recorder.removed(1);
                }
            }
            match keep {
                Some(keep) => {
                    if let Some(kind) = state.kind(keep).cloned() {
                        state.replace_kind(*stmt, kind);
                        state.nodes.remove(&keep);
                    }
                }
                None => state.replace_kind(*stmt, NodeKind::EmptyStatement),
            }
        }
        Site::TernaryTest(expr) => {
            let Some(NodeKind::Conditional {
                consequent,
                alternate,
                ..
            }) = state.kind(*expr).cloned()
            else {
                return;
            };
            state.nodes.remove(&test);
            let (keep, drop) = if value {
                (consequent, alternate)
            } else {
                (alternate, consequent)
            };
            for node in state.subtree_nodes(drop) {
                state.nodes.remove(&node);
                recorder.removed(1);
            }
            if let Some(kind) = state.kind(keep).cloned() {
                state.replace_kind(*expr, kind);
                state.nodes.remove(&keep);
            }
        }
        // Loop tests keep their literal; dead-code elimination removes
        // `while (false)` and structuring rewrites `while (true)`
        Site::WhileTest(_) | Site::DoWhileTest(_) | Site::ForTest(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;
    use crate::features::printing::print_program;
    use crate::features::smt::BoundedChecker;
    use crate::pipeline::config::PipelineConfig;
    use crate::pipeline::pass::{CancelToken, PassContext, SolverFactory};

    fn open_bounded() -> Box<dyn SmtSolver> {
        Box::new(BoundedChecker::new())
    }

    fn run_pass(src: &str, with_solver: bool) -> (String, Vec<Warning>) {
        let lowered = parse_source(src, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let factory: fn() -> Box<dyn SmtSolver> = open_bounded;
        let mut ctx = PassContext::bare(&config, &cancel);
        if with_solver {
            ctx.solver = Some(&factory as &dyn SolverFactory);
        }
        let outcome = OpaquePredicatePass.run(state, &ctx).unwrap();
        (print_program(&outcome.state), outcome.warnings)
    }

    fn normalized(src: &str, with_solver: bool) -> String {
        run_pass(src, with_solver)
            .0
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_and_one_mod_two_collapses_to_consequent() {
        let out = normalized("if ((x & 1) === (x % 2)) { f(); } else { g(); }", false);
        assert!(out.contains("f();"), "got: {out}");
        assert!(!out.contains("g()"), "got: {out}");
        assert!(!out.contains("if"), "got: {out}");
    }

    #[test]
    fn test_self_inequality_collapses_to_alternate() {
        let out = normalized("if (x !== x) { f(); } else { g(); }", false);
        assert!(out.contains("g();"), "got: {out}");
        assert!(!out.contains("f()"), "got: {out}");
    }

    #[test]
    fn test_ternary_collapses() {
        let out = normalized("var r = (y ^ y) === 0 ? a : b;", false);
        assert!(out.contains("var r = a;"), "got: {out}");
    }

    #[test]
    fn test_ordinary_condition_untouched() {
        let src = "if (x > 10) { f(); } else { g(); }";
        let out = normalized(src, true);
        assert!(out.contains("if (x > 10)"), "got: {out}");
    }

    #[test]
    fn test_solver_decides_unlibraried_shape() {
        // (x & 3) === (3 & x) is commutative, not in the library, and
        // inside the bounded checker's bit-local fragment
        let out = normalized("if ((x & 3) === (3 & x)) { f(); } else { g(); }", true);
        assert!(out.contains("f();"), "got: {out}");
        assert!(!out.contains("g()"), "got: {out}");
    }

    #[test]
    fn test_without_solver_unlibraried_shape_survives() {
        let src = "if ((x & 3) === (3 & x)) { f(); } else { g(); }";
        let out = normalized(src, false);
        assert!(out.contains("if"), "got: {out}");
    }
}
