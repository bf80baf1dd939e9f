//! The structuring pass

use tracing::debug;

use crate::pipeline::error::PipelineResult;
use crate::pipeline::pass::{MetricsRecorder, Pass, PassContext, PassOutcome};
use crate::shared::models::node::{BinaryOp, LiteralValue, NodeId, NodeKind, UnaryOp};
use crate::shared::models::IrState;

const MAX_ROUNDS: usize = 8;

/// Minimum ladder length before an if-else chain becomes a switch
const SWITCH_MIN_ARMS: usize = 3;

pub struct StructuringPass;

impl Pass for StructuringPass {
    fn name(&self) -> &'static str {
        "structuring"
    }

    fn description(&self) -> &'static str {
        "rebuild idiomatic loops, ternary returns, and switches from flat control flow"
    }

    fn mutates_control_flow(&self) -> bool {
        true
    }

    fn run(&self, mut state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome> {
        let mut recorder = MetricsRecorder::start();
        let mut changed = false;

        for _round in 0..MAX_ROUNDS {
            ctx.cancel.check("structuring")?;
            let mut round_changed = false;
            round_changed |= rewrite_head_guarded_loops(&mut state, &mut recorder);
            round_changed |= rewrite_tail_guarded_loops(&mut state, &mut recorder);
            round_changed |= rewrite_guarded_returns(&mut state, &mut recorder);
            round_changed |= rewrite_if_ladders(&mut state, &mut recorder);
            if !round_changed {
                break;
            }
            changed = true;
        }

        let metrics = recorder.finish();
        Ok(if changed {
            PassOutcome::changed(state, metrics)
        } else {
            PassOutcome::unchanged(state, metrics)
        })
    }
}

/// `while (true) { if (c) break; rest }` → `while (!c) { rest }`
fn rewrite_head_guarded_loops(state: &mut IrState, recorder: &mut MetricsRecorder) -> bool {
    let mut changed = false;
    for node in state.subtree_nodes(state.root) {
        let Some(NodeKind::While { test, body }) = state.kind(node).cloned() else {
            continue;
        };
        if literal_truthiness(state, test) != Some(true) {
            continue;
        }
        let Some(NodeKind::Block { body: stmts }) = state.kind(body).cloned() else {
            continue;
        };
        let Some((&first, rest)) = stmts.split_first() else { continue };
        let Some(guard) = break_guard(state, first) else { continue };

        debug!("head-guarded infinite loop rewritten to while");
        let new_test = negate_for_test(state, guard.condition);
        let rest = rest.to_vec();
        state.replace_kind(body, NodeKind::Block { body: rest });
        state.replace_kind(
            node,
            NodeKind::While {
                test: new_test,
                body,
            },
        );
        state.nodes.remove(&test);
        cleanup_guard(state, guard, first, recorder);
        recorder.changed(1);
        changed = true;
    }
    changed
}

/// `while (true) { body; if (c) break; }` → `do { body } while (!c);`
fn rewrite_tail_guarded_loops(state: &mut IrState, recorder: &mut MetricsRecorder) -> bool {
    let mut changed = false;
    for node in state.subtree_nodes(state.root) {
        let Some(NodeKind::While { test, body }) = state.kind(node).cloned() else {
            continue;
        };
        if literal_truthiness(state, test) != Some(true) {
            continue;
        }
        let Some(NodeKind::Block { body: stmts }) = state.kind(body).cloned() else {
            continue;
        };
        let Some((&last, rest)) = stmts.split_last() else { continue };
        if rest.is_empty() {
            // The head rule owns the one-statement case
            continue;
        }
        let Some(guard) = break_guard(state, last) else { continue };

        debug!("tail-guarded infinite loop rewritten to do-while");
        let new_test = negate_for_test(state, guard.condition);
        let rest = rest.to_vec();
        state.replace_kind(body, NodeKind::Block { body: rest });
        state.replace_kind(
            node,
            NodeKind::DoWhile {
                body,
                test: new_test,
            },
        );
        state.nodes.remove(&test);
        cleanup_guard(state, guard, last, recorder);
        recorder.changed(1);
        changed = true;
    }
    changed
}

struct BreakGuard {
    condition: NodeId,
    break_stmt: NodeId,
    /// The block shell around the break, when there is one
    shell: Option<NodeId>,
}

/// `if (c) break;` with no alternate, directly or through a one-statement
/// block
fn break_guard(state: &IrState, stmt: NodeId) -> Option<BreakGuard> {
    let NodeKind::If {
        test,
        consequent,
        alternate: None,
    } = state.kind(stmt)?
    else {
        return None;
    };
    match state.kind(*consequent)? {
        NodeKind::Break { label: None } => Some(BreakGuard {
            condition: *test,
            break_stmt: *consequent,
            shell: None,
        }),
        NodeKind::Block { body } if body.len() == 1 => match state.kind(body[0])? {
            NodeKind::Break { label: None } => Some(BreakGuard {
                condition: *test,
                break_stmt: body[0],
                shell: Some(*consequent),
            }),
            _ => None,
        },
        _ => None,
    }
}

fn cleanup_guard(
    state: &mut IrState,
    guard: BreakGuard,
    if_stmt: NodeId,
    recorder: &mut MetricsRecorder,
) {
    state.nodes.remove(&guard.break_stmt);
    if let Some(shell) = guard.shell {
        state.nodes.remove(&shell);
    }
    state.nodes.remove(&if_stmt);
    recorder.removed(2);
}

/// `if (c) return x; return y;` → `return c ? x : y;`
fn rewrite_guarded_returns(state: &mut IrState, recorder: &mut MetricsRecorder) -> bool {
    let mut changed = false;
    let lists: Vec<NodeId> = state
        .subtree_nodes(state.root)
        .into_iter()
        .filter(|&n| state.statement_list(n).is_some())
        .collect();

    for list_owner in lists {
        let Some(list) = state.statement_list(list_owner) else { continue };
        let list = list.clone();
        if list.len() < 2 {
            continue;
        }
        for i in (0..list.len() - 1).rev() {
            let guarded = guarded_return(state, list[i]);
            let Some((test, then_value)) = guarded else { continue };
            let Some(NodeKind::Return {
                argument: Some(else_value),
            }) = state.kind(list[i + 1]).cloned()
            else {
                continue;
            };

            debug!("guarded return rewritten to ternary");
            let conditional = state.add(
                NodeKind::Conditional {
                    test,
                    consequent: then_value,
                    alternate: else_value,
                },
                None,
            );
            recorder.inserted(1);

            // The first statement becomes the merged return; the second
            // disappears from the list
            cleanup_guarded_return(state, list[i], recorder);
            state.nodes.remove(&list[i + 1]);
            state.replace_kind(
                list[i],
                NodeKind::Return {
                    argument: Some(conditional),
                },
            );
            if let Some(list_mut) = state.statement_list_mut(list_owner) {
                list_mut.remove(i + 1);
            }
            recorder.changed(1);
            changed = true;
            break;
        }
    }
    changed
}

/// `if (c) return x;` with no alternate → (condition, x)
fn guarded_return(state: &IrState, stmt: NodeId) -> Option<(NodeId, NodeId)> {
    let NodeKind::If {
        test,
        consequent,
        alternate: None,
    } = state.kind(stmt)?
    else {
        return None;
    };
    let ret = match state.kind(*consequent)? {
        NodeKind::Return { .. } => *consequent,
        NodeKind::Block { body } if body.len() == 1 => body[0],
        _ => return None,
    };
    let NodeKind::Return {
        argument: Some(value),
    } = state.kind(ret)?
    else {
        return None;
    };
    Some((*test, *value))
}

fn cleanup_guarded_return(state: &mut IrState, if_stmt: NodeId, recorder: &mut MetricsRecorder) {
    if let Some(NodeKind::If { consequent, .. }) = state.kind(if_stmt).cloned() {
        match state.kind(consequent).cloned() {
            Some(NodeKind::Block { body }) => {
                for stmt in body {
                    state.nodes.remove(&stmt);
                }
                state.nodes.remove(&consequent);
            }
            _ => {
                state.nodes.remove(&consequent);
            }
        }
        recorder.removed(1);
    }
}

/// `if (x === K1) … else if (x === K2) … else …` with at least
/// `SWITCH_MIN_ARMS` distinct constants → `switch (x)`
fn rewrite_if_ladders(state: &mut IrState, recorder: &mut MetricsRecorder) -> bool {
    let mut changed = false;
    for node in state.subtree_nodes(state.root) {
        if !matches!(state.kind(node), Some(NodeKind::If { .. })) {
            continue;
        }
        let Some(ladder) = collect_ladder(state, node) else { continue };
        if ladder.arms.len() < SWITCH_MIN_ARMS {
            continue;
        }

        debug!(arms = ladder.arms.len(), "if ladder rewritten to switch");
        let discriminant = state.add(
            NodeKind::Identifier {
                name: ladder.discriminant.clone(),
            },
            None,
        );
        let mut cases = Vec::new();
        for arm in &ladder.arms {
            let test_lit = state.add(
                NodeKind::Literal {
                    value: arm.constant.clone(),
                },
                None,
            );
            let mut body = arm_statements(state, arm.body);
            let brk = state.add(NodeKind::Break { label: None }, None);
            body.push(brk);
            cases.push(state.add(
                NodeKind::SwitchCase {
                    test: Some(test_lit),
                    body,
                },
                None,
            ));
            recorder.inserted(3);
        }
        if let Some(default_body) = ladder.default {
            let body = arm_statements(state, default_body);
            cases.push(state.add(NodeKind::SwitchCase { test: None, body }, None));
            recorder.inserted(1);
        }

        // Dismantle the ladder skeleton; arm contents were adopted
        for &skeleton in &ladder.skeleton {
            state.nodes.remove(&skeleton);
            recorder.removed(1);
        }
        state.replace_kind(
            node,
            NodeKind::Switch {
                discriminant,
                cases,
            },
        );
        recorder.changed(1);
        changed = true;
    }
    changed
}

struct LadderArm {
    constant: LiteralValue,
    body: NodeId,
}

struct Ladder {
    discriminant: String,
    arms: Vec<LadderArm>,
    default: Option<NodeId>,
    /// Nodes forming the chain itself (inner ifs, tests, identifiers)
    skeleton: Vec<NodeId>,
}

fn collect_ladder(state: &IrState, root: NodeId) -> Option<Ladder> {
    let mut discriminant: Option<String> = None;
    let mut arms = Vec::new();
    let mut skeleton = Vec::new();
    let mut seen_constants: Vec<LiteralValue> = Vec::new();
    let mut current = root;

    loop {
        let NodeKind::If {
            test,
            consequent,
            alternate,
        } = state.kind(current)?
        else {
            break;
        };
        let NodeKind::Binary {
            op: BinaryOp::StrictEq | BinaryOp::Eq,
            left,
            right,
        } = state.kind(*test)?
        else {
            break;
        };
        let name = state.kind(*left).and_then(NodeKind::variable_name)?;
        let NodeKind::Literal { value } = state.kind(*right)? else {
            break;
        };
        match &discriminant {
            None => discriminant = Some(name.to_string()),
            Some(existing) if existing == name => {}
            Some(_) => break,
        }
        if seen_constants.contains(value) {
            // Duplicate constants change first-match semantics
            return None;
        }
        seen_constants.push(value.clone());
        arms.push(LadderArm {
            constant: value.clone(),
            body: *consequent,
        });
        if current != root {
            skeleton.push(current);
        }
        skeleton.push(*test);
        skeleton.push(*left);
        skeleton.push(*right);

        match alternate {
            Some(alt) if matches!(state.kind(*alt), Some(NodeKind::If { .. })) => {
                current = *alt;
            }
            other => {
                return Some(Ladder {
                    discriminant: discriminant?,
                    arms,
                    default: *other,
                    skeleton,
                });
            }
        }
    }
    None
}

/// Pull an arm's statements out of its block shell, consuming the shell
fn arm_statements(state: &mut IrState, body: NodeId) -> Vec<NodeId> {
    match state.kind(body).cloned() {
        Some(NodeKind::Block { body: stmts }) => {
            state.nodes.remove(&body);
            stmts
        }
        Some(_) => vec![body],
        None => Vec::new(),
    }
}

fn literal_truthiness(state: &IrState, expr: NodeId) -> Option<bool> {
    match state.kind(expr)? {
        NodeKind::Literal { value } => value.truthiness(),
        _ => None,
    }
}

/// Negate a test expression, simplifying where the inversion is exact
fn negate_for_test(state: &mut IrState, expr: NodeId) -> NodeId {
    let inverted = match state.kind(expr).cloned() {
        Some(NodeKind::Binary { op, left, right }) => {
            let flipped = match op {
                BinaryOp::Eq => Some(BinaryOp::NotEq),
                BinaryOp::NotEq => Some(BinaryOp::Eq),
                BinaryOp::StrictEq => Some(BinaryOp::StrictNotEq),
                BinaryOp::StrictNotEq => Some(BinaryOp::StrictEq),
                _ => None,
            };
            flipped.map(|op| NodeKind::Binary { op, left, right })
        }
        // In test position `!!x` and `x` coerce identically
        Some(NodeKind::Unary {
            op: UnaryOp::Not,
            argument,
        }) => {
            state.nodes.remove(&expr);
            return argument;
        }
        _ => None,
    };
    match inverted {
        Some(kind) => {
            state.replace_kind(expr, kind);
            expr
        }
        None => state.add(
            NodeKind::Unary {
                op: UnaryOp::Not,
                argument: expr,
            },
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;
    use crate::features::printing::print_program;
    use crate::pipeline::config::PipelineConfig;
    use crate::pipeline::pass::{CancelToken, PassContext};

    fn run_structuring(src: &str) -> String {
        let lowered = parse_source(src, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let ctx = PassContext::bare(&config, &cancel);
        let outcome = StructuringPass.run(state, &ctx).unwrap();
        print_program(&outcome.state)
    }

    fn normalized(src: &str) -> String {
        run_structuring(src)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_head_guard_becomes_while() {
        let out = normalized("while (true) { if (done) { break; } step(); }");
        assert!(out.contains("while (!done) { step(); }"), "got: {out}");
    }

    #[test]
    fn test_head_guard_negation_simplifies_equality() {
        let out = normalized("while (true) { if (i === n) { break; } i = next(i); }");
        assert!(out.contains("while (i !== n)"), "got: {out}");
    }

    #[test]
    fn test_tail_guard_becomes_do_while() {
        let out = normalized("while (true) { step(); if (done) { break; } }");
        assert!(out.contains("do { step(); } while (!done);"), "got: {out}");
    }

    #[test]
    fn test_guarded_return_becomes_ternary() {
        let out = normalized("function f(a) { if (a) { return 1; } return 2; }");
        assert!(out.contains("return a ? 1 : 2;"), "got: {out}");
    }

    #[test]
    fn test_guarded_return_chain_collapses() {
        let out = normalized(
            "function f(a, b) { if (a) { return 1; } if (b) { return 2; } return 3; }",
        );
        assert!(out.contains("return a ? 1 : b ? 2 : 3;"), "got: {out}");
    }

    #[test]
    fn test_if_ladder_becomes_switch() {
        let out = normalized(
            "if (t === 1) { one(); } else if (t === 2) { two(); } \
             else if (t === 3) { three(); } else { other(); }",
        );
        assert!(out.contains("switch (t) {"), "got: {out}");
        assert!(out.contains("case 1:"), "got: {out}");
        assert!(out.contains("default:"), "got: {out}");
        assert!(out.contains("break;"), "got: {out}");
    }

    #[test]
    fn test_short_ladder_is_kept_as_if() {
        let out = normalized("if (t === 1) { one(); } else if (t === 2) { two(); }");
        assert!(out.contains("if (t === 1)"), "got: {out}");
        assert!(!out.contains("switch"), "got: {out}");
    }

    #[test]
    fn test_duplicate_constants_block_switch() {
        let out = normalized(
            "if (t === 1) { a(); } else if (t === 1) { b(); } \
             else if (t === 2) { c(); } else { d(); }",
        );
        assert!(!out.contains("switch"), "got: {out}");
    }

    #[test]
    fn test_loop_with_else_guard_untouched() {
        let src = "while (true) { if (c) { break; } else { other(); } work(); }";
        let out = normalized(src);
        assert!(out.contains("while (true)"), "got: {out}");
    }
}
