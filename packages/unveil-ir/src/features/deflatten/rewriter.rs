//! Region construction and dispatcher replacement

use tracing::{debug, warn};

use crate::pipeline::error::PipelineResult;
use crate::pipeline::pass::{MetricsRecorder, Pass, PassContext, PassOutcome, Warning};
use crate::shared::models::node::{NodeId, NodeKind, UnaryOp};
use crate::shared::models::IrState;

use super::detector::{self, Dispatcher};
use super::state_graph::{StateGraph, Transition};

pub struct DeflattenPass;

impl Pass for DeflattenPass {
    fn name(&self) -> &'static str {
        "control-flow-deflattening"
    }

    fn description(&self) -> &'static str {
        "reconstruct structured control flow from switch dispatchers"
    }

    fn mutates_control_flow(&self) -> bool {
        true
    }

    fn run(&self, mut state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome> {
        let mut recorder = MetricsRecorder::start();
        let mut warnings = Vec::new();
        let mut changed = false;
        let mut reconstructed = Vec::new();

        // Rewriting one dispatcher invalidates the node references of the
        // others, so each round re-detects
        for _round in 0..8 {
            ctx.cancel.check("control-flow-deflattening")?;
            let dispatchers = detector::detect(&state);
            if dispatchers.is_empty() {
                break;
            }
            let mut rewrote = false;
            for dispatcher in dispatchers {
                if dispatcher.confidence < ctx.config.deflatten_confidence_threshold {
                    warnings.push(
                        Warning::new(
                            "deflatten.low_confidence",
                            format!(
                                "dispatcher on `{}` scored {:.2}, below threshold",
                                dispatcher.state_var, dispatcher.confidence
                            ),
                        )
                        .at(dispatcher.while_stmt),
                    );
                    continue;
                }
                match try_rewrite(&mut state, &dispatcher, ctx, &mut recorder) {
                    Ok(()) => {
                        debug!(
                            state_var = %dispatcher.state_var,
                            states = dispatcher.cases.len(),
                            confidence = dispatcher.confidence,
                            "dispatcher reconstructed"
                        );
                        reconstructed.push(serde_json::json!({
                            "state_var": dispatcher.state_var,
                            "states": dispatcher.cases.len(),
                            "confidence": dispatcher.confidence,
                        }));
                        rewrote = true;
                        changed = true;
                        break;
                    }
                    Err(reason) => {
                        warn!(state_var = %dispatcher.state_var, reason = %reason, "dispatcher left intact");
                        warnings.push(
                            Warning::new(
                                "deflatten.aborted",
                                format!(
                                    "dispatcher on `{}` left intact: {reason}",
                                    dispatcher.state_var
                                ),
                            )
                            .at(dispatcher.while_stmt),
                        );
                    }
                }
            }
            if !rewrote {
                break;
            }
        }

        if !reconstructed.is_empty() {
            state.set_meta("deflatten.dispatchers", serde_json::json!(reconstructed));
        }

        let metrics = recorder.finish();
        Ok(if changed {
            PassOutcome::changed(state, metrics).with_warnings(warnings)
        } else {
            PassOutcome::unchanged(state, metrics).with_warnings(warnings)
        })
    }
}

fn try_rewrite(
    state: &mut IrState,
    dispatcher: &Dispatcher,
    ctx: &PassContext<'_>,
    recorder: &mut MetricsRecorder,
) -> Result<(), String> {
    let graph = StateGraph::build(state, dispatcher)
        .ok_or_else(|| "unsupported case shape".to_string())?;

    let mut emitter = Emitter {
        state,
        graph: &graph,
        budget: ctx.config.deflatten_complexity_bound,
        spent: 0,
        recorder,
    };
    let mut path = Vec::new();
    let body = emitter
        .emit_seq(Some(graph.entry), None, &mut path)
        .map_err(|e| e.to_string())?;

    splice(state, dispatcher, body, recorder);
    Ok(())
}

/// Replace `[init, while]` in the owning list with the reconstructed
/// region, stripping the state variable
fn splice(
    state: &mut IrState,
    dispatcher: &Dispatcher,
    body: Vec<NodeId>,
    recorder: &mut MetricsRecorder,
) {
    // Drop the state variable from the init statement; keep sibling
    // declarators when present
    let mut keep_init = false;
    if let Some(NodeKind::VariableDeclaration { kind, declarations }) =
        state.kind(dispatcher.init_stmt).cloned()
    {
        let mut kept = Vec::new();
        for &decl in &declarations {
            let is_state = matches!(
                state.kind(decl),
                Some(NodeKind::VariableDeclarator { id, .. })
                    if state.kind(*id).and_then(NodeKind::variable_name)
                        == Some(dispatcher.state_var.as_str())
            );
            if is_state {
                remove_subtree(state, decl, recorder);
            } else {
                kept.push(decl);
            }
        }
        if !kept.is_empty() {
            state.replace_kind(
                dispatcher.init_stmt,
                NodeKind::VariableDeclaration {
                    kind,
                    declarations: kept,
                },
            );
            keep_init = true;
        }
    }

    let mut replacement = Vec::new();
    if keep_init {
        replacement.push(dispatcher.init_stmt);
    }
    replacement.extend(body);

    if let Some(list) = state.statement_list_mut(dispatcher.list_owner) {
        let mut rebuilt = Vec::with_capacity(list.len() + replacement.len());
        for (i, &stmt) in list.iter().enumerate() {
            if i == dispatcher.init_index {
                rebuilt.extend(replacement.iter().copied());
            } else if stmt != dispatcher.while_stmt && stmt != dispatcher.init_stmt {
                rebuilt.push(stmt);
            }
        }
        *list = rebuilt;
    }

    // The dispatcher machinery dies wholesale; emitted statements are
    // clones and survive
    remove_subtree(state, dispatcher.while_stmt, recorder);
    if !keep_init {
        remove_subtree(state, dispatcher.init_stmt, recorder);
    }
}

fn remove_subtree(state: &mut IrState, root: NodeId, recorder: &mut MetricsRecorder) {
    for node in state.subtree_nodes(root) {
        if state.nodes.remove(&node).is_some() {
            recorder.removed(1);
        }
    }
}

enum EmitAbort {
    Budget,
    Unsupported(&'static str),
}

impl std::fmt::Display for EmitAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitAbort::Budget => write!(f, "reconstruction complexity bound exceeded"),
            EmitAbort::Unsupported(what) => write!(f, "irreducible region: {what}"),
        }
    }
}

struct Emitter<'s, 'r> {
    state: &'s mut IrState,
    graph: &'s StateGraph,
    budget: usize,
    spent: usize,
    recorder: &'r mut MetricsRecorder,
}

impl<'s, 'r> Emitter<'s, 'r> {
    fn charge(&mut self, amount: usize) -> Result<(), EmitAbort> {
        self.spent += amount;
        if self.spent > self.budget {
            Err(EmitAbort::Budget)
        } else {
            Ok(())
        }
    }

    fn clone_stmt(&mut self, stmt: NodeId) -> NodeId {
        let cloned = self
            .state
            .factory
            .clone_subtree(&mut self.state.nodes, stmt);
        self.recorder.inserted(1);
        cloned
    }

    fn negate(&mut self, cond: NodeId) -> NodeId {
        self.state
            .add(NodeKind::Unary {
                op: UnaryOp::Not,
                argument: cond,
            }, None)
    }

    fn block_of(&mut self, body: Vec<NodeId>) -> NodeId {
        self.state.add(NodeKind::Block { body }, None)
    }

    /// Emit the region starting at `start`, stopping at `stop` (the join
    /// of an enclosing construct) or at dispatcher exit
    fn emit_seq(
        &mut self,
        start: Option<i64>,
        stop: Option<i64>,
        path: &mut Vec<i64>,
    ) -> Result<Vec<NodeId>, EmitAbort> {
        let mut out: Vec<NodeId> = Vec::new();
        // Output position where each locally-emitted state began, for
        // closing do-while bodies over the right statement span
        let mut starts: Vec<(i64, usize)> = Vec::new();
        let mut cur = start;

        loop {
            let Some(v) = cur else { break };
            if stop == Some(v) {
                break;
            }
            if path.contains(&v) {
                return Err(EmitAbort::Unsupported("unstructured back-edge"));
            }
            self.charge(1)?;
            path.push(v);
            starts.push((v, out.len()));

            let flow = self
                .graph
                .flows
                .get(&v)
                .ok_or(EmitAbort::Unsupported("missing state"))?
                .clone();
            for stmt in &flow.prefix {
                let cloned = self.clone_stmt(*stmt);
                out.push(cloned);
            }

            match flow.transition {
                Transition::Direct { to } => {
                    cur = to;
                }
                Transition::Branch {
                    cond,
                    then_to,
                    else_to,
                } => {
                    // do-while: one arm returns to a state emitted in
                    // this sequence, closing the loop behind the test
                    let local_start = |target: Option<i64>| {
                        target.and_then(|t| {
                            starts.iter().find(|(s, _)| *s == t).map(|(_, at)| *at)
                        })
                    };
                    if let Some(at) = local_start(then_to) {
                        let cond = self.clone_stmt(cond);
                        let body_stmts = out.split_off(at);
                        let body = self.block_of(body_stmts);
                        let dowhile = self
                            .state
                            .add(NodeKind::DoWhile { body, test: cond }, None);
                        out.push(dowhile);
                        cur = else_to;
                        continue;
                    }
                    if let Some(at) = local_start(else_to) {
                        let cond = self.clone_stmt(cond);
                        let cond = self.negate(cond);
                        let body_stmts = out.split_off(at);
                        let body = self.block_of(body_stmts);
                        let dowhile = self
                            .state
                            .add(NodeKind::DoWhile { body, test: cond }, None);
                        out.push(dowhile);
                        cur = then_to;
                        continue;
                    }

                    // while: the branch sits at the loop header and one
                    // arm cycles back to it
                    let then_cycles = self.graph.reaches(then_to, v);
                    let else_cycles = self.graph.reaches(else_to, v);
                    if then_cycles && !else_cycles && flow.prefix.is_empty() {
                        let cond = self.clone_stmt(cond);
                        let mut inner_path = Vec::new();
                        let body_stmts = self.emit_seq(then_to, Some(v), &mut inner_path)?;
                        let body = self.block_of(body_stmts);
                        let while_stmt = self
                            .state
                            .add(NodeKind::While { test: cond, body }, None);
                        out.push(while_stmt);
                        cur = else_to;
                        continue;
                    }
                    if else_cycles && !then_cycles && flow.prefix.is_empty() {
                        let cond = self.clone_stmt(cond);
                        let cond = self.negate(cond);
                        let mut inner_path = Vec::new();
                        let body_stmts = self.emit_seq(else_to, Some(v), &mut inner_path)?;
                        let body = self.block_of(body_stmts);
                        let while_stmt = self
                            .state
                            .add(NodeKind::While { test: cond, body }, None);
                        out.push(while_stmt);
                        cur = then_to;
                        continue;
                    }
                    if then_cycles || else_cycles {
                        return Err(EmitAbort::Unsupported("loop with header prefix"));
                    }

                    // Diamond: both arms run to their first common state
                    let join = self.join_of(then_to, else_to);
                    let cond = self.clone_stmt(cond);
                    let mut then_path = path.clone();
                    let then_stmts = self.emit_seq(then_to, join, &mut then_path)?;
                    let mut else_path = path.clone();
                    let else_stmts = self.emit_seq(else_to, join, &mut else_path)?;
                    let consequent = self.block_of(then_stmts);
                    let alternate = self.block_of(else_stmts);
                    let if_stmt = self.state.add(
                        NodeKind::If {
                            test: cond,
                            consequent,
                            alternate: Some(alternate),
                        },
                        None,
                    );
                    out.push(if_stmt);
                    cur = join;
                }
            }
        }
        Ok(out)
    }

    /// First state on the then-chain also reachable from the else side
    fn join_of(&self, a: Option<i64>, b: Option<i64>) -> Option<i64> {
        let from_a = self.graph.reachable_from(a);
        let from_b: Vec<i64> = self.graph.reachable_from(b);
        from_a.into_iter().find(|s| from_b.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;
    use crate::features::printing::print_program;
    use crate::pipeline::config::PipelineConfig;
    use crate::pipeline::pass::CancelToken;

    fn run_deflatten(src: &str) -> (String, Vec<Warning>) {
        let lowered = parse_source(src, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let ctx = PassContext::bare(&config, &cancel);
        let outcome = DeflattenPass.run(state, &ctx).unwrap();
        (print_program(&outcome.state), outcome.warnings)
    }

    fn normalized(src: &str) -> String {
        run_deflatten(src)
            .0
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_three_state_chain_reconstructs() {
        let out = normalized(
            "var s = 0; while (s != 3) { switch (s) { \
             case 0: var x = 10; s = 1; break; \
             case 1: var y = 20; s = 2; break; \
             case 2: console.log(x + y); s = 3; break; } }",
        );
        assert_eq!(out, "var x = 10; var y = 20; console.log(x + y);");
    }

    #[test]
    fn test_branch_reconstructs_as_if_else() {
        let out = normalized(
            "var s = 0; while (s != 9) { switch (s) { \
             case 0: if (c) { s = 1; } else { s = 2; } break; \
             case 1: a(); s = 9; break; \
             case 2: b(); s = 9; break; } }",
        );
        assert!(out.contains("if (c) {"), "got: {out}");
        assert!(out.contains("a();"), "got: {out}");
        assert!(out.contains("b();"), "got: {out}");
        assert!(!out.contains("switch"), "got: {out}");
    }

    #[test]
    fn test_cycle_reconstructs_as_do_while() {
        let out = normalized(
            "var s = 0; while (s != 9) { switch (s) { \
             case 0: work(); s = 1; break; \
             case 1: if (more()) { s = 0; } else { s = 9; } break; } }",
        );
        assert!(out.contains("do {"), "got: {out}");
        assert!(out.contains("work();"), "got: {out}");
        assert!(out.contains("} while (more());"), "got: {out}");
        assert!(!out.contains("switch"), "got: {out}");
    }

    #[test]
    fn test_flat_code_is_untouched() {
        let src = "var x = 10; var y = 20; console.log(x + y);";
        let out = normalized(src);
        assert_eq!(out, src);
    }

    #[test]
    fn test_unsupported_dispatcher_left_intact_with_warning() {
        // The state variable is also read by the payload, which the
        // rewriter refuses to strip
        let (out, warnings) = run_deflatten(
            "var s = 0; while (s != 2) { switch (s) { \
             case 0: console.log(s); s = 1; break; \
             case 1: s = 2; break; } }",
        );
        assert!(out.contains("switch"), "got: {out}");
        assert!(warnings.iter().any(|w| w.code == "deflatten.aborted"));
    }

    #[test]
    fn test_sibling_declarators_survive() {
        let out = normalized(
            "var s = 0, keep = 5; while (s != 1) { switch (s) { \
             case 0: use(keep); s = 1; break; } }",
        );
        assert!(out.contains("var keep = 5;"), "got: {out}");
        assert!(out.contains("use(keep);"), "got: {out}");
        assert!(!out.contains("switch"), "got: {out}");
    }
}
