//! CFG builder

use crate::pipeline::error::PipelineResult;
use crate::shared::models::{BlockId, Cfg, EdgeKind, IrState, NodeId, NodeKind};

/// Build the CFG for one code body (the program body or a function body)
pub fn build_cfg(state: &IrState, owner: NodeId) -> PipelineResult<Cfg> {
    let statements = state.body_statements(owner);
    let mut builder = Builder {
        state,
        cfg: Cfg::new(),
        exit: BlockId(0),
        loops: Vec::new(),
        handlers: Vec::new(),
    };
    builder.exit = builder.cfg.new_block();
    builder.cfg.exit = builder.exit;

    let entry = builder.cfg.entry;
    let last = builder.lower_statements(entry, &statements);
    builder.seal(last);

    let mut cfg = builder.cfg;
    cfg.mark_reachable();
    Ok(cfg)
}

/// Rebuild the CFGs of every code body after a structural mutation
pub fn rebuild_cfgs(state: &mut IrState) -> PipelineResult<()> {
    let owners = state.body_owners();
    let mut cfgs = rustc_hash::FxHashMap::default();
    for owner in owners {
        cfgs.insert(owner, build_cfg(state, owner)?);
    }
    state.cfgs = cfgs;
    Ok(())
}

/// Break/continue targets of the innermost loops and switches
struct LoopCtx {
    label: Option<String>,
    break_to: BlockId,
    continue_to: Option<BlockId>,
}

struct Builder<'s> {
    state: &'s IrState,
    cfg: Cfg,
    exit: BlockId,
    loops: Vec<LoopCtx>,
    handlers: Vec<BlockId>,
}

/// Where control stands after lowering a statement: an open block, or
/// nothing when every path has already transferred away
type Flow = Option<BlockId>;

impl<'s> Builder<'s> {
    fn seal(&mut self, flow: Flow) {
        if let Some(block) = flow {
            self.cfg.add_edge(block, self.exit, EdgeKind::Unconditional);
        }
    }

    /// Append statements to `current`, splitting blocks as control flow
    /// demands; returns the open continuation block if one exists
    fn lower_statements(&mut self, current: BlockId, statements: &[NodeId]) -> Flow {
        let mut flow: Flow = Some(current);
        for &stmt in statements {
            let block = match flow {
                Some(b) => b,
                None => {
                    // Unreachable continuation: a fresh block with no
                    // incoming edges, flagged by reachability marking
                    self.cfg.new_block()
                }
            };
            flow = self.lower_statement(block, stmt);
        }
        flow
    }

    fn lower_statement(&mut self, current: BlockId, stmt: NodeId) -> Flow {
        let Some(kind) = self.state.kind(stmt).cloned() else {
            return Some(current);
        };
        match kind {
            NodeKind::ExpressionStatement { .. }
            | NodeKind::VariableDeclaration { .. }
            | NodeKind::FunctionDeclaration { .. }
            | NodeKind::EmptyStatement => {
                self.cfg.block_mut(current).statements.push(stmt);
                Some(current)
            }
            NodeKind::Block { body } => self.lower_statements(current, &body),
            NodeKind::Return { .. } => {
                self.cfg.block_mut(current).statements.push(stmt);
                self.cfg.add_edge(current, self.exit, EdgeKind::Unconditional);
                None
            }
            NodeKind::Throw { .. } => {
                self.cfg.block_mut(current).statements.push(stmt);
                let target = self.handlers.last().copied().unwrap_or(self.exit);
                self.cfg.add_edge(current, target, EdgeKind::Exception);
                None
            }
            NodeKind::Break { label } => {
                self.cfg.block_mut(current).statements.push(stmt);
                let target = self.break_target(label.as_deref());
                self.cfg.add_edge(current, target, EdgeKind::Unconditional);
                None
            }
            NodeKind::Continue { label } => {
                self.cfg.block_mut(current).statements.push(stmt);
                let target = self.continue_target(label.as_deref());
                self.cfg.add_edge(current, target, EdgeKind::Unconditional);
                None
            }
            NodeKind::If {
                test,
                consequent,
                alternate,
            } => {
                let then_entry = self.cfg.new_block();
                self.cfg
                    .add_edge_with_condition(current, then_entry, EdgeKind::CondTrue, Some(test));
                let then_flow = self.lower_statement(then_entry, consequent);

                let (else_flow, else_entry) = match alternate {
                    Some(alt) => {
                        let else_entry = self.cfg.new_block();
                        (self.lower_statement(else_entry, alt), Some(else_entry))
                    }
                    None => (None, None),
                };

                let join = self.cfg.new_block();
                match else_entry {
                    Some(entry) => {
                        self.cfg.add_edge_with_condition(
                            current,
                            entry,
                            EdgeKind::CondFalse,
                            Some(test),
                        );
                        if let Some(ef) = else_flow {
                            self.cfg.add_edge(ef, join, EdgeKind::FallThrough);
                        }
                    }
                    None => {
                        self.cfg
                            .add_edge_with_condition(current, join, EdgeKind::CondFalse, Some(test));
                    }
                }
                if let Some(tf) = then_flow {
                    self.cfg.add_edge(tf, join, EdgeKind::FallThrough);
                }
                Some(join)
            }
            NodeKind::While { test, body } => {
                let header = self.cfg.new_block();
                self.cfg.add_edge(current, header, EdgeKind::FallThrough);
                let body_entry = self.cfg.new_block();
                let after = self.cfg.new_block();
                self.cfg
                    .add_edge_with_condition(header, body_entry, EdgeKind::CondTrue, Some(test));
                self.cfg
                    .add_edge_with_condition(header, after, EdgeKind::CondFalse, Some(test));

                self.loops.push(LoopCtx {
                    label: None,
                    break_to: after,
                    continue_to: Some(header),
                });
                let body_flow = self.lower_statement(body_entry, body);
                self.loops.pop();

                if let Some(bf) = body_flow {
                    // Loop bottom back to the header
                    self.cfg.add_edge(bf, header, EdgeKind::Unconditional);
                }
                Some(after)
            }
            NodeKind::DoWhile { body, test } => {
                let body_entry = self.cfg.new_block();
                self.cfg.add_edge(current, body_entry, EdgeKind::FallThrough);
                let latch = self.cfg.new_block();
                let after = self.cfg.new_block();

                self.loops.push(LoopCtx {
                    label: None,
                    break_to: after,
                    continue_to: Some(latch),
                });
                let body_flow = self.lower_statement(body_entry, body);
                self.loops.pop();

                if let Some(bf) = body_flow {
                    self.cfg.add_edge(bf, latch, EdgeKind::FallThrough);
                }
                self.cfg
                    .add_edge_with_condition(latch, body_entry, EdgeKind::CondTrue, Some(test));
                self.cfg
                    .add_edge_with_condition(latch, after, EdgeKind::CondFalse, Some(test));
                Some(after)
            }
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.cfg.block_mut(current).statements.push(init);
                }
                let header = self.cfg.new_block();
                self.cfg.add_edge(current, header, EdgeKind::FallThrough);
                let body_entry = self.cfg.new_block();
                let latch = self.cfg.new_block();
                let after = self.cfg.new_block();

                match test {
                    Some(test) => {
                        self.cfg.add_edge_with_condition(
                            header,
                            body_entry,
                            EdgeKind::CondTrue,
                            Some(test),
                        );
                        self.cfg.add_edge_with_condition(
                            header,
                            after,
                            EdgeKind::CondFalse,
                            Some(test),
                        );
                    }
                    None => {
                        self.cfg
                            .add_edge(header, body_entry, EdgeKind::Unconditional);
                    }
                }

                self.loops.push(LoopCtx {
                    label: None,
                    break_to: after,
                    continue_to: Some(latch),
                });
                let body_flow = self.lower_statement(body_entry, body);
                self.loops.pop();

                if let Some(bf) = body_flow {
                    self.cfg.add_edge(bf, latch, EdgeKind::FallThrough);
                }
                if let Some(update) = update {
                    self.cfg.block_mut(latch).statements.push(update);
                }
                self.cfg.add_edge(latch, header, EdgeKind::Unconditional);
                Some(after)
            }
            NodeKind::Switch {
                discriminant,
                cases,
            } => {
                let after = self.cfg.new_block();
                self.loops.push(LoopCtx {
                    label: None,
                    break_to: after,
                    continue_to: None,
                });

                // Case entries in source order, default last, so successor
                // order follows the deterministic edge-ordering policy
                let mut ordered: Vec<(NodeId, Option<NodeId>, Vec<NodeId>)> = Vec::new();
                let mut default_case: Option<(NodeId, Vec<NodeId>)> = None;
                for &case in &cases {
                    match self.state.kind(case) {
                        Some(NodeKind::SwitchCase {
                            test: Some(test),
                            body,
                        }) => ordered.push((case, Some(*test), body.clone())),
                        Some(NodeKind::SwitchCase { test: None, body }) => {
                            default_case = Some((case, body.clone()));
                        }
                        _ => {}
                    }
                }

                let mut entries = Vec::new();
                for (_, test, _) in &ordered {
                    let entry = self.cfg.new_block();
                    self.cfg
                        .add_edge_with_condition(current, entry, EdgeKind::CondTrue, *test);
                    entries.push(entry);
                }
                let default_entry = default_case.as_ref().map(|_| {
                    let entry = self.cfg.new_block();
                    self.cfg
                        .add_edge_with_condition(current, entry, EdgeKind::Unconditional, Some(discriminant));
                    entry
                });
                if default_entry.is_none() {
                    self.cfg.add_edge(current, after, EdgeKind::Unconditional);
                }

                // Bodies run with fall-through into the next case
                let mut previous_flow: Flow = None;
                for (idx, (_, _, body)) in ordered.iter().enumerate() {
                    let entry = entries[idx];
                    if let Some(pf) = previous_flow {
                        self.cfg.add_edge(pf, entry, EdgeKind::FallThrough);
                    }
                    previous_flow = self.lower_statements(entry, body);
                }
                if let (Some((_, body)), Some(entry)) = (default_case.as_ref(), default_entry) {
                    if let Some(pf) = previous_flow {
                        self.cfg.add_edge(pf, entry, EdgeKind::FallThrough);
                    }
                    previous_flow = self.lower_statements(entry, body);
                }
                if let Some(pf) = previous_flow {
                    self.cfg.add_edge(pf, after, EdgeKind::FallThrough);
                }

                self.loops.pop();
                Some(after)
            }
            NodeKind::Labeled { label, body } => {
                let after = self.cfg.new_block();
                self.loops.push(LoopCtx {
                    label: Some(label),
                    break_to: after,
                    continue_to: None,
                });
                let flow = self.lower_statement(current, body);
                self.loops.pop();
                if let Some(f) = flow {
                    self.cfg.add_edge(f, after, EdgeKind::FallThrough);
                }
                Some(after)
            }
            NodeKind::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                let try_entry = self.cfg.new_block();
                self.cfg.add_edge(current, try_entry, EdgeKind::FallThrough);
                let after = self.cfg.new_block();

                let handler_entry = handler.map(|_| self.cfg.new_block());
                if let Some(h) = handler_entry {
                    self.cfg.add_edge(try_entry, h, EdgeKind::Exception);
                    self.handlers.push(h);
                }
                let try_flow = self.lower_statement(try_entry, block);
                if handler_entry.is_some() {
                    self.handlers.pop();
                }
                if let Some(tf) = try_flow {
                    self.cfg.add_edge(tf, after, EdgeKind::FallThrough);
                }
                if let (Some(handler), Some(h_entry)) = (handler, handler_entry) {
                    let handler_flow = self.lower_statement(h_entry, handler);
                    if let Some(hf) = handler_flow {
                        self.cfg.add_edge(hf, after, EdgeKind::FallThrough);
                    }
                }
                if let Some(finalizer) = finalizer {
                    return self.lower_statement(after, finalizer);
                }
                Some(after)
            }
            // Expressions that leaked into statement position
            _ => {
                self.cfg.block_mut(current).statements.push(stmt);
                Some(current)
            }
        }
    }

    fn break_target(&self, label: Option<&str>) -> BlockId {
        match label {
            Some(l) => self
                .loops
                .iter()
                .rev()
                .find(|ctx| ctx.label.as_deref() == Some(l))
                .map(|ctx| ctx.break_to)
                .unwrap_or(self.exit),
            None => self
                .loops
                .last()
                .map(|ctx| ctx.break_to)
                .unwrap_or(self.exit),
        }
    }

    fn continue_target(&self, label: Option<&str>) -> BlockId {
        let found = match label {
            Some(l) => self
                .loops
                .iter()
                .rev()
                .find(|ctx| ctx.label.as_deref() == Some(l) && ctx.continue_to.is_some())
                .or_else(|| self.loops.iter().rev().find(|ctx| ctx.continue_to.is_some())),
            None => self.loops.iter().rev().find(|ctx| ctx.continue_to.is_some()),
        };
        found.and_then(|ctx| ctx.continue_to).unwrap_or(self.exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;
    use crate::shared::models::IrState;

    fn state_of(src: &str) -> IrState {
        let lowered = parse_source(src, "test.js").unwrap();
        IrState::new(lowered.nodes, lowered.root, lowered.factory)
    }

    #[test]
    fn test_straight_line_is_two_blocks_plus_exit() {
        let state = state_of("var a = 1; var b = 2;");
        let cfg = build_cfg(&state, state.root).unwrap();
        // entry holds both statements, one edge to exit
        let entry = cfg.block(cfg.entry);
        assert_eq!(entry.statements.len(), 2);
        assert_eq!(entry.succs, vec![cfg.exit]);
    }

    #[test]
    fn test_if_produces_true_before_false() {
        let state = state_of("if (c) { f(); } else { g(); } h();");
        let cfg = build_cfg(&state, state.root).unwrap();
        let entry = cfg.block(cfg.entry);
        assert_eq!(entry.succs.len(), 2);
        let kinds: Vec<_> = cfg.edges_from(cfg.entry).map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EdgeKind::CondTrue, EdgeKind::CondFalse]);
        // Conditional edges carry the test expression
        assert!(cfg.edges_from(cfg.entry).all(|e| e.condition.is_some()));
    }

    #[test]
    fn test_while_has_back_edge_shape() {
        let state = state_of("while (c) { f(); } done();");
        let cfg = build_cfg(&state, state.root).unwrap();
        // Find the header: the block with a CondTrue and CondFalse out
        let header = cfg
            .blocks
            .iter()
            .find(|b| {
                let kinds: Vec<_> = cfg.edges_from(b.id).map(|e| e.kind).collect();
                kinds.contains(&EdgeKind::CondTrue) && kinds.contains(&EdgeKind::CondFalse)
            })
            .expect("loop header");
        // Some block loops back to the header
        assert!(cfg
            .edges
            .iter()
            .any(|e| e.to == header.id && e.kind == EdgeKind::Unconditional));
    }

    #[test]
    fn test_statements_after_return_are_unreachable() {
        let state = state_of("f(); return; g();");
        let cfg = build_cfg(&state, state.root).unwrap();
        // g() lives in a block that reachability marking flagged
        let unreachable: Vec<_> = cfg.blocks.iter().filter(|b| !b.reachable).collect();
        assert_eq!(unreachable.len(), 1);
        assert_eq!(unreachable[0].statements.len(), 1);
    }

    #[test]
    fn test_switch_edges_cases_in_source_order_default_last() {
        let state = state_of(
            "switch (s) { case 0: f(); break; case 1: g(); break; default: h(); } done();",
        );
        let cfg = build_cfg(&state, state.root).unwrap();
        let kinds: Vec<_> = cfg.edges_from(cfg.entry).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EdgeKind::CondTrue,
                EdgeKind::CondTrue,
                EdgeKind::Unconditional
            ]
        );
    }

    #[test]
    fn test_break_exits_loop() {
        let state = state_of("while (true) { if (c) { break; } f(); } done();");
        let cfg = build_cfg(&state, state.root).unwrap();
        cfg.blocks.iter().for_each(|b| {
            // No block may point at a non-existent target
            for &s in &b.succs {
                assert!(s.index() < cfg.blocks.len());
            }
        });
        // done() must be reachable
        let done_reachable = cfg
            .blocks
            .iter()
            .filter(|b| b.reachable)
            .any(|b| !b.statements.is_empty() && b.id != cfg.entry);
        assert!(done_reachable);
    }

    #[test]
    fn test_function_bodies_get_their_own_cfg() {
        let mut state = state_of("function f() { return 1; } f();");
        rebuild_cfgs(&mut state).unwrap();
        assert_eq!(state.cfgs.len(), 2);
        assert!(state.primary_cfg().is_some());
    }
}
