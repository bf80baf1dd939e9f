//! SSA destruction
//!
//! Each φ is replaced by copies at the end of its predecessor blocks.
//! Copies materialize through fresh temporaries first and write
//! destinations second, which sidesteps the lost-copy and swap problems;
//! copies whose source and destination are versions of the same original
//! name are elided. Finally every SSA identifier is rewritten back to its
//! original name and the φ registry is dropped.

use rustc_hash::FxHashMap;

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::pass::{MetricsRecorder, Pass, PassContext, PassOutcome, Warning};
use crate::shared::models::{
    AssignOp, BlockId, DeclKind, IrState, NodeId, NodeKind,
};

pub struct SsaDestructPass;

impl Pass for SsaDestructPass {
    fn name(&self) -> &'static str {
        "ssa-destruct"
    }

    fn description(&self) -> &'static str {
        "replace phi nodes with predecessor copies and restore original names"
    }

    fn mutates_control_flow(&self) -> bool {
        true
    }

    fn run(&self, mut state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome> {
        let mut recorder = MetricsRecorder::start();
        let mut warnings = Vec::new();

        let Some(ssa) = state.ssa.take() else {
            return Ok(PassOutcome::unchanged(state, recorder.finish()));
        };

        let mut owners: Vec<NodeId> = ssa.per_body.keys().copied().collect();
        owners.sort();
        for owner in owners {
            ctx.cancel.check("ssa-destruct")?;
            let body = &ssa.per_body[&owner];

            // Copies required per predecessor block
            let mut copies: FxHashMap<BlockId, Vec<(String, NodeId)>> = FxHashMap::default();
            let mut blocks: Vec<BlockId> = body.phis.keys().copied().collect();
            blocks.sort();
            for block in blocks {
                for &phi in &body.phis[&block] {
                    let (target, operands) = match state.kind(phi) {
                        Some(NodeKind::Phi { target, operands }) => {
                            (*target, operands.clone())
                        }
                        _ => continue,
                    };
                    let target_name = state
                        .kind(target)
                        .and_then(NodeKind::variable_name)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            PipelineError::invariant("ssa-destruct", "phi without named target")
                        })?;

                    // Operand arity must match the block's predecessors;
                    // unreachable predecessors contribute no operand
                    if let Some(cfg) = state.cfgs.get(&owner) {
                        let live_preds = cfg
                            .block(block)
                            .preds
                            .iter()
                            .filter(|p| cfg.block(**p).reachable)
                            .collect::<rustc_hash::FxHashSet<_>>()
                            .len();
                        if operands.len() != live_preds {
                            return Err(PipelineError::invariant(
                                "ssa-destruct",
                                format!(
                                    "phi for {target_name} has {} operands, block {} has {} live predecessors",
                                    operands.len(),
                                    block,
                                    live_preds
                                ),
                            ));
                        }
                    }

                    for operand in operands {
                        // A version of the same name flows back to the
                        // same storage; no copy needed
                        let same_name = matches!(
                            state.kind(operand.value).and_then(NodeKind::variable_name),
                            Some(n) if n == target_name
                        );
                        if same_name {
                            // Elided copy: the operand node dies with it
                            state.nodes.remove(&operand.value);
                            recorder.removed(1);
                            continue;
                        }
                        copies
                            .entry(operand.block)
                            .or_default()
                            .push((target_name.clone(), operand.value));
                    }

                    // The φ itself leaves the node map
                    state.nodes.remove(&phi);
                    state.nodes.remove(&target);
                    recorder.removed(2);
                }
            }

            let mut copy_blocks: Vec<BlockId> = copies.keys().copied().collect();
            copy_blocks.sort();
            for block in copy_blocks {
                let pairs = copies[&block].clone();
                if let Err(w) =
                    insert_parallel_copies(&mut state, owner, block, &pairs, &mut recorder)
                {
                    warnings.push(w);
                }
            }
        }

        // Every SSA identifier reverts to its original name
        let ids: Vec<NodeId> = state.nodes.keys().copied().collect();
        for id in ids {
            if let Some(NodeKind::SsaName { name, .. }) = state.kind(id) {
                let name = name.clone();
                state.replace_kind(id, NodeKind::Identifier { name });
                recorder.changed(1);
            }
        }

        state.ssa = None;
        Ok(PassOutcome::changed(state, recorder.finish()).with_warnings(warnings))
    }
}

/// Insert the copy group for one predecessor block: temporaries first,
/// destinations second
fn insert_parallel_copies(
    state: &mut IrState,
    owner: NodeId,
    block: BlockId,
    pairs: &[(String, NodeId)],
    recorder: &mut MetricsRecorder,
) -> Result<(), Warning> {
    if pairs.is_empty() {
        return Ok(());
    }

    // Find where the block's statements live in the tree
    let anchor = state
        .cfgs
        .get(&owner)
        .and_then(|cfg| cfg.block(block).statements.last().copied());
    let Some(anchor) = anchor else {
        return Err(Warning::new(
            "ssa.copy_placement",
            format!("no insertion anchor for parallel copies in block {block}"),
        ));
    };
    let Some((list_owner, index)) = state.find_statement_owner(anchor) else {
        return Err(Warning::new(
            "ssa.copy_placement",
            format!("statement list not found for copy insertion in block {block}"),
        ));
    };

    // Insert after the anchor unless it transfers control
    let after_terminator = state
        .kind(anchor)
        .map(|k| k.is_terminator())
        .unwrap_or(false);
    let insert_at = if after_terminator { index } else { index + 1 };

    let mut new_statements = Vec::new();
    if pairs.len() == 1 {
        // A single copy cannot race with itself
        let (dest, source) = &pairs[0];
        let target = state.add(NodeKind::Identifier { name: dest.clone() }, None);
        let assign = state.add(
            NodeKind::Assignment {
                op: AssignOp::Assign,
                target,
                value: *source,
            },
            None,
        );
        new_statements.push(state.add(
            NodeKind::ExpressionStatement { expression: assign },
            None,
        ));
        recorder.inserted(3);
    } else {
        // Phase one: capture every source in a fresh temporary
        let mut temporaries = Vec::new();
        for (i, (_, source)) in pairs.iter().enumerate() {
            let tmp_name = format!("_phi{i}");
            let tmp_id = state.add(
                NodeKind::Identifier {
                    name: tmp_name.clone(),
                },
                None,
            );
            let declarator = state.add(
                NodeKind::VariableDeclarator {
                    id: tmp_id,
                    init: Some(*source),
                },
                None,
            );
            new_statements.push(state.add(
                NodeKind::VariableDeclaration {
                    kind: DeclKind::Var,
                    declarations: vec![declarator],
                },
                None,
            ));
            temporaries.push(tmp_name);
            recorder.inserted(3);
        }
        // Phase two: write destinations from the temporaries
        for ((dest, _), tmp_name) in pairs.iter().zip(temporaries) {
            let target = state.add(NodeKind::Identifier { name: dest.clone() }, None);
            let source = state.add(NodeKind::Identifier { name: tmp_name }, None);
            let assign = state.add(
                NodeKind::Assignment {
                    op: AssignOp::Assign,
                    target,
                    value: source,
                },
                None,
            );
            new_statements.push(state.add(
                NodeKind::ExpressionStatement { expression: assign },
                None,
            ));
            recorder.inserted(4);
        }
    }

    if let Some(list) = state.statement_list_mut(list_owner) {
        let at = insert_at.min(list.len());
        for (offset, stmt) in new_statements.into_iter().enumerate() {
            list.insert(at + offset, stmt);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dominance;
    use crate::features::flow_graph;
    use crate::features::parsing::parse_source;
    use crate::features::ssa::SsaConstructPass;
    use crate::pipeline::config::PipelineConfig;
    use crate::pipeline::pass::{CancelToken, Pass, PassContext};
    use crate::shared::models::structural_eq;

    fn prepared_state(src: &str) -> IrState {
        let lowered = parse_source(src, "test.js").unwrap();
        let mut state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        flow_graph::rebuild_cfgs(&mut state).unwrap();
        let owners = state.body_owners();
        for owner in owners {
            let mut cfg = state.cfgs.remove(&owner).unwrap();
            dominance::compute(&mut cfg);
            state.cfgs.insert(owner, cfg);
        }
        state
    }

    fn round_trip(src: &str) -> (IrState, IrState) {
        let original = prepared_state(src);
        let reference = original.clone();
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let ctx = PassContext::bare(&config, &cancel);
        let constructed = SsaConstructPass.run(original, &ctx).unwrap().state;
        let destructed = SsaDestructPass.run(constructed, &ctx).unwrap().state;
        (reference, destructed)
    }

    #[test]
    fn test_construct_then_destruct_is_identity() {
        let sources = [
            "var a = 1; var b = a; use(b);",
            "var x = 0; if (c) { x = 1; } else { x = 2; } use(x);",
            "var s = 0; while (s != 3) { s = s + 1; } use(s);",
        ];
        for src in sources {
            let (reference, destructed) = round_trip(src);
            assert!(
                structural_eq(
                    &reference.nodes,
                    reference.root,
                    &destructed.nodes,
                    destructed.root
                ),
                "round trip changed structure for `{src}`"
            );
        }
    }

    #[test]
    fn test_no_ssa_names_survive_destruction() {
        let (_, destructed) =
            round_trip("var x = 0; if (c) { x = 1; } else { x = 2; } use(x);");
        for node in destructed.nodes.values() {
            assert!(
                !matches!(node.kind, NodeKind::SsaName { .. }),
                "SSA identifier leaked past destruction"
            );
            assert!(
                !matches!(node.kind, NodeKind::Phi { .. }),
                "phi node leaked past destruction"
            );
        }
        assert!(destructed.ssa.is_none());
    }

    #[test]
    fn test_destruct_without_ssa_is_noop() {
        let state = prepared_state("var a = 1;");
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let ctx = PassContext::bare(&config, &cancel);
        let outcome = SsaDestructPass.run(state, &ctx).unwrap();
        assert!(!outcome.changed);
    }
}
