//! Copy propagation
//!
//! On SSA form a copy is a definition whose right-hand side is another
//! SSA identifier; every use of the copy rewrites to the source. The
//! single-definition property makes the rewrite unconditionally safe: the
//! source's definition dominates the copy, which dominates every use.
//! Plain identifiers (captured or global names) are never propagated;
//! their storage can change between definition and use.

use rustc_hash::FxHashMap;

use crate::pipeline::error::PipelineResult;
use crate::pipeline::pass::{MetricsRecorder, Pass, PassContext, PassOutcome};
use crate::shared::models::{IrState, NodeId, NodeKind};

const MAX_ROUNDS: usize = 8;

pub struct CopyPropagationPass;

impl Pass for CopyPropagationPass {
    fn name(&self) -> &'static str {
        "copy-propagation"
    }

    fn description(&self) -> &'static str {
        "rewrite uses of SSA copies to their source versions"
    }

    fn requires_ssa(&self) -> bool {
        true
    }

    fn run(&self, mut state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome> {
        let mut recorder = MetricsRecorder::start();
        let mut changed = false;

        let owners = state.body_owners();
        for owner in owners {
            ctx.cancel.check("copy-propagation")?;
            for _round in 0..MAX_ROUNDS {
                if !propagate_body(&mut state, owner, &mut recorder) {
                    break;
                }
                changed = true;
            }
        }

        let metrics = recorder.finish();
        Ok(if changed {
            PassOutcome::changed(state, metrics)
        } else {
            PassOutcome::unchanged(state, metrics)
        })
    }
}

fn propagate_body(state: &mut IrState, owner: NodeId, recorder: &mut MetricsRecorder) -> bool {
    let Some(body) = state.ssa.as_ref().and_then(|ssa| ssa.body(owner)) else {
        return false;
    };

    // Copies: (name, version) → source (name, version). Destruction
    // collapses versions back to base names, so a source that is ever
    // reassigned must keep its named copy; propagating it would stretch
    // the first version's live range across the redefinition.
    let mut copies: FxHashMap<(String, u32), (String, u32)> = FxHashMap::default();
    for ((name, version), def) in &body.defs {
        let Some(value) = def.value else { continue };
        if let Some(NodeKind::SsaName {
            name: src_name,
            version: src_version,
        }) = state.kind(value)
        {
            if body.next_version.get(src_name) != Some(&1) {
                continue;
            }
            copies.insert(
                (name.clone(), *version),
                (src_name.clone(), *src_version),
            );
        }
    }
    if copies.is_empty() {
        return false;
    }

    // Resolve chains so x→y→z rewrites straight to z
    let resolve = |mut key: (String, u32)| {
        let mut hops = 0;
        while let Some(next) = copies.get(&key) {
            key = next.clone();
            hops += 1;
            if hops > copies.len() {
                break;
            }
        }
        key
    };

    // Use lists are collected before rewriting; every entry is re-checked
    // against the live node map
    let mut rewrites: Vec<(NodeId, (String, u32))> = Vec::new();
    for (key, _) in copies.iter() {
        let target = resolve(key.clone());
        if let Some(uses) = body.uses.get(key) {
            for &use_node in uses {
                rewrites.push((use_node, target.clone()));
            }
        }
    }

    let mut changed = false;
    let mut new_uses: Vec<((String, u32), NodeId)> = Vec::new();
    for (use_node, (src_name, src_version)) in rewrites {
        // The node must still be the SSA use it was recorded as; constant
        // propagation may have replaced it with a literal already
        let still_ssa_use = matches!(
            state.kind(use_node),
            Some(NodeKind::SsaName { name, version })
                if copies.contains_key(&(name.clone(), *version))
        );
        if !still_ssa_use {
            continue;
        }
        state.replace_kind(
            use_node,
            NodeKind::SsaName {
                name: src_name.clone(),
                version: src_version,
            },
        );
        recorder.changed(1);
        new_uses.push(((src_name, src_version), use_node));
        changed = true;
    }

    if let Some(ssa) = state.ssa.as_mut() {
        let body = ssa.body_mut(owner);
        for (key, node) in new_uses {
            body.uses.entry(key).or_default().push(node);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dominance;
    use crate::features::flow_graph;
    use crate::features::parsing::parse_source;
    use crate::features::printing::print_program;
    use crate::features::ssa::{SsaConstructPass, SsaDestructPass};
    use crate::pipeline::config::PipelineConfig;
    use crate::pipeline::pass::CancelToken;

    fn run_fragment(src: &str) -> String {
        let lowered = parse_source(src, "test.js").unwrap();
        let mut state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        flow_graph::rebuild_cfgs(&mut state).unwrap();
        let owners = state.body_owners();
        for owner in owners {
            let mut cfg = state.cfgs.remove(&owner).unwrap();
            dominance::compute(&mut cfg);
            state.cfgs.insert(owner, cfg);
        }
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let ctx = PassContext::bare(&config, &cancel);
        let state = SsaConstructPass.run(state, &ctx).unwrap().state;
        let state = CopyPropagationPass.run(state, &ctx).unwrap().state;
        let state = SsaDestructPass.run(state, &ctx).unwrap().state;
        print_program(&state)
    }

    fn normalized(src: &str) -> String {
        run_fragment(src)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_direct_copy_propagates() {
        let out = normalized("var a = f(); var b = a; use(b);");
        assert!(out.contains("use(a);"), "got: {out}");
    }

    #[test]
    fn test_copy_chain_resolves_to_root() {
        let out = normalized("var a = f(); var b = a; var c = b; use(c);");
        assert!(out.contains("use(a);"), "got: {out}");
    }

    #[test]
    fn test_reassigned_source_versions_stay_separate() {
        // b copies the first version of a; the reassignment must not leak
        let out = normalized("var a = f(); var b = a; a = g(); use(b, a);");
        // After destruction both names collapse back, but use(b, a) must
        // NOT have become use(a, a)
        assert!(out.contains("use(b, a);"), "got: {out}");
    }

    #[test]
    fn test_global_rhs_not_propagated() {
        let out = normalized("var b = g; g = 1; use(b);");
        assert!(out.contains("use(b);"), "got: {out}");
    }
}
