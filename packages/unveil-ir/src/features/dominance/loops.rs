//! Natural-loop detection
//!
//! A back-edge is an edge u→v where v dominates u; its natural loop is v
//! plus every block that reaches u without passing through v. Nesting is
//! defined by containment. A retreating edge whose target does not
//! dominate its source makes the graph irreducible; downstream
//! structuring must then fall back to sequential emission.

use rustc_hash::FxHashSet;

use crate::shared::models::{BlockId, Cfg};

pub fn detect_loops(cfg: &mut Cfg) {
    let rpo = cfg.reverse_post_order();
    let rpo_index: Vec<usize> = {
        let mut index = vec![usize::MAX; cfg.blocks.len()];
        for (i, &b) in rpo.iter().enumerate() {
            index[b.index()] = i;
        }
        index
    };

    let mut back_edges = Vec::new();
    let mut irreducible = false;
    for edge in &cfg.edges {
        let (u, v) = (edge.from, edge.to);
        if !cfg.block(u).reachable || !cfg.block(v).reachable {
            continue;
        }
        let dominates = cfg.block(u).dominators.contains(&v);
        if dominates && cfg.block(u).succs.contains(&v) {
            if !back_edges.contains(&(u, v)) {
                back_edges.push((u, v));
            }
        } else if rpo_index[v.index()] <= rpo_index[u.index()] && !dominates {
            // Retreating but not a back-edge
            irreducible = true;
        }
    }

    // Natural loop membership per back-edge
    let mut loops: Vec<(BlockId, FxHashSet<BlockId>)> = Vec::new();
    for &(u, v) in &back_edges {
        let mut members = FxHashSet::from_iter([v]);
        let mut stack = vec![u];
        while let Some(b) = stack.pop() {
            if !members.insert(b) {
                continue;
            }
            for &p in &cfg.block(b).preds {
                if !members.contains(&p) && cfg.block(p).reachable {
                    stack.push(p);
                }
            }
        }
        loops.push((v, members));
    }

    // Back-edges sharing a header describe one loop
    let mut merged: Vec<(BlockId, FxHashSet<BlockId>)> = Vec::new();
    for (header, members) in loops {
        match merged.iter_mut().find(|(h, _)| *h == header) {
            Some((_, existing)) => existing.extend(members),
            None => merged.push((header, members)),
        }
    }
    let mut loops = merged;

    // Reset, then assign headers outermost-first so the innermost loop
    // wins, and count depth by containment
    for block in &mut cfg.blocks {
        block.loop_depth = 0;
        block.loop_header = None;
    }
    loops.sort_by_key(|(_, members)| std::cmp::Reverse(members.len()));
    for (header, members) in &loops {
        for &member in members {
            let block = cfg.block_mut(member);
            block.loop_depth += 1;
            block.loop_header = Some(*header);
        }
    }

    cfg.back_edges = back_edges;
    cfg.irreducible = irreducible;
}
