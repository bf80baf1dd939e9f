//! Dominator, post-dominator, and frontier computation

use rustc_hash::FxHashSet;

use crate::shared::models::{BlockId, Cfg};

/// Compute dominator sets, immediate dominators, dominance frontiers, and
/// their post-dominance duals
pub fn compute_dominance(cfg: &mut Cfg) {
    let reachable = cfg.mark_reachable();
    let rpo: Vec<BlockId> = cfg
        .reverse_post_order()
        .into_iter()
        .filter(|b| reachable.contains(b))
        .collect();

    let doms = iterate_dominators(cfg, cfg.entry, &rpo, false);
    let idoms = immediate_of(&doms, &rpo);
    let frontiers = frontiers_of(cfg, &idoms, &rpo, false);

    // Post-dominance is the same computation on the reverse graph with
    // exit as the root; blocks that cannot reach exit keep empty sets
    let exit = cfg.exit;
    let rev_rpo = reverse_post_order_reversed(cfg, exit);
    let pdoms = iterate_dominators(cfg, exit, &rev_rpo, true);
    let ipdoms = immediate_of(&pdoms, &rev_rpo);

    for block in &mut cfg.blocks {
        let id = block.id;
        block.dominators = doms
            .get(id.index())
            .cloned()
            .unwrap_or_else(|| FxHashSet::from_iter([id]));
        block.idom = idoms.get(id.index()).copied().flatten();
        block.dom_frontier = frontiers.get(id.index()).cloned().unwrap_or_default();
        block.post_dominators = pdoms.get(id.index()).cloned().unwrap_or_default();
        block.ipdom = ipdoms.get(id.index()).copied().flatten();
    }
}

/// Iterative set-intersection dataflow. `order` must start at the root;
/// blocks outside `order` end with {self} (forward) or {} (reverse).
fn iterate_dominators(
    cfg: &Cfg,
    root: BlockId,
    order: &[BlockId],
    reverse: bool,
) -> Vec<FxHashSet<BlockId>> {
    let n = cfg.blocks.len();
    let in_order: FxHashSet<BlockId> = order.iter().copied().collect();
    let all: FxHashSet<BlockId> = order.iter().copied().collect();

    let mut doms: Vec<FxHashSet<BlockId>> = (0..n)
        .map(|i| {
            let id = BlockId(i as u32);
            if id == root {
                FxHashSet::from_iter([id])
            } else if in_order.contains(&id) {
                all.clone()
            } else if reverse {
                FxHashSet::default()
            } else {
                FxHashSet::from_iter([id])
            }
        })
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &b in order {
            if b == root {
                continue;
            }
            let preds: Vec<BlockId> = if reverse {
                cfg.block(b)
                    .succs
                    .iter()
                    .copied()
                    .filter(|p| in_order.contains(p))
                    .collect()
            } else {
                cfg.block(b)
                    .preds
                    .iter()
                    .copied()
                    .filter(|p| in_order.contains(p))
                    .collect()
            };
            let mut new_set: Option<FxHashSet<BlockId>> = None;
            for p in preds {
                new_set = Some(match new_set {
                    None => doms[p.index()].clone(),
                    Some(acc) => acc
                        .intersection(&doms[p.index()])
                        .copied()
                        .collect(),
                });
            }
            let mut new_set = new_set.unwrap_or_default();
            new_set.insert(b);
            if new_set != doms[b.index()] {
                doms[b.index()] = new_set;
                changed = true;
            }
        }
    }
    doms
}

/// The immediate dominator is the unique strict dominator not dominated
/// by any other strict dominator; with full sets available it is the
/// strict dominator whose own set has exactly one element less
fn immediate_of(doms: &[FxHashSet<BlockId>], order: &[BlockId]) -> Vec<Option<BlockId>> {
    let mut idoms: Vec<Option<BlockId>> = vec![None; doms.len()];
    for &b in order {
        let set = &doms[b.index()];
        if set.len() < 2 {
            continue;
        }
        idoms[b.index()] = set
            .iter()
            .copied()
            .filter(|&d| d != b)
            .find(|&d| doms[d.index()].len() == set.len() - 1);
    }
    idoms
}

/// Dominance frontiers via the idom-walk: for each join point, every
/// block on the pred-to-idom chain has the join in its frontier
fn frontiers_of(
    cfg: &Cfg,
    idoms: &[Option<BlockId>],
    order: &[BlockId],
    reverse: bool,
) -> Vec<FxHashSet<BlockId>> {
    let in_order: FxHashSet<BlockId> = order.iter().copied().collect();
    let mut frontiers: Vec<FxHashSet<BlockId>> = vec![FxHashSet::default(); cfg.blocks.len()];
    for &b in order {
        let preds: Vec<BlockId> = if reverse {
            cfg.block(b).succs.clone()
        } else {
            cfg.block(b).preds.clone()
        };
        let preds: Vec<BlockId> = preds
            .into_iter()
            .filter(|p| in_order.contains(p))
            .collect();
        if preds.len() < 2 {
            continue;
        }
        let idom_b = idoms[b.index()];
        for p in preds {
            let mut runner = Some(p);
            while let Some(r) = runner {
                if Some(r) == idom_b {
                    break;
                }
                frontiers[r.index()].insert(b);
                if r == b {
                    // Self-loop: the header is its own frontier member
                    break;
                }
                runner = idoms[r.index()];
            }
        }
    }
    frontiers
}

/// RPO over the reversed graph starting from `root`
fn reverse_post_order_reversed(cfg: &Cfg, root: BlockId) -> Vec<BlockId> {
    let mut visited = FxHashSet::default();
    let mut postorder = Vec::new();
    let mut stack: Vec<(BlockId, usize)> = vec![(root, 0)];
    visited.insert(root);
    while let Some(frame) = stack.last_mut() {
        let (block, cursor) = (frame.0, frame.1);
        let preds = &cfg.blocks[block.index()].preds;
        if cursor < preds.len() {
            frame.1 += 1;
            let next = preds[cursor];
            if visited.insert(next) {
                stack.push((next, 0));
            }
        } else {
            postorder.push(block);
            stack.pop();
        }
    }
    postorder.into_iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::EdgeKind;

    /// entry → b1 → b3(exit), entry → b2 → b3
    fn diamond() -> Cfg {
        let mut cfg = Cfg::new();
        let a = cfg.entry;
        let b = cfg.new_block();
        let c = cfg.new_block();
        let d = cfg.new_block();
        cfg.exit = d;
        cfg.add_edge(a, b, EdgeKind::CondTrue);
        cfg.add_edge(a, c, EdgeKind::CondFalse);
        cfg.add_edge(b, d, EdgeKind::Unconditional);
        cfg.add_edge(c, d, EdgeKind::Unconditional);
        cfg
    }

    #[test]
    fn test_entry_dominates_every_reachable_block() {
        let mut cfg = diamond();
        compute_dominance(&mut cfg);
        for block in cfg.blocks.iter().filter(|b| b.reachable) {
            assert!(
                block.dominators.contains(&cfg.entry),
                "entry must dominate {}",
                block.id
            );
        }
    }

    #[test]
    fn test_diamond_idoms() {
        let mut cfg = diamond();
        compute_dominance(&mut cfg);
        assert_eq!(cfg.block(BlockId(1)).idom, Some(cfg.entry));
        assert_eq!(cfg.block(BlockId(2)).idom, Some(cfg.entry));
        // The join is dominated by entry, not by either arm
        assert_eq!(cfg.block(BlockId(3)).idom, Some(cfg.entry));
    }

    #[test]
    fn test_diamond_frontiers() {
        let mut cfg = diamond();
        compute_dominance(&mut cfg);
        // Both arms have the join in their frontier; entry has none
        assert!(cfg.block(BlockId(1)).dom_frontier.contains(&BlockId(3)));
        assert!(cfg.block(BlockId(2)).dom_frontier.contains(&BlockId(3)));
        assert!(cfg.block(cfg.entry).dom_frontier.is_empty());
    }

    #[test]
    fn test_post_dominance_of_diamond() {
        let mut cfg = diamond();
        compute_dominance(&mut cfg);
        // Exit post-dominates everything
        for block in cfg.blocks.iter().filter(|b| b.reachable) {
            assert!(block.post_dominators.contains(&cfg.exit));
        }
        assert_eq!(cfg.block(cfg.entry).ipdom, Some(BlockId(3)));
    }

    #[test]
    fn test_unreachable_blocks_keep_self_dominators() {
        let mut cfg = diamond();
        let orphan = cfg.new_block();
        compute_dominance(&mut cfg);
        assert!(!cfg.block(orphan).reachable);
        assert_eq!(cfg.block(orphan).dominators.len(), 1);
        assert!(cfg.block(orphan).dominators.contains(&orphan));
        assert_eq!(cfg.block(orphan).idom, None);
    }

    #[test]
    fn test_loop_shape_dominators() {
        // entry → header; header → body → header; header → exit
        let mut cfg = Cfg::new();
        let header = cfg.new_block();
        let body = cfg.new_block();
        let exit = cfg.new_block();
        cfg.exit = exit;
        cfg.add_edge(cfg.entry, header, EdgeKind::FallThrough);
        cfg.add_edge(header, body, EdgeKind::CondTrue);
        cfg.add_edge(header, exit, EdgeKind::CondFalse);
        cfg.add_edge(body, header, EdgeKind::Unconditional);
        compute_dominance(&mut cfg);

        assert_eq!(cfg.block(body).idom, Some(header));
        assert!(cfg.block(body).dominators.contains(&header));
        // The body's frontier is the header it loops back to
        assert!(cfg.block(body).dom_frontier.contains(&header));
    }
}
