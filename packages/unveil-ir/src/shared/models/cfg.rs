//! Control-flow graph model
//!
//! Basic blocks plus a typed edge multiset with distinguished entry and
//! exit blocks. Blocks reference statements by node identity; derived
//! dominance fields are populated by the dominance engine and recomputed
//! whenever a pass declares it altered control flow.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Block identity within one CFG (index into the block vector)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Edge types, ordered deterministically in successor lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    FallThrough,
    CondTrue,
    CondFalse,
    Unconditional,
    Exception,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::FallThrough => "fall_through",
            EdgeKind::CondTrue => "conditional_true",
            EdgeKind::CondFalse => "conditional_false",
            EdgeKind::Unconditional => "unconditional",
            EdgeKind::Exception => "exception",
        }
    }
}

/// Directed edge between blocks; conditional edges carry the test node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgEdge {
    pub from: BlockId,
    pub to: BlockId,
    pub kind: EdgeKind,
    pub condition: Option<NodeId>,
}

/// A basic block: ordered statements, link lists, and derived dominance
/// fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub statements: Vec<NodeId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    /// Blocks with no path from entry are kept but marked
    pub reachable: bool,

    pub dominators: FxHashSet<BlockId>,
    pub idom: Option<BlockId>,
    pub dom_frontier: FxHashSet<BlockId>,
    pub post_dominators: FxHashSet<BlockId>,
    pub ipdom: Option<BlockId>,
    pub loop_depth: u32,
    pub loop_header: Option<BlockId>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            statements: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            reachable: false,
            dominators: FxHashSet::default(),
            idom: None,
            dom_frontier: FxHashSet::default(),
            post_dominators: FxHashSet::default(),
            ipdom: None,
            loop_depth: 0,
            loop_header: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// One control-flow graph (program body or one function body)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub edges: Vec<CfgEdge>,
    pub entry: BlockId,
    pub exit: BlockId,
    /// u→v edges where v dominates u
    pub back_edges: Vec<(BlockId, BlockId)>,
    /// Set when loop detection found control flow it cannot reduce
    pub irreducible: bool,
}

impl Cfg {
    pub fn new() -> Self {
        let mut cfg = Self {
            blocks: Vec::new(),
            edges: Vec::new(),
            entry: BlockId(0),
            exit: BlockId(0),
            back_edges: Vec::new(),
            irreducible: false,
        };
        cfg.entry = cfg.new_block();
        cfg
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// Append a typed edge, keeping pred/succ lists in insertion order.
    /// Insertion order is the deterministic ordering policy: callers add
    /// conditional-true before conditional-false and switch cases in
    /// source order with default last.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        self.add_edge_with_condition(from, to, kind, None);
    }

    pub fn add_edge_with_condition(
        &mut self,
        from: BlockId,
        to: BlockId,
        kind: EdgeKind,
        condition: Option<NodeId>,
    ) {
        self.edges.push(CfgEdge {
            from,
            to,
            kind,
            condition,
        });
        self.block_mut(from).succs.push(to);
        self.block_mut(to).preds.push(from);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Mark reachability from entry and return the reachable set
    pub fn mark_reachable(&mut self) -> FxHashSet<BlockId> {
        let mut seen = FxHashSet::default();
        let mut stack = vec![self.entry];
        while let Some(b) = stack.pop() {
            if !seen.insert(b) {
                continue;
            }
            for &s in &self.blocks[b.index()].succs {
                if !seen.contains(&s) {
                    stack.push(s);
                }
            }
        }
        for block in &mut self.blocks {
            block.reachable = seen.contains(&block.id);
        }
        seen
    }

    /// Blocks in reverse post-order from entry (unreachable blocks appended
    /// after, in id order, so every block is visited exactly once)
    pub fn reverse_post_order(&self) -> Vec<BlockId> {
        let mut visited = FxHashSet::default();
        let mut postorder = Vec::with_capacity(self.blocks.len());
        // Iterative DFS; the explicit frame carries the successor cursor
        let mut stack: Vec<(BlockId, usize)> = vec![(self.entry, 0)];
        visited.insert(self.entry);
        while let Some(frame) = stack.last_mut() {
            let (block, cursor) = (frame.0, frame.1);
            if cursor < self.blocks[block.index()].succs.len() {
                frame.1 += 1;
                let next = self.blocks[block.index()].succs[cursor];
                if visited.insert(next) {
                    stack.push((next, 0));
                }
            } else {
                postorder.push(block);
                stack.pop();
            }
        }
        let mut order: Vec<BlockId> = postorder.into_iter().rev().collect();
        for block in &self.blocks {
            if !visited.contains(&block.id) {
                order.push(block.id);
            }
        }
        order
    }

    /// Edges leaving `from`, in insertion order
    pub fn edges_from(&self, from: BlockId) -> impl Iterator<Item = &CfgEdge> {
        self.edges.iter().filter(move |e| e.from == from)
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_edge_lists_in_insertion_order() {
        let cfg = diamond();
        let entry = cfg.block(cfg.entry);
        // True successor first, per the ordering policy
        assert_eq!(entry.succs, vec![BlockId(1), BlockId(2)]);
        let join = cfg.block(BlockId(3));
        assert_eq!(join.preds, vec![BlockId(1), BlockId(2)]);
    }

    #[test]
    fn test_reverse_post_order_starts_at_entry() {
        let cfg = diamond();
        let rpo = cfg.reverse_post_order();
        assert_eq!(rpo.len(), 4);
        assert_eq!(rpo[0], cfg.entry);
        // Join comes after both branch arms
        assert_eq!(rpo[3], BlockId(3));
    }

    #[test]
    fn test_mark_reachable_flags_orphans() {
        let mut cfg = diamond();
        let orphan = cfg.new_block();
        cfg.mark_reachable();
        assert!(!cfg.block(orphan).reachable);
        assert!(cfg.block(cfg.entry).reachable);

        // Unreachable blocks still appear in the traversal, at the end
        let rpo = cfg.reverse_post_order();
        assert_eq!(rpo.len(), 5);
        assert_eq!(rpo[4], orphan);
    }
}
