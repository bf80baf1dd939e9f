//! Shared analysis state
//!
//! Passes consume and produce an `IrState` value: the node map, the CFGs
//! for every code body, optional SSA bookkeeping, and an open-ended
//! metadata map for cross-pass annotations. States are treated as values;
//! `Clone` yields the pre-pass snapshot the framework rolls back to when a
//! pass fails locally.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::cfg::{BlockId, Cfg};
use super::factory::NodeFactory;
use super::node::{IrNode, NodeId, NodeKind, NodeMap};
use super::span::Span;

/// One SSA definition site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsaDef {
    pub block: BlockId,
    /// Statement the definition occurs in (φ node id for φ definitions)
    pub stmt: NodeId,
    /// Defining expression, when the definition has one (declarator init,
    /// assignment right-hand side)
    pub value: Option<NodeId>,
}

/// SSA bookkeeping for one code body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodySsa {
    /// Next unused version per original name
    pub next_version: FxHashMap<String, u32>,
    /// Unique definition per (name, version)
    pub defs: FxHashMap<(String, u32), SsaDef>,
    /// Use sites (SSA-identifier node ids) per (name, version)
    pub uses: FxHashMap<(String, u32), Vec<NodeId>>,
    /// φ nodes at each block head, in placement order
    pub phis: FxHashMap<BlockId, Vec<NodeId>>,
}

/// SSA state for the whole program, keyed by code-body owner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SsaState {
    pub per_body: FxHashMap<NodeId, BodySsa>,
}

impl SsaState {
    pub fn body(&self, owner: NodeId) -> Option<&BodySsa> {
        self.per_body.get(&owner)
    }

    pub fn body_mut(&mut self, owner: NodeId) -> &mut BodySsa {
        self.per_body.entry(owner).or_default()
    }
}

/// The pipeline's shared mutable state, owned by one analysis job
#[derive(Debug, Clone)]
pub struct IrState {
    pub nodes: NodeMap,
    pub root: NodeId,
    pub factory: NodeFactory,
    /// One CFG per code body (program body and each function body), keyed
    /// by the owning node; the program root's entry is the primary CFG
    pub cfgs: FxHashMap<NodeId, Cfg>,
    pub ssa: Option<SsaState>,
    /// Cross-pass annotations (dispatcher reports, purity summaries,
    /// irreducibility flags); BTreeMap keeps export order deterministic
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl IrState {
    pub fn new(nodes: NodeMap, root: NodeId, factory: NodeFactory) -> Self {
        Self {
            nodes,
            root,
            factory,
            cfgs: FxHashMap::default(),
            ssa: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&IrNode> {
        self.nodes.get(&id)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&id).map(|n| &n.kind)
    }

    pub fn insert(&mut self, node: IrNode) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Allocate a fresh node and place it in the map
    pub fn add(&mut self, kind: NodeKind, span: Option<Span>) -> NodeId {
        let id = self.factory.fresh_id();
        self.nodes.insert(id, IrNode { id, kind, span });
        id
    }

    /// Replace a node's kind under the same identity, preserving its span.
    /// This is the only sanctioned way to "modify" a node.
    pub fn replace_kind(&mut self, id: NodeId, kind: NodeKind) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.kind = kind;
        }
    }

    pub fn primary_cfg(&self) -> Option<&Cfg> {
        self.cfgs.get(&self.root)
    }

    /// Statements of the program body
    pub fn program_body(&self) -> Vec<NodeId> {
        match self.kind(self.root) {
            Some(NodeKind::Program { body, .. }) => body.clone(),
            _ => Vec::new(),
        }
    }

    /// Code-body owners in deterministic preorder: the program root first,
    /// then every function with a block body
    pub fn body_owners(&self) -> Vec<NodeId> {
        let mut owners = vec![self.root];
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(kind) = self.kind(id) else { continue };
            let children = kind.children();
            match kind {
                NodeKind::FunctionDeclaration { .. } | NodeKind::FunctionExpression { .. } => {
                    owners.push(id)
                }
                NodeKind::ArrowFunction { expression, .. } if !expression => owners.push(id),
                _ => {}
            }
            // Reverse push keeps preorder discovery deterministic
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        owners
    }

    /// The statement list of a code body owner
    pub fn body_statements(&self, owner: NodeId) -> Vec<NodeId> {
        match self.kind(owner) {
            Some(NodeKind::Program { body, .. }) => body.clone(),
            Some(NodeKind::FunctionDeclaration { body, .. })
            | Some(NodeKind::FunctionExpression { body, .. })
            | Some(NodeKind::ArrowFunction { body, .. }) => match self.kind(*body) {
                Some(NodeKind::Block { body }) => body.clone(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Nodes of the subtree rooted at `id`, preorder
    pub fn subtree_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(kind) = self.kind(current) {
                for child in kind.children().into_iter().rev() {
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Direct statement-list access for nodes that hold one
    pub fn statement_list(&self, id: NodeId) -> Option<&Vec<NodeId>> {
        match self.kind(id)? {
            NodeKind::Program { body, .. } => Some(body),
            NodeKind::Block { body } => Some(body),
            NodeKind::SwitchCase { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn statement_list_mut(&mut self, id: NodeId) -> Option<&mut Vec<NodeId>> {
        match &mut self.nodes.get_mut(&id)?.kind {
            NodeKind::Program { body, .. } => Some(body),
            NodeKind::Block { body } => Some(body),
            NodeKind::SwitchCase { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Find the statement list containing `stmt` by walking from the root.
    /// Returns the owning node and the index inside its list.
    pub fn find_statement_owner(&self, stmt: NodeId) -> Option<(NodeId, usize)> {
        for candidate in self.subtree_nodes(self.root) {
            if let Some(list) = self.statement_list(candidate) {
                if let Some(idx) = list.iter().position(|&s| s == stmt) {
                    return Some((candidate, idx));
                }
            }
        }
        None
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn meta(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Highest allocated node id, used to resume a factory over a
    /// deserialized map
    pub fn max_node_id(&self) -> u64 {
        self.nodes.keys().map(|id| id.0).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::node::LiteralValue;

    fn small_state() -> IrState {
        let mut factory = NodeFactory::new();
        let mut nodes = NodeMap::default();
        let lit = factory.literal(LiteralValue::Number(1.0));
        let stmt = factory.expression_statement(lit.id);
        let program = factory.program(vec![stmt.id], false);
        let root = program.id;
        for n in [lit, stmt, program] {
            nodes.insert(n.id, n);
        }
        IrState::new(nodes, root, factory)
    }

    #[test]
    fn test_replace_kind_preserves_identity_and_span() {
        let mut state = small_state();
        let body = state.program_body();
        let stmt = body[0];
        let expr = match state.kind(stmt) {
            Some(NodeKind::ExpressionStatement { expression }) => *expression,
            _ => panic!("expected expression statement"),
        };
        state.replace_kind(
            expr,
            NodeKind::Literal {
                value: LiteralValue::Number(2.0),
            },
        );
        // Same identity, new contents
        assert_eq!(state.node(expr).unwrap().id, expr);
        assert!(matches!(
            state.kind(expr),
            Some(NodeKind::Literal {
                value: LiteralValue::Number(n)
            }) if *n == 2.0
        ));
    }

    #[test]
    fn test_find_statement_owner() {
        let state = small_state();
        let stmt = state.program_body()[0];
        let (owner, idx) = state.find_statement_owner(stmt).unwrap();
        assert_eq!(owner, state.root);
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_body_owners_includes_functions() {
        let mut state = small_state();
        let fn_name = state.add(
            NodeKind::Identifier {
                name: "helper".into(),
            },
            None,
        );
        let fn_body = state.add(NodeKind::Block { body: vec![] }, None);
        let func = state.add(
            NodeKind::FunctionDeclaration {
                id: fn_name,
                params: vec![],
                body: fn_body,
                is_async: false,
                is_generator: false,
            },
            None,
        );
        if let Some(NodeKind::Program { body, .. }) = state.nodes.get_mut(&state.root.clone()).map(|n| &mut n.kind) {
            body.push(func);
        }
        let owners = state.body_owners();
        assert_eq!(owners, vec![state.root, func]);
    }
}
