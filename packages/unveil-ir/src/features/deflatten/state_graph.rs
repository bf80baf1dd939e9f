//! Dispatcher state-transition graph
//!
//! Each case body resolves to a prefix of ordinary statements plus one
//! transition: a direct jump to the next state, a two-way branch, or an
//! exit. The transitions form a directed graph over state values,
//! queried during region construction for reachability and cycles.

use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Bfs;
use rustc_hash::FxHashMap;

use crate::shared::models::node::{AssignOp, NodeId, NodeKind};
use crate::shared::models::IrState;

use super::detector::{integer_literal, Dispatcher};

/// Where a case hands control next
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// `None` exits the dispatcher
    Direct { to: Option<i64> },
    /// `if (cond) s = a; else s = b;`
    Branch {
        cond: NodeId,
        then_to: Option<i64>,
        else_to: Option<i64>,
    },
}

/// One case, decomposed
#[derive(Debug, Clone)]
pub struct CaseFlow {
    pub prefix: Vec<NodeId>,
    pub transition: Transition,
}

/// Exit is modeled as a reserved node value in the graph
const EXIT_NODE: i64 = i64::MIN;

#[derive(Debug)]
pub struct StateGraph {
    pub flows: FxHashMap<i64, CaseFlow>,
    pub entry: i64,
    graph: DiGraphMap<i64, ()>,
}

impl StateGraph {
    /// Decompose every case of a detected dispatcher; `None` when any
    /// case has a shape the reconstruction cannot prove
    pub fn build(state: &IrState, dispatcher: &Dispatcher) -> Option<StateGraph> {
        let mut flows = FxHashMap::default();
        let mut graph = DiGraphMap::new();

        for (value, body) in &dispatcher.cases {
            let flow = decompose_case(state, dispatcher, body)?;
            match &flow.transition {
                Transition::Direct { to } => {
                    graph.add_edge(*value, to.unwrap_or(EXIT_NODE), ());
                }
                Transition::Branch {
                    then_to, else_to, ..
                } => {
                    graph.add_edge(*value, then_to.unwrap_or(EXIT_NODE), ());
                    graph.add_edge(*value, else_to.unwrap_or(EXIT_NODE), ());
                }
            }
            flows.insert(*value, flow);
        }

        // The entry state must exist
        if !flows.contains_key(&dispatcher.entry_state) {
            return None;
        }

        Some(StateGraph {
            flows,
            entry: dispatcher.entry_state,
            graph,
        })
    }

    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    pub fn state_count(&self) -> usize {
        self.flows.len()
    }

    /// States reachable from `from`, not counting exit
    pub fn reachable_from(&self, from: Option<i64>) -> Vec<i64> {
        let Some(from) = from else { return Vec::new() };
        if !self.graph.contains_node(from) {
            return Vec::new();
        }
        let mut bfs = Bfs::new(&self.graph, from);
        let mut out = Vec::new();
        while let Some(node) = bfs.next(&self.graph) {
            if node != EXIT_NODE {
                out.push(node);
            }
        }
        out
    }

    /// Whether `target` is reachable from `from`
    pub fn reaches(&self, from: Option<i64>, target: i64) -> bool {
        self.reachable_from(from).contains(&target)
    }
}

/// Split a case body into prefix + transition. Supported shapes:
///   [prefix..., s = K, break?]
///   [prefix..., if (c) { s = K1 } else { s = K2 }, break?]
/// A case that never assigns the state variable spins forever (the
/// trailing break only leaves the switch), so it refuses.
fn decompose_case(
    state: &IrState,
    dispatcher: &Dispatcher,
    body: &[NodeId],
) -> Option<CaseFlow> {
    // Trailing break/continue is dispatcher plumbing, not content
    let mut effective: Vec<NodeId> = body.to_vec();
    while let Some(&last) = effective.last() {
        match state.kind(last) {
            Some(NodeKind::Break { label: None }) | Some(NodeKind::Continue { label: None }) => {
                effective.pop();
            }
            _ => break,
        }
    }

    let &last = effective.last()?;

    // Direct transition
    if let Some(to) = state_assignment(state, last, &dispatcher.state_var) {
        let prefix = effective[..effective.len() - 1].to_vec();
        if prefix_is_plain(state, &prefix, &dispatcher.state_var) {
            return Some(CaseFlow {
                prefix,
                transition: Transition::Direct {
                    to: normalize_target(dispatcher, to),
                },
            });
        }
        return None;
    }

    // Two-way branch
    if let Some(NodeKind::If {
        test,
        consequent,
        alternate: Some(alternate),
    }) = state.kind(last).cloned()
    {
        let then_to = branch_assignment(state, consequent, &dispatcher.state_var)?;
        let else_to = branch_assignment(state, alternate, &dispatcher.state_var)?;
        let prefix = effective[..effective.len() - 1].to_vec();
        if prefix_is_plain(state, &prefix, &dispatcher.state_var) {
            return Some(CaseFlow {
                prefix,
                transition: Transition::Branch {
                    cond: test,
                    then_to: normalize_target(dispatcher, then_to),
                    else_to: normalize_target(dispatcher, else_to),
                },
            });
        }
        return None;
    }

    None
}

/// Jumping to the loop-test exit value is an exit
fn normalize_target(dispatcher: &Dispatcher, to: i64) -> Option<i64> {
    if dispatcher.exit_state == Some(to) {
        None
    } else {
        Some(to)
    }
}

/// `s = K;` as a statement
fn state_assignment(state: &IrState, stmt: NodeId, state_var: &str) -> Option<i64> {
    let NodeKind::ExpressionStatement { expression } = state.kind(stmt)? else {
        return None;
    };
    let NodeKind::Assignment {
        op: AssignOp::Assign,
        target,
        value,
    } = state.kind(*expression)?
    else {
        return None;
    };
    if state.kind(*target).and_then(NodeKind::variable_name) != Some(state_var) {
        return None;
    }
    integer_literal(state, *value)
}

/// A branch arm holding exactly one state assignment (optionally followed
/// by a break), directly or in a block
fn branch_assignment(state: &IrState, arm: NodeId, state_var: &str) -> Option<i64> {
    if let Some(value) = state_assignment(state, arm, state_var) {
        return Some(value);
    }
    if let Some(NodeKind::Block { body }) = state.kind(arm) {
        let mut body: Vec<NodeId> = body.clone();
        while let Some(&last) = body.last() {
            if matches!(state.kind(last), Some(NodeKind::Break { label: None })) {
                body.pop();
            } else {
                break;
            }
        }
        if body.len() == 1 {
            return state_assignment(state, body[0], state_var);
        }
    }
    None
}

/// The prefix must not read or write the state variable, and must not
/// jump out of the case on its own
fn prefix_is_plain(state: &IrState, prefix: &[NodeId], state_var: &str) -> bool {
    for &stmt in prefix {
        for node in state.subtree_nodes(stmt) {
            match state.kind(node) {
                Some(NodeKind::Identifier { name }) | Some(NodeKind::SsaName { name, .. }) => {
                    if name == state_var {
                        return false;
                    }
                }
                Some(NodeKind::Break { .. }) | Some(NodeKind::Continue { .. }) => return false,
                _ => {}
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::deflatten::detector::detect;
    use crate::features::parsing::parse_source;

    fn graph_of(src: &str) -> StateGraph {
        let lowered = parse_source(src, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let found = detect(&state);
        assert_eq!(found.len(), 1);
        StateGraph::build(&state, &found[0]).unwrap()
    }

    #[test]
    fn test_linear_chain_graph() {
        let graph = graph_of(
            "var s = 0; while (s != 3) { switch (s) { \
             case 0: a(); s = 1; break; \
             case 1: b(); s = 2; break; \
             case 2: c(); s = 3; break; } }",
        );
        assert_eq!(graph.state_count(), 3);
        assert!(!graph.has_cycles());
        assert!(graph.reaches(Some(0), 2));
        // Jumping to the exit value is an exit, not a state
        assert_eq!(
            graph.flows[&2].transition,
            Transition::Direct { to: None }
        );
    }

    #[test]
    fn test_branch_graph() {
        let graph = graph_of(
            "var s = 0; while (s != 9) { switch (s) { \
             case 0: if (c) { s = 1; } else { s = 2; } break; \
             case 1: a(); s = 9; break; \
             case 2: b(); s = 9; break; } }",
        );
        assert_eq!(graph.state_count(), 3);
        assert!(!graph.has_cycles());
        assert!(matches!(
            graph.flows[&0].transition,
            Transition::Branch { .. }
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let graph = graph_of(
            "var s = 0; while (s != 9) { switch (s) { \
             case 0: a(); s = 1; break; \
             case 1: if (c) { s = 0; } else { s = 9; } break; } }",
        );
        assert!(graph.has_cycles());
    }
}
