//! Dispatcher detection

use crate::shared::models::node::{AssignOp, BinaryOp, NodeId, NodeKind};
use crate::shared::models::IrState;

/// One detected dispatcher occurrence
#[derive(Debug, Clone)]
pub struct Dispatcher {
    /// Statement list holding the dispatcher
    pub list_owner: NodeId,
    /// Index of the init statement in that list
    pub init_index: usize,
    /// The `while` statement
    pub while_stmt: NodeId,
    /// Statement initializing the state variable
    pub init_stmt: NodeId,
    pub state_var: String,
    pub entry_state: i64,
    /// Loop-test exit value (`s != exit`); `None` for `while (true)`
    pub exit_state: Option<i64>,
    /// Case value → body statements, in source order
    pub cases: Vec<(i64, Vec<NodeId>)>,
    /// Pattern-shape score in [0, 1]
    pub confidence: f64,
}

/// Scan every statement list for init+while(switch) dispatcher shapes
pub fn detect(state: &IrState) -> Vec<Dispatcher> {
    let mut found = Vec::new();
    for list_owner in state
        .subtree_nodes(state.root)
        .into_iter()
        .filter(|&n| state.statement_list(n).is_some())
    {
        let Some(list) = state.statement_list(list_owner) else { continue };
        let list = list.clone();
        for window_start in 0..list.len().saturating_sub(1) {
            let init_stmt = list[window_start];
            let while_stmt = list[window_start + 1];
            if let Some(dispatcher) =
                match_dispatcher(state, list_owner, window_start, init_stmt, while_stmt)
            {
                found.push(dispatcher);
            }
        }
    }
    found
}

fn match_dispatcher(
    state: &IrState,
    list_owner: NodeId,
    init_index: usize,
    init_stmt: NodeId,
    while_stmt: NodeId,
) -> Option<Dispatcher> {
    let NodeKind::While { test, body } = state.kind(while_stmt)? else {
        return None;
    };

    // The loop body must be a lone switch on one identifier
    let switch_stmt = single_switch(state, *body)?;
    let NodeKind::Switch {
        discriminant,
        cases,
    } = state.kind(switch_stmt)?
    else {
        return None;
    };
    let state_var = state
        .kind(*discriminant)
        .and_then(NodeKind::variable_name)?
        .to_string();

    // Loop test: `s != K` / `s !== K`, or an always-true literal
    let exit_state = match state.kind(*test)? {
        NodeKind::Binary {
            op: BinaryOp::NotEq | BinaryOp::StrictNotEq,
            left,
            right,
        } => {
            let name = state.kind(*left).and_then(NodeKind::variable_name)?;
            if name != state_var {
                return None;
            }
            Some(integer_literal(state, *right)?)
        }
        NodeKind::Literal { value } => {
            if value.truthiness() != Some(true) {
                return None;
            }
            None
        }
        _ => return None,
    };

    // Entry value from the preceding statement
    let entry_state = init_value(state, init_stmt, &state_var)?;

    // Cases keyed by integer literal; a non-empty default disqualifies
    let mut case_flows = Vec::new();
    for &case in cases {
        match state.kind(case)? {
            NodeKind::SwitchCase {
                test: Some(test),
                body,
            } => {
                let value = integer_literal(state, *test)?;
                case_flows.push((value, body.clone()));
            }
            NodeKind::SwitchCase { test: None, body } => {
                if !body.is_empty() {
                    return None;
                }
            }
            _ => return None,
        }
    }
    if case_flows.is_empty() {
        return None;
    }

    // State-variable uniqueness: every write anywhere in this list's
    // scope is a numeric literal assignment
    let mut literal_writes = 0usize;
    let mut opaque_writes = 0usize;
    for node in state.subtree_nodes(list_owner) {
        match state.kind(node) {
            Some(NodeKind::Assignment { op, target, value }) => {
                let hits = state.kind(*target).and_then(NodeKind::variable_name)
                    == Some(state_var.as_str());
                if hits {
                    if *op == AssignOp::Assign && integer_literal(state, *value).is_some() {
                        literal_writes += 1;
                    } else {
                        opaque_writes += 1;
                    }
                }
            }
            Some(NodeKind::Update { argument, .. }) => {
                if state.kind(*argument).and_then(NodeKind::variable_name)
                    == Some(state_var.as_str())
                {
                    opaque_writes += 1;
                }
            }
            _ => {}
        }
    }
    if opaque_writes > 0 {
        // Computed state transitions cannot be resolved statically
        return None;
    }

    // Confidence: shape match + state-variable uniqueness + state count
    let uniqueness = if literal_writes >= case_flows.len().saturating_sub(1) {
        0.3
    } else {
        0.15
    };
    let richness = 0.3 * (case_flows.len().min(10) as f64 / 10.0).max(0.3);
    let confidence = (0.4 + uniqueness + richness).min(1.0);

    Some(Dispatcher {
        list_owner,
        init_index,
        while_stmt,
        init_stmt,
        state_var,
        entry_state,
        exit_state,
        cases: case_flows,
        confidence,
    })
}

/// The single switch statement inside a loop body, allowing one level of
/// block nesting
fn single_switch(state: &IrState, body: NodeId) -> Option<NodeId> {
    match state.kind(body)? {
        NodeKind::Switch { .. } => Some(body),
        NodeKind::Block { body: stmts } => {
            let mut switch = None;
            for &stmt in stmts {
                match state.kind(stmt)? {
                    NodeKind::Switch { .. } if switch.is_none() => switch = Some(stmt),
                    NodeKind::EmptyStatement => {}
                    _ => return None,
                }
            }
            switch
        }
        _ => None,
    }
}

pub(crate) fn integer_literal(state: &IrState, expr: NodeId) -> Option<i64> {
    match state.kind(expr)? {
        NodeKind::Literal { value } => value.as_integer(),
        _ => None,
    }
}

/// `var s = K;` or `s = K;` initializing the state variable
fn init_value(state: &IrState, stmt: NodeId, state_var: &str) -> Option<i64> {
    match state.kind(stmt)? {
        NodeKind::VariableDeclaration { declarations, .. } => {
            for &decl in declarations {
                if let NodeKind::VariableDeclarator {
                    id,
                    init: Some(init),
                } = state.kind(decl)?
                {
                    if state.kind(*id).and_then(NodeKind::variable_name) == Some(state_var) {
                        return integer_literal(state, *init);
                    }
                }
            }
            None
        }
        NodeKind::ExpressionStatement { expression } => {
            if let NodeKind::Assignment {
                op: AssignOp::Assign,
                target,
                value,
            } = state.kind(*expression)?
            {
                if state.kind(*target).and_then(NodeKind::variable_name) == Some(state_var) {
                    return integer_literal(state, *value);
                }
            }
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;

    fn state_of(src: &str) -> IrState {
        let lowered = parse_source(src, "test.js").unwrap();
        IrState::new(lowered.nodes, lowered.root, lowered.factory)
    }

    const DISPATCHER: &str = "var s = 0; while (s != 3) { switch (s) { \
        case 0: var x = 10; s = 1; break; \
        case 1: var y = 20; s = 2; break; \
        case 2: console.log(x + y); s = 3; break; } }";

    #[test]
    fn test_detects_three_state_dispatcher() {
        let state = state_of(DISPATCHER);
        let found = detect(&state);
        assert_eq!(found.len(), 1);
        let d = &found[0];
        assert_eq!(d.state_var, "s");
        assert_eq!(d.entry_state, 0);
        assert_eq!(d.exit_state, Some(3));
        assert_eq!(d.cases.len(), 3);
        assert!(d.confidence >= 0.5, "confidence {}", d.confidence);
    }

    #[test]
    fn test_flat_code_detects_nothing() {
        let state = state_of("var x = 10; var y = 20; console.log(x + y);");
        assert!(detect(&state).is_empty());
    }

    #[test]
    fn test_computed_state_write_disqualifies() {
        let state = state_of(
            "var s = 0; while (s != 3) { switch (s) { case 0: s = s + 1; break; } }",
        );
        assert!(detect(&state).is_empty());
    }

    #[test]
    fn test_non_literal_case_disqualifies() {
        let state =
            state_of("var s = 0; while (s != 3) { switch (s) { case k: s = 3; break; } }");
        assert!(detect(&state).is_empty());
    }

    #[test]
    fn test_while_true_form_detected() {
        let state = state_of(
            "var s = 0; while (true) { switch (s) { case 0: s = 1; break; case 1: work(); break; } }",
        );
        let found = detect(&state);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].exit_state, None);
    }
}
