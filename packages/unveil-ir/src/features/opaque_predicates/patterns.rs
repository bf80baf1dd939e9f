//! Tautology and contradiction pattern library

use crate::shared::models::node::{BinaryOp, LiteralValue, NodeId, NodeKind};
use crate::shared::models::IrState;

/// A matched opaque shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternVerdict {
    pub value: bool,
    pub confidence: f64,
    pub pattern: &'static str,
}

type PatternFn = fn(&IrState, NodeId) -> Option<PatternVerdict>;

/// Ordered by decreasing prior confidence; first match wins
static PATTERNS: &[PatternFn] = &[
    self_comparison,
    xor_self_zero,
    sub_self_zero,
    or_zero_identity,
    and_one_vs_mod_two,
    mul_identity,
    add_zero_identity,
    mul_zero,
];

/// Match the expression against the library
pub fn match_opaque(state: &IrState, expr: NodeId) -> Option<PatternVerdict> {
    PATTERNS.iter().find_map(|p| p(state, expr))
}

fn verdict(value: bool, confidence: f64, pattern: &'static str) -> Option<PatternVerdict> {
    Some(PatternVerdict {
        value,
        confidence,
        pattern,
    })
}

/// Two sides naming the same variable
fn same_variable(state: &IrState, a: NodeId, b: NodeId) -> bool {
    match (
        state.kind(a).and_then(NodeKind::variable_name),
        state.kind(b).and_then(NodeKind::variable_name),
    ) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn number_literal(state: &IrState, id: NodeId, expected: f64) -> bool {
    matches!(
        state.kind(id),
        Some(NodeKind::Literal {
            value: LiteralValue::Number(n)
        }) if *n == expected
    )
}

fn equality(op: BinaryOp) -> Option<bool> {
    match op {
        BinaryOp::Eq | BinaryOp::StrictEq => Some(true),
        BinaryOp::NotEq | BinaryOp::StrictNotEq => Some(false),
        _ => None,
    }
}

/// `x === x` is true, `x !== x` false
fn self_comparison(state: &IrState, expr: NodeId) -> Option<PatternVerdict> {
    let NodeKind::Binary { op, left, right } = state.kind(expr)? else {
        return None;
    };
    let positive = equality(*op)?;
    if same_variable(state, *left, *right) {
        return verdict(positive, 0.95, "self-comparison");
    }
    None
}

/// `(x ^ x) === 0` is true for every x
fn xor_self_zero(state: &IrState, expr: NodeId) -> Option<PatternVerdict> {
    bitwise_self_vs_zero(state, expr, BinaryOp::BitXor, "xor-self")
}

/// `(x - x) === 0`; slightly weaker, NaN escapes it
fn sub_self_zero(state: &IrState, expr: NodeId) -> Option<PatternVerdict> {
    bitwise_self_vs_zero(state, expr, BinaryOp::Sub, "sub-self").map(|v| PatternVerdict {
        confidence: 0.85,
        ..v
    })
}

fn bitwise_self_vs_zero(
    state: &IrState,
    expr: NodeId,
    inner_op: BinaryOp,
    name: &'static str,
) -> Option<PatternVerdict> {
    let NodeKind::Binary { op, left, right } = state.kind(expr)? else {
        return None;
    };
    let positive = equality(*op)?;
    let (combo, zero) = if number_literal(state, *right, 0.0) {
        (*left, *right)
    } else if number_literal(state, *left, 0.0) {
        (*right, *left)
    } else {
        return None;
    };
    let _ = zero;
    let NodeKind::Binary {
        op: found_op,
        left: a,
        right: b,
    } = state.kind(combo)?
    else {
        return None;
    };
    if *found_op == inner_op && same_variable(state, *a, *b) {
        return verdict(positive, 0.95, name);
    }
    None
}

/// `(x | 0) === x`: true under the 32-bit integer assumption the
/// dispatcher family relies on
fn or_zero_identity(state: &IrState, expr: NodeId) -> Option<PatternVerdict> {
    let NodeKind::Binary { op, left, right } = state.kind(expr)? else {
        return None;
    };
    let positive = equality(*op)?;
    for (combo, plain) in [(*left, *right), (*right, *left)] {
        if let Some(NodeKind::Binary {
            op: BinaryOp::BitOr,
            left: a,
            right: b,
        }) = state.kind(combo)
        {
            let zero_side = if number_literal(state, *b, 0.0) {
                Some(*a)
            } else if number_literal(state, *a, 0.0) {
                Some(*b)
            } else {
                None
            };
            if let Some(var) = zero_side {
                if same_variable(state, var, plain) {
                    return verdict(positive, 0.85, "or-zero-identity");
                }
            }
        }
    }
    None
}

/// `(x & 1) === (x % 2)`
fn and_one_vs_mod_two(state: &IrState, expr: NodeId) -> Option<PatternVerdict> {
    let NodeKind::Binary { op, left, right } = state.kind(expr)? else {
        return None;
    };
    let positive = equality(*op)?;
    for (masked, modded) in [(*left, *right), (*right, *left)] {
        let and_var = match state.kind(masked) {
            Some(NodeKind::Binary {
                op: BinaryOp::BitAnd,
                left: a,
                right: b,
            }) if number_literal(state, *b, 1.0) => Some(*a),
            _ => None,
        };
        let mod_var = match state.kind(modded) {
            Some(NodeKind::Binary {
                op: BinaryOp::Rem,
                left: a,
                right: b,
            }) if number_literal(state, *b, 2.0) => Some(*a),
            _ => None,
        };
        if let (Some(av), Some(mv)) = (and_var, mod_var) {
            if same_variable(state, av, mv) {
                return verdict(positive, 0.85, "and-one-mod-two");
            }
        }
    }
    None
}

/// `(x * 1) === x`
fn mul_identity(state: &IrState, expr: NodeId) -> Option<PatternVerdict> {
    arithmetic_identity(state, expr, BinaryOp::Mul, 1.0, "mul-one-identity")
}

/// `(x + 0) === x`
fn add_zero_identity(state: &IrState, expr: NodeId) -> Option<PatternVerdict> {
    arithmetic_identity(state, expr, BinaryOp::Add, 0.0, "add-zero-identity")
}

fn arithmetic_identity(
    state: &IrState,
    expr: NodeId,
    inner_op: BinaryOp,
    unit: f64,
    name: &'static str,
) -> Option<PatternVerdict> {
    let NodeKind::Binary { op, left, right } = state.kind(expr)? else {
        return None;
    };
    let positive = equality(*op)?;
    for (combo, plain) in [(*left, *right), (*right, *left)] {
        if let Some(NodeKind::Binary {
            op: found,
            left: a,
            right: b,
        }) = state.kind(combo)
        {
            if *found != inner_op {
                continue;
            }
            let var = if number_literal(state, *b, unit) {
                Some(*a)
            } else if number_literal(state, *a, unit) {
                Some(*b)
            } else {
                None
            };
            if let Some(var) = var {
                if same_variable(state, var, plain) {
                    // Numeric-identity shapes fail for NaN and strings
                    return verdict(positive, 0.8, name);
                }
            }
        }
    }
    None
}

/// `(x * 0) === 0`
fn mul_zero(state: &IrState, expr: NodeId) -> Option<PatternVerdict> {
    let NodeKind::Binary { op, left, right } = state.kind(expr)? else {
        return None;
    };
    let positive = equality(*op)?;
    for (combo, zero) in [(*left, *right), (*right, *left)] {
        if !number_literal(state, zero, 0.0) {
            continue;
        }
        if let Some(NodeKind::Binary {
            op: BinaryOp::Mul,
            left: a,
            right: b,
        }) = state.kind(combo)
        {
            if number_literal(state, *a, 0.0) || number_literal(state, *b, 0.0) {
                return verdict(positive, 0.8, "mul-zero");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;
    use crate::shared::models::IrState;

    /// Parse `if (<expr>) f();` and return the test expression
    fn test_expr_of(cond: &str) -> (IrState, NodeId) {
        let src = format!("if ({cond}) f();");
        let lowered = parse_source(&src, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let stmt = state.program_body()[0];
        let NodeKind::If { test, .. } = state.kind(stmt).unwrap() else {
            panic!("expected if");
        };
        (state.clone(), *test)
    }

    #[test]
    fn test_self_comparison() {
        let (state, expr) = test_expr_of("x === x");
        let v = match_opaque(&state, expr).unwrap();
        assert!(v.value);
        assert!(v.confidence >= 0.9);
    }

    #[test]
    fn test_self_inequality_is_contradiction() {
        let (state, expr) = test_expr_of("x !== x");
        let v = match_opaque(&state, expr).unwrap();
        assert!(!v.value);
    }

    #[test]
    fn test_xor_self() {
        let (state, expr) = test_expr_of("(y ^ y) === 0");
        let v = match_opaque(&state, expr).unwrap();
        assert!(v.value);
        assert_eq!(v.pattern, "xor-self");
    }

    #[test]
    fn test_or_zero_identity() {
        let (state, expr) = test_expr_of("(x | 0) === x");
        let v = match_opaque(&state, expr).unwrap();
        assert!(v.value);
    }

    #[test]
    fn test_and_one_vs_mod_two() {
        let (state, expr) = test_expr_of("(x & 1) === (x % 2)");
        let v = match_opaque(&state, expr).unwrap();
        assert!(v.value);
        assert_eq!(v.pattern, "and-one-mod-two");
    }

    #[test]
    fn test_different_variables_do_not_match() {
        let (state, expr) = test_expr_of("(x ^ y) === 0");
        assert!(match_opaque(&state, expr).is_none());
    }

    #[test]
    fn test_ordinary_condition_does_not_match() {
        let (state, expr) = test_expr_of("x > 10");
        assert!(match_opaque(&state, expr).is_none());
    }
}
