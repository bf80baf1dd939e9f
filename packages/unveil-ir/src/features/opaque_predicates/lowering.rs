//! IR → solver expression lowering
//!
//! Only the integer fragment lowers: identifiers become 32-bit
//! variables, integral number literals become constants, and the
//! operator sets map one-to-one. Anything else (strings, calls, property
//! reads) refuses, and the caller skips the query.

use crate::features::smt::expr::{SmtBinOp, SmtCmpOp, SmtExpr, SmtLogicOp, SmtUnOp};
use crate::shared::models::node::{BinaryOp, LiteralValue, LogicalOp, NodeId, NodeKind, UnaryOp};
use crate::shared::models::IrState;

pub fn ir_to_smt(state: &IrState, expr: NodeId) -> Option<SmtExpr> {
    match state.kind(expr)? {
        NodeKind::Identifier { name } | NodeKind::SsaName { name, .. } => {
            Some(SmtExpr::Var {
                name: name.clone(),
                width: Some(32),
            })
        }
        NodeKind::Literal { value } => match value {
            LiteralValue::Number(_) => value.as_integer().map(SmtExpr::Const),
            LiteralValue::Boolean(b) => Some(SmtExpr::BoolConst(*b)),
            _ => None,
        },
        NodeKind::Binary { op, left, right } => {
            let l = Box::new(ir_to_smt(state, *left)?);
            let r = Box::new(ir_to_smt(state, *right)?);
            if let Some(cmp) = comparison_of(*op) {
                return Some(SmtExpr::Compare {
                    op: cmp,
                    left: l,
                    right: r,
                });
            }
            let bin = match op {
                BinaryOp::Add => SmtBinOp::Add,
                BinaryOp::Sub => SmtBinOp::Sub,
                BinaryOp::Mul => SmtBinOp::Mul,
                BinaryOp::Div => SmtBinOp::Div,
                BinaryOp::Rem => SmtBinOp::Rem,
                BinaryOp::BitAnd => SmtBinOp::BitAnd,
                BinaryOp::BitOr => SmtBinOp::BitOr,
                BinaryOp::BitXor => SmtBinOp::BitXor,
                BinaryOp::Shl => SmtBinOp::Shl,
                BinaryOp::Shr => SmtBinOp::Shr,
                BinaryOp::UShr => SmtBinOp::UShr,
                _ => return None,
            };
            Some(SmtExpr::Binary {
                op: bin,
                left: l,
                right: r,
            })
        }
        NodeKind::Unary { op, argument } => {
            let operand = Box::new(ir_to_smt(state, *argument)?);
            let un = match op {
                UnaryOp::Minus => SmtUnOp::Neg,
                UnaryOp::BitNot => SmtUnOp::BitNot,
                UnaryOp::Not => SmtUnOp::Not,
                _ => return None,
            };
            Some(SmtExpr::Unary { op: un, operand })
        }
        NodeKind::Logical { op, left, right } => {
            let logic = match op {
                LogicalOp::And => SmtLogicOp::And,
                LogicalOp::Or => SmtLogicOp::Or,
                LogicalOp::Nullish => return None,
            };
            Some(SmtExpr::Logic {
                op: logic,
                operands: vec![ir_to_smt(state, *left)?, ir_to_smt(state, *right)?],
            })
        }
        _ => None,
    }
}

/// Loose and strict equality both lower to integer equality; the lowered
/// theory has a single integer sort
fn comparison_of(op: BinaryOp) -> Option<SmtCmpOp> {
    Some(match op {
        BinaryOp::Eq | BinaryOp::StrictEq => SmtCmpOp::Eq,
        BinaryOp::NotEq | BinaryOp::StrictNotEq => SmtCmpOp::Ne,
        BinaryOp::Lt => SmtCmpOp::Lt,
        BinaryOp::LtEq => SmtCmpOp::Le,
        BinaryOp::Gt => SmtCmpOp::Gt,
        BinaryOp::GtEq => SmtCmpOp::Ge,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;

    fn lower_cond(cond: &str) -> Option<SmtExpr> {
        let src = format!("if ({cond}) f();");
        let lowered = parse_source(&src, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let stmt = state.program_body()[0];
        let NodeKind::If { test, .. } = state.kind(stmt).unwrap() else {
            panic!("expected if");
        };
        ir_to_smt(&state, *test)
    }

    #[test]
    fn test_lowers_bitwise_equality() {
        let expr = lower_cond("(a ^ a) === 0").unwrap();
        assert_eq!(expr.variables(), vec!["a".to_string()]);
        assert!(expr.is_bit_local(16));
    }

    #[test]
    fn test_refuses_strings() {
        assert!(lower_cond("s === 'x'").is_none());
    }

    #[test]
    fn test_refuses_calls() {
        assert!(lower_cond("f(x) === 0").is_none());
    }

    #[test]
    fn test_lowers_arithmetic_comparison() {
        let expr = lower_cond("x + 1 > x").unwrap();
        assert_eq!(expr.node_count(), 5);
    }
}
