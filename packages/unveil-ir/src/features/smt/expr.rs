//! Solver-facing expression tree
//!
//! A small closed set of node kinds over the theory of 32-bit bit-vectors
//! and linear integer arithmetic. Evaluation mirrors the ECMAScript
//! integer semantics the opaque-predicate lowering assumes: bitwise
//! operators work on wrapped 32-bit values, arithmetic on wider integers.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmtBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

impl SmtBinOp {
    /// Per-bit independent operators; the bounded checker's sound fragment
    pub fn is_bit_local(&self) -> bool {
        matches!(self, SmtBinOp::BitAnd | SmtBinOp::BitOr | SmtBinOp::BitXor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmtUnOp {
    Neg,
    BitNot,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmtCmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmtLogicOp {
    And,
    Or,
}

/// Closed expression tree handed to solvers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SmtExpr {
    Const(i64),
    BoolConst(bool),
    Var {
        name: String,
        /// Bit width hint; `None` means mathematical integer
        width: Option<u32>,
    },
    Binary {
        op: SmtBinOp,
        left: Box<SmtExpr>,
        right: Box<SmtExpr>,
    },
    Unary {
        op: SmtUnOp,
        operand: Box<SmtExpr>,
    },
    Compare {
        op: SmtCmpOp,
        left: Box<SmtExpr>,
        right: Box<SmtExpr>,
    },
    Logic {
        op: SmtLogicOp,
        operands: Vec<SmtExpr>,
    },
}

/// Evaluation result: the tree mixes integer and boolean sorts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmtVal {
    Int(i64),
    Bool(bool),
}

impl SmtExpr {
    pub fn var(name: impl Into<String>) -> Self {
        SmtExpr::Var {
            name: name.into(),
            width: Some(32),
        }
    }

    pub fn negated(self) -> Self {
        SmtExpr::Unary {
            op: SmtUnOp::Not,
            operand: Box::new(self),
        }
    }

    /// Distinct variable names, in first-occurrence order
    pub fn variables(&self) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        self.collect_vars(&mut seen, &mut out);
        out
    }

    fn collect_vars(&self, seen: &mut FxHashSet<String>, out: &mut Vec<String>) {
        match self {
            SmtExpr::Const(_) | SmtExpr::BoolConst(_) => {}
            SmtExpr::Var { name, .. } => {
                if seen.insert(name.clone()) {
                    out.push(name.clone());
                }
            }
            SmtExpr::Binary { left, right, .. } | SmtExpr::Compare { left, right, .. } => {
                left.collect_vars(seen, out);
                right.collect_vars(seen, out);
            }
            SmtExpr::Unary { operand, .. } => operand.collect_vars(seen, out),
            SmtExpr::Logic { operands, .. } => {
                for op in operands {
                    op.collect_vars(seen, out);
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        1 + match self {
            SmtExpr::Const(_) | SmtExpr::BoolConst(_) | SmtExpr::Var { .. } => 0,
            SmtExpr::Binary { left, right, .. } | SmtExpr::Compare { left, right, .. } => {
                left.node_count() + right.node_count()
            }
            SmtExpr::Unary { operand, .. } => operand.node_count(),
            SmtExpr::Logic { operands, .. } => operands.iter().map(SmtExpr::node_count).sum(),
        }
    }

    /// Whether every integer operator is per-bit independent and every
    /// constant fits the given width; comparisons are restricted to
    /// equality. The bounded checker may only claim `unsat` here.
    pub fn is_bit_local(&self, width: u32) -> bool {
        let bound = 1i64 << (width - 1);
        match self {
            SmtExpr::Const(c) => *c >= -bound && *c < bound,
            SmtExpr::BoolConst(_) => true,
            SmtExpr::Var { .. } => true,
            SmtExpr::Binary { op, left, right } => {
                op.is_bit_local() && left.is_bit_local(width) && right.is_bit_local(width)
            }
            SmtExpr::Unary { op, operand } => {
                matches!(op, SmtUnOp::BitNot | SmtUnOp::Not) && operand.is_bit_local(width)
            }
            SmtExpr::Compare { op, left, right } => {
                matches!(op, SmtCmpOp::Eq | SmtCmpOp::Ne)
                    && left.is_bit_local(width)
                    && right.is_bit_local(width)
            }
            SmtExpr::Logic { operands, .. } => operands.iter().all(|o| o.is_bit_local(width)),
        }
    }

    /// Evaluate under a variable assignment. `None` signals a trapped
    /// evaluation (division by zero, sort mismatch); callers treat it as
    /// an undecidable point.
    pub fn eval(&self, env: &FxHashMap<String, i64>) -> Option<SmtVal> {
        match self {
            SmtExpr::Const(c) => Some(SmtVal::Int(*c)),
            SmtExpr::BoolConst(b) => Some(SmtVal::Bool(*b)),
            SmtExpr::Var { name, .. } => env.get(name).map(|&v| SmtVal::Int(v)),
            SmtExpr::Binary { op, left, right } => {
                let l = left.eval(env)?.as_int()?;
                let r = right.eval(env)?.as_int()?;
                let v = match op {
                    SmtBinOp::Add => l.wrapping_add(r),
                    SmtBinOp::Sub => l.wrapping_sub(r),
                    SmtBinOp::Mul => l.wrapping_mul(r),
                    SmtBinOp::Div => {
                        if r == 0 {
                            return None;
                        }
                        l.wrapping_div(r)
                    }
                    SmtBinOp::Rem => {
                        if r == 0 {
                            return None;
                        }
                        l.wrapping_rem(r)
                    }
                    SmtBinOp::BitAnd => ((l as i32) & (r as i32)) as i64,
                    SmtBinOp::BitOr => ((l as i32) | (r as i32)) as i64,
                    SmtBinOp::BitXor => ((l as i32) ^ (r as i32)) as i64,
                    SmtBinOp::Shl => ((l as i32) << ((r as u32) & 31)) as i64,
                    SmtBinOp::Shr => ((l as i32) >> ((r as u32) & 31)) as i64,
                    SmtBinOp::UShr => ((l as u32) >> ((r as u32) & 31)) as i64,
                };
                Some(SmtVal::Int(v))
            }
            SmtExpr::Unary { op, operand } => match op {
                SmtUnOp::Neg => Some(SmtVal::Int(operand.eval(env)?.as_int()?.wrapping_neg())),
                SmtUnOp::BitNot => Some(SmtVal::Int(!(operand.eval(env)?.as_int()? as i32) as i64)),
                SmtUnOp::Not => Some(SmtVal::Bool(!operand.eval(env)?.as_bool()?)),
            },
            SmtExpr::Compare { op, left, right } => {
                let l = left.eval(env)?.as_int()?;
                let r = right.eval(env)?.as_int()?;
                let v = match op {
                    SmtCmpOp::Eq => l == r,
                    SmtCmpOp::Ne => l != r,
                    SmtCmpOp::Lt => l < r,
                    SmtCmpOp::Le => l <= r,
                    SmtCmpOp::Gt => l > r,
                    SmtCmpOp::Ge => l >= r,
                };
                Some(SmtVal::Bool(v))
            }
            SmtExpr::Logic { op, operands } => {
                let mut acc = matches!(op, SmtLogicOp::And);
                for operand in operands {
                    let b = operand.eval(env)?.as_bool()?;
                    match op {
                        SmtLogicOp::And => acc = acc && b,
                        SmtLogicOp::Or => acc = acc || b,
                    }
                }
                Some(SmtVal::Bool(acc))
            }
        }
    }
}

impl SmtVal {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SmtVal::Int(v) => Some(*v),
            SmtVal::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SmtVal::Bool(v) => Some(*v),
            // Integers coerce for lowered truthiness tests
            SmtVal::Int(v) => Some(*v != 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, i64)]) -> FxHashMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_xor_self_is_zero() {
        // (x ^ x) == 0
        let expr = SmtExpr::Compare {
            op: SmtCmpOp::Eq,
            left: Box::new(SmtExpr::Binary {
                op: SmtBinOp::BitXor,
                left: Box::new(SmtExpr::var("x")),
                right: Box::new(SmtExpr::var("x")),
            }),
            right: Box::new(SmtExpr::Const(0)),
        };
        for v in [-5i64, 0, 123456] {
            assert_eq!(expr.eval(&env(&[("x", v)])), Some(SmtVal::Bool(true)));
        }
        assert!(expr.is_bit_local(8));
        assert_eq!(expr.variables(), vec!["x".to_string()]);
    }

    #[test]
    fn test_division_by_zero_traps() {
        let expr = SmtExpr::Binary {
            op: SmtBinOp::Div,
            left: Box::new(SmtExpr::Const(1)),
            right: Box::new(SmtExpr::var("x")),
        };
        assert_eq!(expr.eval(&env(&[("x", 0)])), None);
        assert_eq!(expr.eval(&env(&[("x", 2)])), Some(SmtVal::Int(0)));
    }

    #[test]
    fn test_bit_local_excludes_arithmetic() {
        let expr = SmtExpr::Binary {
            op: SmtBinOp::Add,
            left: Box::new(SmtExpr::var("x")),
            right: Box::new(SmtExpr::Const(1)),
        };
        assert!(!expr.is_bit_local(8));
    }

    #[test]
    fn test_wide_constant_leaves_fragment() {
        let expr = SmtExpr::Compare {
            op: SmtCmpOp::Eq,
            left: Box::new(SmtExpr::Binary {
                op: SmtBinOp::BitOr,
                left: Box::new(SmtExpr::var("x")),
                right: Box::new(SmtExpr::Const(0xFF00)),
            }),
            right: Box::new(SmtExpr::var("x")),
        };
        assert!(!expr.is_bit_local(8));
        assert!(expr.is_bit_local(32));
    }

    #[test]
    fn test_node_count() {
        let expr = SmtExpr::Binary {
            op: SmtBinOp::BitXor,
            left: Box::new(SmtExpr::var("x")),
            right: Box::new(SmtExpr::var("x")),
        };
        assert_eq!(expr.node_count(), 3);
    }
}
