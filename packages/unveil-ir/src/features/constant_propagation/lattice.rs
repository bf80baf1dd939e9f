//! Abstract-value lattice
//!
//! The enhanced analysis tracks {⊥, constant, integer-range, sealed
//! object, pure function, ⊤} with an explicit join. Top and bottom are
//! their own variants, never sentinel values.

use std::collections::BTreeMap;

use crate::shared::models::node::LiteralValue;
use crate::shared::models::NodeId;

#[derive(Debug, Clone, PartialEq)]
pub enum AbstractValue {
    /// No information has reached this point yet
    Bottom,
    Constant(LiteralValue),
    /// Inclusive integer interval
    IntRange { lo: i64, hi: i64 },
    /// Object literal whose property set is closed and known
    SealedObject(BTreeMap<String, AbstractValue>),
    /// Function with an empty effect summary
    PureFunction { node: NodeId },
    /// Anything
    Top,
}

impl AbstractValue {
    pub fn from_literal(lit: &LiteralValue) -> Self {
        AbstractValue::Constant(lit.clone())
    }

    pub fn as_constant(&self) -> Option<&LiteralValue> {
        match self {
            AbstractValue::Constant(lit) => Some(lit),
            _ => None,
        }
    }

    /// Integer view of constants and ranges
    pub fn as_range(&self) -> Option<(i64, i64)> {
        match self {
            AbstractValue::IntRange { lo, hi } => Some((*lo, *hi)),
            AbstractValue::Constant(lit) => lit.as_integer().map(|v| (v, v)),
            _ => None,
        }
    }

    /// Standard lattice join
    pub fn join(&self, other: &AbstractValue) -> AbstractValue {
        use AbstractValue::*;
        match (self, other) {
            (Bottom, v) | (v, Bottom) => v.clone(),
            (Top, _) | (_, Top) => Top,
            (Constant(a), Constant(b)) if a == b => Constant(a.clone()),
            // Unequal constants generalize to a range when integral
            (a, b) => match (a.as_range(), b.as_range()) {
                (Some((alo, ahi)), Some((blo, bhi))) => IntRange {
                    lo: alo.min(blo),
                    hi: ahi.max(bhi),
                },
                _ => match (a, b) {
                    (SealedObject(x), SealedObject(y)) if x == y => SealedObject(x.clone()),
                    (PureFunction { node: x }, PureFunction { node: y }) if x == y => {
                        PureFunction { node: *x }
                    }
                    _ => Top,
                },
            },
        }
    }

    /// A branch condition with a known truth value enables
    /// path-sensitivity
    pub fn known_truthiness(&self) -> Option<bool> {
        match self {
            AbstractValue::Constant(lit) => lit.truthiness(),
            AbstractValue::IntRange { lo, hi } => {
                if *lo > 0 || *hi < 0 {
                    Some(true)
                } else if *lo == 0 && *hi == 0 {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_identity_with_bottom() {
        let c = AbstractValue::Constant(LiteralValue::Number(3.0));
        assert_eq!(AbstractValue::Bottom.join(&c), c);
        assert_eq!(c.join(&AbstractValue::Bottom), c);
    }

    #[test]
    fn test_join_equal_constants() {
        let a = AbstractValue::Constant(LiteralValue::Number(5.0));
        let b = AbstractValue::Constant(LiteralValue::Number(5.0));
        assert_eq!(a.join(&b), a);
    }

    #[test]
    fn test_join_unequal_integers_forms_range() {
        let a = AbstractValue::Constant(LiteralValue::Number(1.0));
        let b = AbstractValue::Constant(LiteralValue::Number(4.0));
        assert_eq!(a.join(&b), AbstractValue::IntRange { lo: 1, hi: 4 });
    }

    #[test]
    fn test_join_mixed_kinds_is_top() {
        let a = AbstractValue::Constant(LiteralValue::Number(1.0));
        let b = AbstractValue::Constant(LiteralValue::String("x".into()));
        assert_eq!(a.join(&b), AbstractValue::Top);
    }

    #[test]
    fn test_range_truthiness() {
        assert_eq!(
            AbstractValue::IntRange { lo: 1, hi: 9 }.known_truthiness(),
            Some(true)
        );
        assert_eq!(
            AbstractValue::IntRange { lo: 0, hi: 0 }.known_truthiness(),
            Some(false)
        );
        assert_eq!(
            AbstractValue::IntRange { lo: -1, hi: 1 }.known_truthiness(),
            None
        );
    }
}
