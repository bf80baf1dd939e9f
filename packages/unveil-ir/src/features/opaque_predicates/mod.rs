//! Opaque-predicate elimination
//!
//! Boolean expressions in branch positions whose truth value is fixed on
//! all inputs collapse to literals, and the surrounding construct is
//! canonicalized. Known tautology/contradiction shapes match against a
//! pattern library with prior confidences; everything else below the
//! complexity bound lowers to a bit-vector/linear-arithmetic query
//! against whatever solver the driver supplied. No solver means no
//! queries: the pass degrades to pattern-only elimination.

pub mod eliminate;
pub mod lowering;
pub mod patterns;

pub use eliminate::OpaquePredicatePass;
pub use lowering::ir_to_smt;
pub use patterns::{match_opaque, PatternVerdict};
