//! Side-effect classification
//!
//! The eight-element effect taxonomy shared by constant propagation
//! (function purity), dead-code elimination (removal safety), and the
//! decoder lifter (replacement safety). A computation is pure when its
//! effect set is empty.

pub mod classifier;

pub use classifier::{expr_effects, function_effects, stmt_effects, Effect, EffectSet};
