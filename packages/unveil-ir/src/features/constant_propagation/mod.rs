//! Constant propagation
//!
//! Basic mode works directly on SSA use-def chains: uses whose reaching
//! definition is a literal are substituted where that strictly simplifies
//! the program, and fully-literal operator expressions fold through the
//! ECMAScript evaluator. Enhanced mode layers an abstract-value lattice
//! on top: values join at φ-nodes, function purity is summarized through
//! the effect taxonomy, and pure calls with constant arguments evaluate
//! at compile time under a step bound.

pub mod lattice;
pub mod partial_eval;
pub mod propagate;

pub use lattice::AbstractValue;
pub use propagate::ConstantPropagationPass;
