//! Dead-code elimination
//!
//! Removes statements whose outputs are live on no outgoing path and
//! whose evaluation has no observable effect: unreachable code behind
//! terminators, unread bindings with pure initializers, dead stores found
//! by backward liveness, pure expression statements, and the empty shells
//! all of that leaves behind. Runs to an internal fixpoint, which is what
//! makes a second scheduled run a no-op.

pub mod eliminate;
pub mod liveness;

pub use eliminate::DeadCodePass;
pub use liveness::Liveness;
