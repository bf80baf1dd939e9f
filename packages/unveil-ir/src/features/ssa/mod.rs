//! SSA form
//!
//! Construction places φ-nodes at iterated dominance frontiers of
//! multiply-defined variables and renames along the dominator tree;
//! destruction replaces φs with predecessor copies (two-phase, through
//! temporaries, with self-copy elision) and restores original names.
//! Destruction immediately after construction is a left inverse: the
//! program comes back structurally identical.
//!
//! Variables captured by nested functions, shadowed names, and targets of
//! augmented assignments or update expressions stay out of SSA; passes
//! that consume SSA simply never see versions for them.

pub mod construct;
pub mod destruct;

pub use construct::SsaConstructPass;
pub use destruct::SsaDestructPass;
