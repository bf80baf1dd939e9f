//! Feature modules, one vertical slice per concern

pub mod constant_propagation;
pub mod copy_propagation;
pub mod dead_code;
pub mod decoder_lifting;
pub mod deflatten;
pub mod dominance;
pub mod effects;
pub mod eval;
pub mod flow_graph;
pub mod opaque_predicates;
pub mod parsing;
pub mod printing;
pub mod renaming;
pub mod scopes;
pub mod smt;
pub mod ssa;
pub mod structuring;
