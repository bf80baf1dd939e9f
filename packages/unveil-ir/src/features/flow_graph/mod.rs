//! Control-flow graph construction
//!
//! One forward walk over a statement list, splitting at every statement
//! that terminates a block. Compound statements decompose: their simple
//! statements land in blocks, their controlling expressions ride on the
//! conditional edges. Unreachable statements are placed in edge-less
//! blocks and flagged, never dropped; dead-code elimination owns their
//! removal.

pub mod builder;

pub use builder::{build_cfg, rebuild_cfgs};
