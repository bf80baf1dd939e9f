//! Control-flow deflattening
//!
//! Recognizes the switch-dispatcher family: a state variable initialized
//! to an entry value driving `while (s != exit) switch (s) { ... }`, with
//! every assignment to the state variable a numeric literal. The case
//! transitions form a state graph; linear chains come back as sequences,
//! two-way splits as if/else, single-back-edge cycles as loops. Anything
//! the reconstruction cannot prove is left exactly as it was, with a
//! warning.

pub mod detector;
pub mod rewriter;
pub mod state_graph;

pub use detector::{detect, Dispatcher};
pub use rewriter::DeflattenPass;
pub use state_graph::{CaseFlow, StateGraph, Transition};
