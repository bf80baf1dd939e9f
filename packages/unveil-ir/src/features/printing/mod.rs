//! Source emission
//!
//! Structured printing of the IR back to text with precedence-aware
//! parenthesization, plus source-map mappings for nodes that kept their
//! original location. The final pipeline print runs behind a check that
//! no SSA identifier survived destruction.

pub mod printer;
pub mod source_map;

pub use printer::{assert_no_ssa, print_expression, print_program, print_with_source_map};
pub use source_map::{Mapping, SourceMap};
