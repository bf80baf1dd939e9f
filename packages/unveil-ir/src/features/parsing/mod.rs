//! Surface parsing and AST→IR lowering
//!
//! The external parser sits behind `ParserPort`; the bundled
//! implementation wraps tree-sitter with the JavaScript grammar. The
//! lowering walks the CST into the IR node map, preserving source spans
//! and reporting unsupported constructs as warnings rather than failing.

pub mod lowering;
pub mod ports;
pub mod tree_sitter_parser;

pub use lowering::{lower, Lowered};
pub use ports::{ParseTree, ParserPort, SourceType};
pub use tree_sitter_parser::TreeSitterParser;

use crate::pipeline::error::PipelineResult;

/// Parse text and lower it to IR in one step, module-first with script
/// fallback
pub fn parse_source(text: &str, source_name: &str) -> PipelineResult<Lowered> {
    let parser = TreeSitterParser::new();
    let tree = match parser.parse(text, SourceType::Module) {
        Ok(tree) => tree,
        Err(_) => parser.parse(text, SourceType::Script)?,
    };
    lower(&tree, source_name)
}
