//! Parser port

use crate::pipeline::error::PipelineResult;

/// Requested parse goal; ambiguity is resolved by trying module first and
/// falling back to script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Module,
    Script,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Module => "module",
            SourceType::Script => "script",
        }
    }
}

/// A parsed surface tree plus the text it was parsed from
pub struct ParseTree {
    pub tree: tree_sitter::Tree,
    pub text: String,
    pub source_type: SourceType,
}

/// The external parser contract: pure text-in, tree-out
pub trait ParserPort {
    fn parse(&self, text: &str, source_type: SourceType) -> PipelineResult<ParseTree>;
}
