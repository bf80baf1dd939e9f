//! Tree-sitter parser implementation
//!
//! This is where the tree-sitter dependency lives. Hash-bang lines are
//! tolerated (the grammar knows them); a tree containing ERROR or MISSING
//! nodes is a parse failure, reported before any IR is produced.

use tree_sitter::Parser as TsParser;

use crate::pipeline::error::{PipelineError, PipelineResult};

use super::ports::{ParseTree, ParserPort, SourceType};

pub struct TreeSitterParser;

impl TreeSitterParser {
    pub fn new() -> Self {
        Self
    }

    fn first_error_position(node: tree_sitter::Node<'_>) -> Option<(usize, usize)> {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            return Some((pos.row + 1, pos.column));
        }
        if !node.has_error() {
            return None;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if let Some(found) = Self::first_error_position(child) {
                return Some(found);
            }
        }
        None
    }
}

impl Default for TreeSitterParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserPort for TreeSitterParser {
    fn parse(&self, text: &str, source_type: SourceType) -> PipelineResult<ParseTree> {
        let mut parser = TsParser::new();
        parser
            .set_language(&tree_sitter_javascript::language())
            .map_err(|e| {
                PipelineError::collaborator("parser", format!("language init failed: {e}"))
            })?;

        let tree = parser
            .parse(text, None)
            .ok_or_else(|| PipelineError::parse("<input>", "parser returned no tree"))?;

        if tree.root_node().has_error() {
            let (line, col) =
                Self::first_error_position(tree.root_node()).unwrap_or((0, 0));
            return Err(PipelineError::parse(
                "<input>",
                format!("syntax error at {line}:{col}"),
            ));
        }

        Ok(ParseTree {
            tree,
            text: text.to_string(),
            source_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_plain_script() {
        let parser = TreeSitterParser::new();
        let tree = parser.parse("var a = 1;", SourceType::Script).unwrap();
        assert_eq!(tree.tree.root_node().kind(), "program");
    }

    #[test]
    fn test_tolerates_hash_bang() {
        let parser = TreeSitterParser::new();
        let tree = parser
            .parse("#!/usr/bin/env node\nvar a = 1;", SourceType::Script)
            .unwrap();
        assert!(!tree.tree.root_node().has_error());
    }

    #[test]
    fn test_rejects_broken_source() {
        let parser = TreeSitterParser::new();
        let err = parser.parse("var = = ;", SourceType::Script);
        assert!(matches!(err, Err(PipelineError::Parse { .. })));
    }
}
