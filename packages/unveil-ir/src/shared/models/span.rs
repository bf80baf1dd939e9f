//! Source location tracking
//!
//! A span is the region of the original obfuscated source a node came
//! from, carried through every transformation that can preserve it. The
//! lowering stamps spans from the parser's positions; the printer reads
//! them back when emitting source-map mappings. Nodes synthesized by
//! passes carry no span at all, and a defaulted span is explicitly
//! recognizable as synthetic so it never leaks into a source map.
//!
//! Lines are 1-based, columns 0-based, both ends inclusive.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Span {
    pub fn new(start: (u32, u32), end: (u32, u32)) -> Self {
        Self {
            line: start.0,
            column: start.1,
            end_line: end.0,
            end_column: end.1,
        }
    }

    /// Placeholder for nodes that never existed in the input
    pub fn synthetic() -> Self {
        Self::new((0, 0), (0, 0))
    }

    /// Synthetic spans carry no usable origin; the printer skips them
    /// when emitting mappings
    pub fn is_synthetic(&self) -> bool {
        self.line == 0
    }

    /// Start position, the anchor a source-map mapping points at
    pub fn start(&self) -> (u32, u32) {
        (self.line, self.column)
    }

    /// The smallest span covering both inputs. Template strings lower to
    /// concatenation chains whose intermediate nodes span the fragments
    /// they join; a synthetic side yields the other side unchanged.
    pub fn merge(&self, other: &Span) -> Span {
        if self.is_synthetic() {
            return *other;
        }
        if other.is_synthetic() {
            return *self;
        }
        let start = (self.start()).min(other.start());
        let self_end = (self.end_line, self.end_column);
        let other_end = (other.end_line, other.end_column);
        Span::new(start, self_end.max(other_end))
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::synthetic()
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}..{}:{}",
            self.line, self.column, self.end_line, self.end_column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;
    use crate::shared::models::{IrState, NodeKind};

    /// Spans stamped by the lowering line up with the input text
    #[test]
    fn test_lowered_nodes_carry_source_positions() {
        let lowered = parse_source("var first = 1;\nuse(first);", "spans.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);

        let body = state.program_body();
        let decl_span = state.node(body[0]).and_then(|n| n.span).unwrap();
        assert_eq!(decl_span.start(), (1, 0));
        assert!(!decl_span.is_synthetic());

        let call_span = state.node(body[1]).and_then(|n| n.span).unwrap();
        assert_eq!(call_span.line, 2);

        // The identifier inside the call sits past the callee
        let use_arg = state
            .subtree_nodes(body[1])
            .into_iter()
            .find(|&n| {
                matches!(state.kind(n), Some(NodeKind::Identifier { name }) if name == "first")
            })
            .unwrap();
        let arg_span = state.node(use_arg).and_then(|n| n.span).unwrap();
        assert_eq!(arg_span.line, 2);
        assert!(arg_span.column > call_span.column);
    }

    #[test]
    fn test_merge_covers_both_fragments() {
        let head = Span::new((3, 4), (3, 9));
        let tail = Span::new((3, 12), (4, 1));
        let merged = head.merge(&tail);
        assert_eq!(merged.start(), (3, 4));
        assert_eq!((merged.end_line, merged.end_column), (4, 1));
        // Order of the operands does not matter
        assert_eq!(tail.merge(&head), merged);
    }

    #[test]
    fn test_merge_ignores_synthetic_sides() {
        let real = Span::new((7, 2), (7, 10));
        assert_eq!(Span::synthetic().merge(&real), real);
        assert_eq!(real.merge(&Span::synthetic()), real);
    }

    #[test]
    fn test_default_is_synthetic() {
        assert!(Span::default().is_synthetic());
        assert!(!Span::new((1, 0), (1, 1)).is_synthetic());
    }

    /// Template strings fold to concatenations whose spans keep covering
    /// the whole literal
    #[test]
    fn test_template_chain_spans_cover_the_literal() {
        let lowered = parse_source("var t = `a${x}b${y}`;", "tpl.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let chain_root = state
            .subtree_nodes(state.root)
            .into_iter()
            .find(|&n| matches!(state.kind(n), Some(NodeKind::Binary { .. })))
            .unwrap();
        let span = state.node(chain_root).and_then(|n| n.span).unwrap();
        assert_eq!(span.line, 1);
        // The chain covers from the first fragment through the last
        assert!(span.end_column > span.column);
    }
}
