//! Structuring
//!
//! Converts the flat shapes earlier passes leave behind into idiomatic
//! constructs: `while (true)` loops with a guarded break become `while` /
//! `do…while`, guarded-return chains become ternary returns, and if-else
//! ladders over one discriminant become switches. Every rewrite is
//! applied only when the structural conditions prove equivalence; nothing
//! matches on statement text.

pub mod rewriter;

pub use rewriter::StructuringPass;
