//! Scope analysis
//!
//! Resolves identifier occurrences to bindings with ECMAScript scoping
//! rules: `var` and function declarations hoist to the enclosing function
//! body, `let`/`const` bind in their block, parameters and catch clauses
//! bind in their own scopes. Consumed by SSA construction (which variables
//! are safe to version), dead-code elimination (read counts), and
//! renaming (scope-correct rename sets).

pub mod binder;

pub use binder::{bind, Binding, BindingKind, OccKind, Occurrence, ScopeAnalysis};
