//! Intelligent renaming
//!
//! Obfuscated-looking identifiers get descriptive names, scope-correctly:
//! all occurrences of one binding rename together, collisions pick up an
//! integer suffix. Names come from a context heuristic over the
//! initializer and usage; an external naming helper may be consulted when
//! present, with its answers validated and discarded on any failure. Low
//! confidence renames surface as suggestions instead of being applied.

pub mod heuristic;
pub mod ports;
pub mod renamer;

pub use heuristic::{classify_name, is_valid_identifier, suggest_base_name};
pub use ports::{NamingContext, NamingHelper};
pub use renamer::RenamingPass;
