//! Source-map model
//!
//! Generated-to-original position mappings for every printed token whose
//! IR node carried a source location.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub original_line: u32,
    pub original_column: u32,
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMap {
    pub source_name: String,
    pub mappings: Vec<Mapping>,
}

impl SourceMap {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            mappings: Vec::new(),
        }
    }

    pub fn add(&mut self, generated: (u32, u32), original: (u32, u32)) {
        self.mappings.push(Mapping {
            generated_line: generated.0,
            generated_column: generated.1,
            original_line: original.0,
            original_column: original.1,
            source: self.source_name.clone(),
        });
    }
}
