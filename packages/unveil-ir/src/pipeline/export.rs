//! Analysis-data export
//!
//! The structured document the CLI serializes: original and final
//! source, the ordered per-pass results with metrics and code/CFG
//! snapshots, the final CFG, and run metadata. CFG serialization encodes
//! blocks with their dominance-derived fields and typed edges; block ids
//! are strings.

use std::collections::BTreeMap;
use std::time::Duration;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::printing::{print_expression, SourceMap};
use crate::shared::models::{BlockId, Cfg, IrState};

use super::pass::{PassMetrics, Warning};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrSnapshot {
    pub node_count: usize,
    pub root: String,
}

impl IrSnapshot {
    pub fn of(state: &IrState) -> Self {
        Self {
            node_count: state.nodes.len(),
            root: state.root.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub id: String,
    pub statements: Vec<String>,
    pub predecessors: Vec<String>,
    pub successors: Vec<String>,
    pub reachable: bool,
    pub dominators: Vec<String>,
    pub immediate_dominator: Option<String>,
    pub dominance_frontier: Vec<String>,
    pub post_dominators: Vec<String>,
    pub immediate_post_dominator: Option<String>,
    pub loop_depth: u32,
    pub loop_header: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub from: String,
    pub to: String,
    pub kind: String,
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgSnapshot {
    pub entry: String,
    pub exit: String,
    pub blocks: Vec<BlockSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
    pub back_edges: Vec<(String, String)>,
    pub irreducible: bool,
}

/// Serialize one CFG with its derived fields, deterministically ordered
pub fn snapshot_cfg(state: &IrState, cfg: &Cfg) -> CfgSnapshot {
    let sorted_ids = |set: &rustc_hash::FxHashSet<BlockId>| {
        let mut v: Vec<BlockId> = set.iter().copied().collect();
        v.sort();
        v.into_iter().map(|b| b.to_string()).collect::<Vec<_>>()
    };

    CfgSnapshot {
        entry: cfg.entry.to_string(),
        exit: cfg.exit.to_string(),
        blocks: cfg
            .blocks
            .iter()
            .map(|block| BlockSnapshot {
                id: block.id.to_string(),
                statements: block.statements.iter().map(|s| s.to_string()).collect(),
                predecessors: block.preds.iter().map(|p| p.to_string()).collect(),
                successors: block.succs.iter().map(|s| s.to_string()).collect(),
                reachable: block.reachable,
                dominators: sorted_ids(&block.dominators),
                immediate_dominator: block.idom.map(|b| b.to_string()),
                dominance_frontier: sorted_ids(&block.dom_frontier),
                post_dominators: sorted_ids(&block.post_dominators),
                immediate_post_dominator: block.ipdom.map(|b| b.to_string()),
                loop_depth: block.loop_depth,
                loop_header: block.loop_header.map(|b| b.to_string()),
            })
            .collect(),
        edges: cfg
            .edges
            .iter()
            .map(|edge| EdgeSnapshot {
                from: edge.from.to_string(),
                to: edge.to.to_string(),
                kind: edge.kind.as_str().to_string(),
                condition: edge.condition.map(|c| print_expression(state, c)),
            })
            .collect(),
        back_edges: cfg
            .back_edges
            .iter()
            .map(|(u, v)| (u.to_string(), v.to_string()))
            .collect(),
        irreducible: cfg.irreducible,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassRunExport {
    pub name: String,
    pub description: String,
    pub changed: bool,
    pub metrics: PassMetrics,
    pub input: IrSnapshot,
    pub output: IrSnapshot,
    pub code: String,
    pub cfg: Option<CfgSnapshot>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub job_id: String,
    pub source_name: String,
    pub timestamp: DateTime<Utc>,
    pub core_version: String,
    pub input_size: usize,
    pub output_size: usize,
    pub total_passes: usize,
    pub total_time_ms: u64,
    pub success: bool,
    pub warnings: Vec<Warning>,
}

impl ExportMetadata {
    pub fn new(
        source_name: &str,
        input_size: usize,
        elapsed: Duration,
        success: bool,
        warnings: Vec<Warning>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            source_name: source_name.to_string(),
            timestamp: Utc::now(),
            core_version: env!("CARGO_PKG_VERSION").to_string(),
            input_size,
            // Filled by the caller once the final source exists
            output_size: 0,
            total_passes: 0,
            total_time_ms: elapsed.as_millis() as u64,
            success,
            warnings,
        }
    }

    /// Warning counts per code, for driver summaries
    pub fn warnings_by_code(&self) -> AHashMap<&str, usize> {
        let mut counts = AHashMap::new();
        for warning in &self.warnings {
            *counts.entry(warning.code.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisExport {
    pub original_source: String,
    pub final_source: String,
    pub passes: Vec<PassRunExport>,
    pub final_cfg: Option<CfgSnapshot>,
    pub source_map: Option<SourceMap>,
    /// Cross-pass annotations accumulated in the state's metadata map
    pub analysis_metadata: BTreeMap<String, serde_json::Value>,
    pub metadata: ExportMetadata,
}

impl AnalysisExport {
    /// Backfill the derived size/count fields
    pub fn finalize(mut self) -> Self {
        self.metadata.output_size = self.final_source.len();
        self.metadata.total_passes = self.passes.len();
        self
    }

    pub fn to_json(&self) -> Result<String, super::error::PipelineError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| super::error::PipelineError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dominance;
    use crate::features::flow_graph;
    use crate::features::parsing::parse_source;

    #[test]
    fn test_cfg_snapshot_round_trips_through_json() {
        let lowered = parse_source("if (c) { f(); } else { g(); }", "t.js").unwrap();
        let mut state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        flow_graph::rebuild_cfgs(&mut state).unwrap();
        let mut cfg = state.cfgs.get(&state.root).unwrap().clone();
        dominance::compute(&mut cfg);

        let snapshot = snapshot_cfg(&state, &cfg);
        assert_eq!(snapshot.entry, "b0");
        // Conditional edges carry a printed condition
        assert!(snapshot
            .edges
            .iter()
            .any(|e| e.kind == "conditional_true" && e.condition.as_deref() == Some("c")));

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: CfgSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.blocks.len(), snapshot.blocks.len());
    }

    #[test]
    fn test_warnings_aggregate_by_code() {
        let warnings = vec![
            Warning::new("rename.low_confidence", "x"),
            Warning::new("rename.low_confidence", "y"),
            Warning::new("deflatten.aborted", "s"),
        ];
        let metadata =
            ExportMetadata::new("in.js", 10, Duration::from_millis(1), true, warnings);
        let counts = metadata.warnings_by_code();
        assert_eq!(counts.get("rename.low_confidence"), Some(&2));
        assert_eq!(counts.get("deflatten.aborted"), Some(&1));
    }

    #[test]
    fn test_dominator_fields_serialized_sorted() {
        let lowered = parse_source("a(); b(); c();", "t.js").unwrap();
        let mut state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        flow_graph::rebuild_cfgs(&mut state).unwrap();
        let mut cfg = state.cfgs.get(&state.root).unwrap().clone();
        dominance::compute(&mut cfg);
        let snapshot = snapshot_cfg(&state, &cfg);
        for block in &snapshot.blocks {
            let mut sorted = block.dominators.clone();
            sorted.sort();
            assert_eq!(block.dominators, sorted);
        }
    }
}
