/*
 * Unveil IR - JavaScript deobfuscation core
 *
 * Feature-first architecture:
 * - shared/      : Common models (nodes, CFG, spans, traces, state)
 * - features/    : Vertical slices (parsing → flow → dominance → ssa →
 *                  dataflow/control-flow/semantic passes → printing)
 * - pipeline/    : Pass framework and orchestration
 *
 * Obfuscated source is parsed into a typed IR, converted to CFG and SSA
 * form, rewritten by an ordered pass pipeline, and printed back to
 * readable source.
 */

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::new_without_default)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]

pub mod features;
pub mod pipeline;
pub mod shared;

pub use pipeline::config::PipelineConfig;
pub use pipeline::error::PipelineError;
pub use pipeline::export::AnalysisExport;
pub use pipeline::job::{run_job, run_jobs, JobInput, JobResult};
pub use pipeline::orchestrator::Pipeline;
pub use pipeline::pass::{CancelToken, Pass, PassContext, PassMetrics, PassOutcome, Warning};
pub use shared::models::{IrNode, IrState, NodeFactory, NodeId, NodeKind};
