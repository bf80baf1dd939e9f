//! Job-level execution
//!
//! The core pipeline is single-threaded per analysis job; parallelism is
//! coarse-grained across independent source files, each job owning its
//! own state and cancellation token. The default solver is the bundled
//! bounded checker; callers can swap in their own factory or none.

use rayon::prelude::*;

use crate::features::smt::{BoundedChecker, SmtSolver};
use crate::shared::models::ExecutionTrace;

use super::config::PipelineConfig;
use super::error::PipelineResult;
use super::export::AnalysisExport;
use super::orchestrator::{Collaborators, Pipeline};
use super::pass::CancelToken;

/// One analysis job
#[derive(Debug, Clone)]
pub struct JobInput {
    pub name: String,
    pub source: String,
    pub trace: Option<ExecutionTrace>,
    pub config: PipelineConfig,
}

impl JobInput {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            trace: None,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_trace(mut self, trace: ExecutionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }
}

pub struct JobResult {
    pub name: String,
    pub outcome: PipelineResult<AnalysisExport>,
}

fn open_bounded_checker() -> Box<dyn SmtSolver> {
    Box::new(BoundedChecker::new())
}

/// Run a single job with the bundled solver
pub fn run_job(input: &JobInput, cancel: &CancelToken) -> PipelineResult<AnalysisExport> {
    let pipeline = Pipeline::new(input.config.clone());
    let factory: fn() -> Box<dyn SmtSolver> = open_bounded_checker;
    let collaborators = Collaborators {
        trace: input.trace.as_ref(),
        solver: Some(&factory),
        naming: None,
    };
    pipeline.run(&input.source, &input.name, collaborators, cancel)
}

/// Run independent jobs in parallel; each owns its state and its own
/// cancellation token derived from the shared one
pub fn run_jobs(inputs: Vec<JobInput>, cancel: &CancelToken) -> Vec<JobResult> {
    inputs
        .par_iter()
        .map(|input| JobResult {
            name: input.name.clone(),
            outcome: run_job(input, cancel),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_job() {
        let input = JobInput::new("a.js", "var a = 1; var b = a; console.log(b + 2);");
        let cancel = CancelToken::new();
        let export = run_job(&input, &cancel).unwrap();
        assert!(export.final_source.contains("console.log(3);"));
        assert!(export.metadata.success);
    }

    #[test]
    fn test_parallel_jobs_are_independent() {
        let inputs = vec![
            JobInput::new("a.js", "var a = 1; console.log(a);"),
            JobInput::new("b.js", "var _0xb = 'x'; use(_0xb);"),
            JobInput::new("broken.js", "var = = ;"),
        ];
        let cancel = CancelToken::new();
        let results = run_jobs(inputs, &cancel);
        assert_eq!(results.len(), 3);
        assert!(results[0].outcome.is_ok());
        assert!(results[1].outcome.is_ok());
        // One broken input must not poison its siblings
        assert!(results[2].outcome.is_err());
    }
}
