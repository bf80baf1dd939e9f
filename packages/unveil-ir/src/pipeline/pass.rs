//! Pass framework
//!
//! A pass is a name, a description, a requirement declaration, and one
//! entry operation consuming an `IrState` and producing a new state plus a
//! changed flag, metrics, and warnings. Errors are returned as values;
//! nothing unwinds across the pass boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::features::renaming::ports::NamingHelper;
use crate::features::smt::solver::SmtSolver;
use crate::shared::models::{ExecutionTrace, IrState, NodeId};

use super::config::PipelineConfig;
use super::error::{PipelineError, PipelineResult};

/// Cooperative cancellation signal, checked at block boundaries and at
/// every external-collaborator call
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self, stage: &str) -> PipelineResult<()> {
        if self.is_cancelled() {
            Err(PipelineError::cancelled(stage))
        } else {
            Ok(())
        }
    }
}

/// Opens solver sessions for the passes that need one; a session is owned
/// by the pass and disposed before the pass returns
pub trait SolverFactory: Send + Sync {
    fn open(&self) -> Box<dyn SmtSolver>;
}

impl<F> SolverFactory for F
where
    F: Fn() -> Box<dyn SmtSolver> + Send + Sync,
{
    fn open(&self) -> Box<dyn SmtSolver> {
        self()
    }
}

/// Everything a pass may consult besides the state it owns
pub struct PassContext<'a> {
    pub config: &'a PipelineConfig,
    pub cancel: &'a CancelToken,
    /// Execution trace, when the sandbox supplied one
    pub trace: Option<&'a ExecutionTrace>,
    /// SMT solver factory; absence means every query reads unknown
    pub solver: Option<&'a dyn SolverFactory>,
    /// Naming helper; absence falls back to the heuristic transparently
    pub naming: Option<&'a dyn NamingHelper>,
}

impl<'a> PassContext<'a> {
    pub fn bare(config: &'a PipelineConfig, cancel: &'a CancelToken) -> Self {
        Self {
            config,
            cancel,
            trace: None,
            solver: None,
            naming: None,
        }
    }
}

/// Per-pass execution metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassMetrics {
    pub duration: Duration,
    pub nodes_visited: usize,
    pub nodes_changed: usize,
    pub nodes_inserted: usize,
    pub nodes_removed: usize,
}

/// Running recorder; `finish` stamps the wall-clock duration
#[derive(Debug)]
pub struct MetricsRecorder {
    started: Instant,
    pub metrics: PassMetrics,
}

impl MetricsRecorder {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            metrics: PassMetrics::default(),
        }
    }

    pub fn visit(&mut self, n: usize) {
        self.metrics.nodes_visited += n;
    }

    pub fn changed(&mut self, n: usize) {
        self.metrics.nodes_changed += n;
    }

    pub fn inserted(&mut self, n: usize) {
        self.metrics.nodes_inserted += n;
    }

    pub fn removed(&mut self, n: usize) {
        self.metrics.nodes_removed += n;
    }

    pub fn finish(mut self) -> PassMetrics {
        self.metrics.duration = self.started.elapsed();
        self.metrics
    }
}

/// Warning severity: plain warnings report conditions, suggestions carry a
/// confidence-gated transformation the core chose not to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    Warning,
    Suggestion,
}

/// Structured, non-fatal diagnostic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub code: String,
    pub message: String,
    pub node: Option<NodeId>,
    /// Proposed change, printed, for suggestions
    pub proposed: Option<String>,
}

impl Warning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Warning,
            code: code.into(),
            message: message.into(),
            node: None,
            proposed: None,
        }
    }

    pub fn suggestion(
        code: impl Into<String>,
        message: impl Into<String>,
        proposed: impl Into<String>,
    ) -> Self {
        Self {
            kind: WarningKind::Suggestion,
            code: code.into(),
            message: message.into(),
            node: None,
            proposed: Some(proposed.into()),
        }
    }

    pub fn at(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }
}

/// What a pass hands back to the framework
pub struct PassOutcome {
    pub state: IrState,
    pub changed: bool,
    pub metrics: PassMetrics,
    pub warnings: Vec<Warning>,
    /// Set when the changes could unlock further work in earlier passes;
    /// the framework may re-run the prefix once, bounded by configuration
    pub rerun_prefix: bool,
}

impl PassOutcome {
    pub fn unchanged(state: IrState, metrics: PassMetrics) -> Self {
        Self {
            state,
            changed: false,
            metrics,
            warnings: Vec::new(),
            rerun_prefix: false,
        }
    }

    pub fn changed(state: IrState, metrics: PassMetrics) -> Self {
        Self {
            state,
            changed: true,
            metrics,
            warnings: Vec::new(),
            rerun_prefix: false,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<Warning>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// A single transformation or analysis step
pub trait Pass {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Declared prerequisite: the framework inserts SSA construction
    /// before the first pass requiring it and destruction after the last
    fn requires_ssa(&self) -> bool {
        false
    }

    /// Declared effect: the framework rebuilds CFG and dominance afterward.
    /// A pass returning false here must not have re-linked any edges.
    fn mutates_control_flow(&self) -> bool {
        false
    }

    fn run(&self, state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(token.check("anywhere").is_ok());
        token.cancel();
        assert!(matches!(
            token.check("block-boundary"),
            Err(PipelineError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_metrics_recorder_counts() {
        let mut rec = MetricsRecorder::start();
        rec.visit(10);
        rec.changed(2);
        rec.inserted(1);
        rec.removed(3);
        let metrics = rec.finish();
        assert_eq!(metrics.nodes_visited, 10);
        assert_eq!(metrics.nodes_changed, 2);
        assert_eq!(metrics.nodes_inserted, 1);
        assert_eq!(metrics.nodes_removed, 3);
    }

    #[test]
    fn test_suggestion_carries_proposal() {
        let w = Warning::suggestion("rename.low_confidence", "rename x", "numValue");
        assert_eq!(w.kind, WarningKind::Suggestion);
        assert_eq!(w.proposed.as_deref(), Some("numValue"));
    }
}
