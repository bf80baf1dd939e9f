//! Typed pipeline errors
//!
//! Errors are values carried through pass results; the orchestrator never
//! unwinds across a pass boundary. Fatal kinds abort the job, pass-local
//! kinds roll the pass back and continue on the pre-pass snapshot.

use thiserror::Error;

use crate::shared::models::NodeId;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Source could not be parsed before any IR was produced
    #[error("failed to parse {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    /// IR lowering failed on a construct the adapter cannot express
    #[error("lowering failed at {location}: {reason}")]
    Lowering { location: String, reason: String },

    /// An internal invariant was violated (a bug, not an input problem)
    #[error("invariant violation in {context}: {reason}")]
    Invariant { context: String, reason: String },

    /// A single pass could not complete
    #[error("pass {pass} failed: {reason}")]
    PassFailed { pass: String, reason: String },

    /// CFG construction failed for a code body
    #[error("control-flow graph construction failed for {owner}: {reason}")]
    FlowGraph { owner: NodeId, reason: String },

    /// SSA construction or destruction failed
    #[error("ssa transformation failed for {owner}: {reason}")]
    Ssa { owner: NodeId, reason: String },

    /// An external collaborator (solver, naming helper, sandbox) failed
    #[error("collaborator {collaborator} failed: {reason}")]
    Collaborator { collaborator: String, reason: String },

    /// A configured budget was exceeded
    #[error("budget exceeded in {stage}: {limit}")]
    BudgetExceeded { stage: String, limit: String },

    /// The job was cancelled cooperatively
    #[error("analysis cancelled during {stage}")]
    Cancelled { stage: String },

    /// I/O failure (CLI surface)
    #[error("io error for {path}: {reason}")]
    Io { path: String, reason: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization failure (export, trace files)
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn parse(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn lowering(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lowering {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn invariant(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invariant {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn pass_failed(pass: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PassFailed {
            pass: pass.into(),
            reason: reason.into(),
        }
    }

    pub fn flow_graph(owner: NodeId, reason: impl Into<String>) -> Self {
        Self::FlowGraph {
            owner,
            reason: reason.into(),
        }
    }

    pub fn ssa(owner: NodeId, reason: impl Into<String>) -> Self {
        Self::Ssa {
            owner,
            reason: reason.into(),
        }
    }

    pub fn collaborator(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }

    pub fn budget(stage: impl Into<String>, limit: impl Into<String>) -> Self {
        Self::BudgetExceeded {
            stage: stage.into(),
            limit: limit.into(),
        }
    }

    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    pub fn io(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Io {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    /// Fatal errors abort the whole job; everything else is pass-local
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::Invariant { .. }
                | Self::Cancelled { .. }
                | Self::Io { .. }
                | Self::Config(_)
        )
    }

    /// Category tag used in warnings and the analysis export
    pub fn category(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Lowering { .. } => "lowering",
            Self::Invariant { .. } => "invariant",
            Self::PassFailed { .. } => "pass",
            Self::FlowGraph { .. } => "flow_graph",
            Self::Ssa { .. } => "ssa",
            Self::Collaborator { .. } => "collaborator",
            Self::BudgetExceeded { .. } => "budget",
            Self::Cancelled { .. } => "cancelled",
            Self::Io { .. } => "io",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::parse("input.js", "unexpected token");
        assert_eq!(err.to_string(), "failed to parse input.js: unexpected token");
    }

    #[test]
    fn test_fatality_split() {
        assert!(PipelineError::parse("a.js", "bad").is_fatal());
        assert!(PipelineError::invariant("ssa-destruct", "phi arity").is_fatal());
        assert!(!PipelineError::pass_failed("deflatten", "too complex").is_fatal());
        assert!(!PipelineError::collaborator("smt", "gone").is_fatal());
    }

    #[test]
    fn test_category() {
        assert_eq!(PipelineError::budget("smt", "30s").category(), "budget");
    }
}
