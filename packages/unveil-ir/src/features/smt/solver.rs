//! Solver port
//!
//! The abstract interface the pipeline consumes. Sessions are owned by the
//! pass that opens them and must be disposed on pass exit, success or
//! failure.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::expr::SmtExpr;

/// Outcome of a satisfiability check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
    Timeout,
}

impl SatResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            SatResult::Sat => "sat",
            SatResult::Unsat => "unsat",
            SatResult::Unknown => "unknown",
            SatResult::Timeout => "timeout",
        }
    }

    /// Timeouts are treated identically to unknown by every consumer
    pub fn is_decided(&self) -> bool {
        matches!(self, SatResult::Sat | SatResult::Unsat)
    }
}

/// Abstract solver session
pub trait SmtSolver {
    fn initialize(&mut self);

    fn add_constraint(&mut self, expr: SmtExpr);

    fn check_sat(&mut self) -> SatResult;

    /// Satisfying assignment after a `Sat` answer, when available
    fn get_model(&mut self) -> Option<FxHashMap<String, i64>>;

    fn push(&mut self);

    fn pop(&mut self);

    fn reset(&mut self);

    fn set_timeout(&mut self, ms: u64);

    fn dispose(&mut self);
}

/// The absent solver: every query reads unknown, which degrades the
/// opaque-predicate pass to pattern-only elimination
#[derive(Debug, Default)]
pub struct NullSolver;

impl NullSolver {
    pub fn new() -> Self {
        Self
    }
}

impl SmtSolver for NullSolver {
    fn initialize(&mut self) {}

    fn add_constraint(&mut self, _expr: SmtExpr) {}

    fn check_sat(&mut self) -> SatResult {
        SatResult::Unknown
    }

    fn get_model(&mut self) -> Option<FxHashMap<String, i64>> {
        None
    }

    fn push(&mut self) {}

    fn pop(&mut self) {}

    fn reset(&mut self) {}

    fn set_timeout(&mut self, _ms: u64) {}

    fn dispose(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_solver_is_always_unknown() {
        let mut solver = NullSolver::new();
        solver.initialize();
        solver.add_constraint(SmtExpr::BoolConst(true));
        assert_eq!(solver.check_sat(), SatResult::Unknown);
        assert!(solver.get_model().is_none());
        solver.dispose();
    }

    #[test]
    fn test_decidedness() {
        assert!(SatResult::Sat.is_decided());
        assert!(SatResult::Unsat.is_decided());
        assert!(!SatResult::Unknown.is_decided());
        assert!(!SatResult::Timeout.is_decided());
    }
}
