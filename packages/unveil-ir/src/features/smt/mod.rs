//! SMT solving behind a narrow port
//!
//! The pipeline talks to a solver only through the `SmtSolver` trait and a
//! small closed expression tree. Implementations may be in-process
//! libraries, child processes, or network services; the pipeline must
//! function with none available, so queries degrade to `Unknown`.
//!
//! Built-in implementations:
//! - `NullSolver`         - every query is unknown (solver absent)
//! - `BoundedChecker`     - in-process enumeration over small domains;
//!   claims `unsat` only inside its sound bit-local fragment

pub mod bounded_checker;
pub mod expr;
pub mod solver;

pub use bounded_checker::BoundedChecker;
pub use expr::{SmtBinOp, SmtCmpOp, SmtExpr, SmtLogicOp, SmtUnOp};
pub use solver::{NullSolver, SatResult, SmtSolver};
