//! Bounded in-process constraint checker
//!
//! Decides small queries by enumeration, without an external prover. The
//! rules keep it honest:
//!
//! - a satisfying witness is always a valid `Sat`
//! - `Unsat` is claimed only after exhausting a domain that is sound for
//!   the query: every operator bit-local, every constant inside the domain
//!   width, at most two variables
//! - everything else is `Unknown`
//!
//! The 8-bit two-variable domain costs at most 65 536 evaluations; the
//! 16-bit single-variable domain the same.

use rustc_hash::FxHashMap;
use std::time::Instant;

use super::expr::{SmtExpr, SmtVal};
use super::solver::{SatResult, SmtSolver};

const SAMPLE_POINTS: [i64; 12] = [
    i32::MIN as i64,
    i32::MAX as i64,
    -65536,
    -256,
    -2,
    -1,
    0,
    1,
    2,
    255,
    256,
    65535,
];

pub struct BoundedChecker {
    frames: Vec<Vec<SmtExpr>>,
    timeout_ms: u64,
    model: Option<FxHashMap<String, i64>>,
}

impl Default for BoundedChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundedChecker {
    pub fn new() -> Self {
        Self {
            frames: vec![Vec::new()],
            timeout_ms: 30_000,
            model: None,
        }
    }

    fn constraints(&self) -> Vec<SmtExpr> {
        self.frames.iter().flatten().cloned().collect()
    }

    /// All constraints hold at the point; `None` when evaluation trapped
    fn holds_at(constraints: &[SmtExpr], env: &FxHashMap<String, i64>) -> Option<bool> {
        for c in constraints {
            match c.eval(env)? {
                SmtVal::Bool(true) => {}
                SmtVal::Bool(false) => return Some(false),
                SmtVal::Int(v) => {
                    if v == 0 {
                        return Some(false);
                    }
                }
            }
        }
        Some(true)
    }

    fn enumerate(
        &mut self,
        constraints: &[SmtExpr],
        vars: &[String],
        domain: std::ops::RangeInclusive<i64>,
        exhaustive: bool,
        started: Instant,
    ) -> SatResult {
        let mut env = FxHashMap::default();
        let mut trapped = false;
        let values: Vec<i64> = domain.collect();
        let mut evals = 0usize;

        let mut run_point = |env: &FxHashMap<String, i64>,
                             trapped: &mut bool,
                             model: &mut Option<FxHashMap<String, i64>>|
         -> Option<SatResult> {
            match Self::holds_at(constraints, env) {
                Some(true) => {
                    *model = Some(env.clone());
                    Some(SatResult::Sat)
                }
                Some(false) => None,
                None => {
                    *trapped = true;
                    None
                }
            }
        };

        match vars.len() {
            0 => {
                return match Self::holds_at(constraints, &env) {
                    Some(true) => {
                        self.model = Some(env);
                        SatResult::Sat
                    }
                    Some(false) => SatResult::Unsat,
                    None => SatResult::Unknown,
                };
            }
            1 => {
                for &v in &values {
                    env.insert(vars[0].clone(), v);
                    if let Some(r) = run_point(&env, &mut trapped, &mut self.model) {
                        return r;
                    }
                    evals += 1;
                    if evals % 4096 == 0
                        && started.elapsed().as_millis() as u64 > self.timeout_ms
                    {
                        return SatResult::Timeout;
                    }
                }
            }
            2 => {
                for &a in &values {
                    for &b in &values {
                        env.insert(vars[0].clone(), a);
                        env.insert(vars[1].clone(), b);
                        if let Some(r) = run_point(&env, &mut trapped, &mut self.model) {
                            return r;
                        }
                        evals += 1;
                        if evals % 4096 == 0
                            && started.elapsed().as_millis() as u64 > self.timeout_ms
                        {
                            return SatResult::Timeout;
                        }
                    }
                }
            }
            _ => return SatResult::Unknown,
        }

        if exhaustive && !trapped {
            SatResult::Unsat
        } else {
            SatResult::Unknown
        }
    }
}

impl SmtSolver for BoundedChecker {
    fn initialize(&mut self) {
        self.reset();
    }

    fn add_constraint(&mut self, expr: SmtExpr) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(expr);
        }
    }

    fn check_sat(&mut self) -> SatResult {
        let started = Instant::now();
        self.model = None;
        let constraints = self.constraints();
        if constraints.is_empty() {
            return SatResult::Sat;
        }

        let mut vars = Vec::new();
        for c in &constraints {
            for v in c.variables() {
                if !vars.contains(&v) {
                    vars.push(v);
                }
            }
        }

        // Exhaustive domains, sound for the bit-local fragment only
        if vars.len() <= 1 && constraints.iter().all(|c| c.is_bit_local(16)) {
            return self.enumerate(
                &constraints,
                &vars,
                -(1 << 15)..=(1 << 15) - 1,
                true,
                started,
            );
        }
        if vars.len() <= 2 && constraints.iter().all(|c| c.is_bit_local(8)) {
            return self.enumerate(&constraints, &vars, -128..=127, true, started);
        }

        // Witness search over sample points; never concludes unsat
        if vars.len() <= 2 {
            let mut env = FxHashMap::default();
            match vars.len() {
                0 => {
                    return match Self::holds_at(&constraints, &env) {
                        Some(true) => {
                            self.model = Some(env);
                            SatResult::Sat
                        }
                        Some(false) => SatResult::Unsat,
                        None => SatResult::Unknown,
                    };
                }
                1 => {
                    for &v in &SAMPLE_POINTS {
                        env.insert(vars[0].clone(), v);
                        if Self::holds_at(&constraints, &env) == Some(true) {
                            self.model = Some(env);
                            return SatResult::Sat;
                        }
                    }
                }
                _ => {
                    for &a in &SAMPLE_POINTS {
                        for &b in &SAMPLE_POINTS {
                            env.insert(vars[0].clone(), a);
                            env.insert(vars[1].clone(), b);
                            if Self::holds_at(&constraints, &env) == Some(true) {
                                self.model = Some(env);
                                return SatResult::Sat;
                            }
                        }
                    }
                }
            }
        }
        SatResult::Unknown
    }

    fn get_model(&mut self) -> Option<FxHashMap<String, i64>> {
        self.model.clone()
    }

    fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    fn reset(&mut self) {
        self.frames = vec![Vec::new()];
        self.model = None;
    }

    fn set_timeout(&mut self, ms: u64) {
        self.timeout_ms = ms;
    }

    fn dispose(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::smt::expr::{SmtBinOp, SmtCmpOp};

    fn xor_self_nonzero() -> SmtExpr {
        // (x ^ x) != 0, the negation of the tautology
        SmtExpr::Compare {
            op: SmtCmpOp::Ne,
            left: Box::new(SmtExpr::Binary {
                op: SmtBinOp::BitXor,
                left: Box::new(SmtExpr::var("x")),
                right: Box::new(SmtExpr::var("x")),
            }),
            right: Box::new(SmtExpr::Const(0)),
        }
    }

    #[test]
    fn test_refutes_xor_self_nonzero() {
        let mut solver = BoundedChecker::new();
        solver.add_constraint(xor_self_nonzero());
        assert_eq!(solver.check_sat(), SatResult::Unsat);
    }

    #[test]
    fn test_satisfies_simple_equality() {
        let mut solver = BoundedChecker::new();
        solver.add_constraint(SmtExpr::Compare {
            op: SmtCmpOp::Eq,
            left: Box::new(SmtExpr::var("x")),
            right: Box::new(SmtExpr::Const(5)),
        });
        // x == 5 is satisfiable, but == with a non-bit-local... Eq is allowed;
        // the constant 5 fits in 8 bits, so the domain is exhaustive
        assert_eq!(solver.check_sat(), SatResult::Sat);
        let model = solver.get_model().unwrap();
        assert_eq!(model.get("x"), Some(&5));
    }

    #[test]
    fn test_arithmetic_stays_unknown_without_witness() {
        // x * x == -1 has no integer solution, but multiplication is not
        // bit-local, so the checker refuses to claim unsat
        let mut solver = BoundedChecker::new();
        solver.add_constraint(SmtExpr::Compare {
            op: SmtCmpOp::Eq,
            left: Box::new(SmtExpr::Binary {
                op: SmtBinOp::Mul,
                left: Box::new(SmtExpr::var("x")),
                right: Box::new(SmtExpr::var("x")),
            }),
            right: Box::new(SmtExpr::Const(-1)),
        });
        assert_eq!(solver.check_sat(), SatResult::Unknown);
    }

    #[test]
    fn test_push_pop_scopes() {
        let mut solver = BoundedChecker::new();
        solver.add_constraint(SmtExpr::Compare {
            op: SmtCmpOp::Eq,
            left: Box::new(SmtExpr::var("x")),
            right: Box::new(SmtExpr::Const(1)),
        });
        solver.push();
        solver.add_constraint(SmtExpr::Compare {
            op: SmtCmpOp::Eq,
            left: Box::new(SmtExpr::var("x")),
            right: Box::new(SmtExpr::Const(2)),
        });
        // x == 1 && x == 2 is unsatisfiable
        assert_eq!(solver.check_sat(), SatResult::Unsat);
        solver.pop();
        assert_eq!(solver.check_sat(), SatResult::Sat);
    }

    #[test]
    fn test_three_variables_unknown() {
        let mut solver = BoundedChecker::new();
        solver.add_constraint(SmtExpr::Logic {
            op: crate::features::smt::expr::SmtLogicOp::And,
            operands: vec![
                SmtExpr::Compare {
                    op: SmtCmpOp::Eq,
                    left: Box::new(SmtExpr::var("a")),
                    right: Box::new(SmtExpr::var("b")),
                },
                SmtExpr::Compare {
                    op: SmtCmpOp::Eq,
                    left: Box::new(SmtExpr::var("b")),
                    right: Box::new(SmtExpr::var("c")),
                },
            ],
        });
        assert_eq!(solver.check_sat(), SatResult::Unknown);
    }
}
