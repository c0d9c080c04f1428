//! The symbolic engine adapter (C2, `spec.md` §4.2).
//!
//! This is the only module that references `z3` types; every other
//! component goes through [`Solver`] (`SPEC_FULL.md` §4.2a).

use std::time::Duration;

use z3::ast::{Ast, Bool, Int};
use z3::{Config as Z3Config, Context, SatResult};

/// The outcome of a satisfiability check. `Unknown` must never be treated
/// as `Sat` (`spec.md` §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    /// The formula is satisfiable.
    Sat,
    /// The formula is unsatisfiable.
    Unsat,
    /// The solver could not decide within its timeout.
    Unknown,
}

/// A per-generator (or per-synthesis-run) SMT context, thread-local per
/// `spec.md` §5.
pub struct Solver {
    context: Context,
    timeout: Duration,
}

impl Solver {
    /// Construct a solver whose every `check_sat` call is bounded by
    /// `timeout` (`spec.md` §4.2: "Every check is run under a wall-clock
    /// timeout").
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let mut cfg = Z3Config::new();
        cfg.set_timeout_msec(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        Solver {
            context: Context::new(&cfg),
            timeout,
        }
    }

    /// The context's configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The underlying `z3::Context`, for building formulas via
    /// [`Solver::int_const`] / [`z3::ast`] constructors.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// An integer-sorted constant named `name` in this solver's context.
    #[must_use]
    pub fn int_const(&self, name: &str) -> Int<'_> {
        Int::new_const(&self.context, name)
    }

    /// An integer literal in this solver's context.
    #[must_use]
    pub fn int_val(&self, value: i64) -> Int<'_> {
        Int::from_i64(&self.context, value)
    }

    /// `check_sat(assumptions...)` (`spec.md` §4.2).
    #[must_use]
    pub fn check_sat(&self, assumptions: &[Bool<'_>]) -> CheckResult {
        let solver = z3::Solver::new(&self.context);
        for a in assumptions {
            solver.assert(a);
        }
        match solver.check() {
            SatResult::Sat => CheckResult::Sat,
            SatResult::Unsat => CheckResult::Unsat,
            SatResult::Unknown => CheckResult::Unknown,
        }
    }

    /// `equivalent(f, g)`: true iff `f <-> g` is a tautology, implemented
    /// as `check_sat(not(f <-> g)) == unsat` (`spec.md` §4.2).
    #[must_use]
    pub fn equivalent(&self, f: &Bool<'_>, g: &Bool<'_>) -> bool {
        let xor = f.xor(g);
        matches!(self.check_sat(&[xor]), CheckResult::Unsat)
    }

    /// `model_value(expr)` on a prior `Sat` result: re-runs the check with
    /// `assumptions` and, if sat, returns the model's integer value for
    /// `expr`.
    #[must_use]
    pub fn model_value(&self, assumptions: &[Bool<'_>], expr: &Int<'_>) -> Option<i64> {
        let solver = z3::Solver::new(&self.context);
        for a in assumptions {
            solver.assert(a);
        }
        if solver.check() != SatResult::Sat {
            return None;
        }
        let model = solver.get_model()?;
        model.eval(expr, true)?.as_i64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsat_is_never_reported_as_sat() {
        let solver = Solver::new(Duration::from_secs(1));
        let x = solver.int_const("x");
        let a = x._eq(&solver.int_val(1));
        let b = x._eq(&solver.int_val(2));
        let contradiction = Bool::and(&solver.context, &[&a, &b]);
        assert_eq!(solver.check_sat(&[contradiction]), CheckResult::Unsat);
    }

    #[test]
    fn satisfiable_formula_is_sat() {
        let solver = Solver::new(Duration::from_secs(1));
        let x = solver.int_const("x");
        let formula = x._eq(&solver.int_val(5));
        assert_eq!(solver.check_sat(&[formula]), CheckResult::Sat);
    }

    #[test]
    fn equivalent_formulas_are_recognised() {
        let solver = Solver::new(Duration::from_secs(1));
        let x = solver.int_const("x");
        let f = x.gt(&solver.int_val(0));
        let g = x.gt(&solver.int_val(0));
        assert!(solver.equivalent(&f, &g));
    }

    #[test]
    fn model_value_recovers_a_satisfying_assignment() {
        let solver = Solver::new(Duration::from_secs(1));
        let x = solver.int_const("x");
        let formula = x._eq(&solver.int_val(7));
        assert_eq!(solver.model_value(&[formula], &x), Some(7));
    }
}
