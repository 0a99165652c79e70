//! The RHS evaluator contract consumed by time-stepping schemes.
//!
//! The spatial discretization owns the tendencies. Schemes only see three
//! entry points: the explicit tendency, the implicit tendency, and an
//! implicit solve
//!
//! ```text
//! find y such that  y = p + sub_dt * g(y, t)
//! ```
//!
//! where `g` is the implicit tendency and `p` the perturbation built by the
//! scheme.

use crate::error::{Result, TimestepError};
use crate::state::{Integrable, StateBuffer};

/// Iteration contract for the default implicit solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImplicitSolveConfig {
    /// Relative tolerance on the max-norm of successive iterates
    pub tolerance: f64,
    /// Iteration budget before the solve is declared failed
    pub max_iterations: usize,
}

impl Default for ImplicitSolveConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 100,
        }
    }
}

impl ImplicitSolveConfig {
    /// Set the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Tendency provider for split explicit/implicit integration.
///
/// Every call is synchronous: it returns only once `tendency` (or `result`)
/// is fully written. Buffers passed in are borrowed for the duration of the
/// call only.
pub trait RhsEvaluator {
    /// Explicit (non-stiff) tendency f(state, time).
    fn explicit_rhs(&mut self, state: &StateBuffer, time: f64, tendency: &mut StateBuffer) -> Result<()>;

    /// Implicit (stiff) tendency g(state, time).
    fn implicit_rhs(&mut self, state: &StateBuffer, time: f64, tendency: &mut StateBuffer) -> Result<()>;

    /// Combined tendency f + g.
    ///
    /// `scratch` is caller-owned work space shaped like `state`; its contents
    /// on return are unspecified. The default evaluates the implicit half into
    /// it; evaluators that can fuse the halves should override this.
    fn full_rhs(
        &mut self,
        state: &StateBuffer,
        time: f64,
        tendency: &mut StateBuffer,
        scratch: &mut StateBuffer,
    ) -> Result<()> {
        self.explicit_rhs(state, time, tendency)?;
        self.implicit_rhs(state, time, scratch)?;
        tendency.axpy(1.0, scratch);
        Ok(())
    }

    /// Solve `result = perturbation + sub_dt * g(result, time)`.
    ///
    /// The default is a fixed-point iteration under
    /// [`implicit_solve_config`](Self::implicit_solve_config), which converges
    /// only while `sub_dt` times the Lipschitz constant of `g` stays below one.
    /// Evaluators with stiff implicit parts override this with their own
    /// solver.
    fn solve_implicit(
        &mut self,
        perturbation: &StateBuffer,
        sub_dt: f64,
        time: f64,
        result: &mut StateBuffer,
    ) -> Result<()> {
        let config = self.implicit_solve_config();
        fixed_point_solve(self, perturbation, sub_dt, time, result, &config)
    }

    /// Iteration contract used by the default [`solve_implicit`](Self::solve_implicit).
    fn implicit_solve_config(&self) -> ImplicitSolveConfig {
        ImplicitSolveConfig::default()
    }
}

/// Fixed-point iteration `y <- p + sub_dt * g(y)` starting from `y = p`.
///
/// # Errors
/// Returns [`TimestepError::Convergence`] when the budget is exhausted, and
/// [`TimestepError::NumericalDomain`] if an iterate turns non-finite.
pub fn fixed_point_solve<E: RhsEvaluator + ?Sized>(
    evaluator: &mut E,
    perturbation: &StateBuffer,
    sub_dt: f64,
    time: f64,
    result: &mut StateBuffer,
    config: &ImplicitSolveConfig,
) -> Result<()> {
    result.copy_from(perturbation);
    if sub_dt == 0.0 {
        return Ok(());
    }

    let mut g = perturbation.zeros_like();
    let mut change = f64::INFINITY;
    for iteration in 1..=config.max_iterations {
        evaluator.implicit_rhs(result, time, &mut g)?;

        // result <- p + sub_dt * g, tracking the update size
        change = 0.0;
        let mut scale = 0.0_f64;
        for ((y, &p), &gi) in result.values_mut().zip(perturbation.values()).zip(g.values()) {
            let next = p + sub_dt * gi;
            change = f64::max(change, (next - *y).abs());
            scale = scale.max(next.abs());
            *y = next;
        }

        if !change.is_finite() {
            return Err(TimestepError::numerical_domain(
                "implicit solve update",
                change,
            ));
        }
        if change <= config.tolerance * (1.0 + scale) {
            log::trace!("fixed-point implicit solve converged in {iteration} iterations");
            return Ok(());
        }
    }

    Err(TimestepError::Convergence {
        solver: "fixed-point implicit solve",
        iterations: config.max_iterations,
        residual: change,
    })
}
