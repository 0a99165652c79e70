//! Manufactured linear split problem.
//!
//! ```text
//! dy/dt = lambda_e * y + lambda_i * y
//! ```
//!
//! applied independently to every value of the state. The explicit part is
//! `lambda_e * y`, the implicit part `lambda_i * y`, and the exact solution is
//! `y(t) = y(0) * exp((lambda_e + lambda_i) t)`. The implicit solve is exact.
//! Used for convergence studies and as a stand-in for a dynamical core.

use crate::error::Result;
use crate::rhs::RhsEvaluator;
use crate::state::StateBuffer;

/// Counters for evaluator calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RhsCounts {
    /// Explicit tendency evaluations
    pub explicit: usize,
    /// Implicit tendency evaluations
    pub implicit: usize,
    /// Implicit solves
    pub solves: usize,
}

/// Linear test problem with separate explicit and implicit rates.
#[derive(Clone, Debug)]
pub struct LinearSplitRhs {
    /// Rate of the explicit part
    pub explicit_rate: f64,
    /// Rate of the implicit part
    pub implicit_rate: f64,
    counts: RhsCounts,
}

impl LinearSplitRhs {
    /// Create a new linear split problem.
    pub fn new(explicit_rate: f64, implicit_rate: f64) -> Self {
        Self {
            explicit_rate,
            implicit_rate,
            counts: RhsCounts::default(),
        }
    }

    /// Exact solution at time `t` starting from `y0` at time zero.
    pub fn exact(&self, y0: f64, t: f64) -> f64 {
        y0 * ((self.explicit_rate + self.implicit_rate) * t).exp()
    }

    /// Evaluation counters since construction.
    pub fn counts(&self) -> RhsCounts {
        self.counts
    }
}

fn scaled_copy(state: &StateBuffer, rate: f64, tendency: &mut StateBuffer) {
    for (out, &y) in tendency.values_mut().zip(state.values()) {
        *out = rate * y;
    }
}

impl RhsEvaluator for LinearSplitRhs {
    fn explicit_rhs(&mut self, state: &StateBuffer, _time: f64, tendency: &mut StateBuffer) -> Result<()> {
        self.counts.explicit += 1;
        scaled_copy(state, self.explicit_rate, tendency);
        Ok(())
    }

    fn implicit_rhs(&mut self, state: &StateBuffer, _time: f64, tendency: &mut StateBuffer) -> Result<()> {
        self.counts.implicit += 1;
        scaled_copy(state, self.implicit_rate, tendency);
        Ok(())
    }

    fn full_rhs(
        &mut self,
        state: &StateBuffer,
        _time: f64,
        tendency: &mut StateBuffer,
        _scratch: &mut StateBuffer,
    ) -> Result<()> {
        self.counts.explicit += 1;
        self.counts.implicit += 1;
        scaled_copy(state, self.explicit_rate + self.implicit_rate, tendency);
        Ok(())
    }

    fn solve_implicit(
        &mut self,
        perturbation: &StateBuffer,
        sub_dt: f64,
        _time: f64,
        result: &mut StateBuffer,
    ) -> Result<()> {
        self.counts.solves += 1;
        let factor = 1.0 / (1.0 - sub_dt * self.implicit_rate);
        scaled_copy(perturbation, factor, result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FieldLayout;

    #[test]
    fn test_exact_solve_satisfies_fixed_point_relation() {
        let layout = FieldLayout::new(2, 1, 3);
        let p = StateBuffer::uniform(layout, 0.7);
        let mut y = StateBuffer::new(layout);
        let mut rhs = LinearSplitRhs::new(-1.0, -50.0);
        rhs.solve_implicit(&p, 0.2, 0.0, &mut y).unwrap();

        let mut g = StateBuffer::new(layout);
        rhs.implicit_rhs(&y, 0.0, &mut g).unwrap();
        for ((&yi, &pi), &gi) in y.values().zip(p.values()).zip(g.values()) {
            assert!((yi - (pi + 0.2 * gi)).abs() < 1e-14);
        }
        assert_eq!(rhs.counts().solves, 1);
        assert_eq!(rhs.counts().implicit, 1);
    }

    #[test]
    fn test_exact_solution() {
        let rhs = LinearSplitRhs::new(-1.0, 0.0);
        assert!((rhs.exact(1.0, 0.1) - 0.904_837_418_035_959_6).abs() < 1e-15);
    }
}
