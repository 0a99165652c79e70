//! Stepper configuration.

use std::fmt;

use crate::ark::ArkError;
use crate::ark::butcher::MethodTables;

/// Which parts of the right-hand side the method treats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IntegrationMode {
    /// Explicit table on f, implicit table on g
    #[default]
    Imex,
    /// Explicit table on f + g
    Explicit,
    /// Implicit table on f + g
    Implicit,
}

impl fmt::Display for IntegrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationMode::Imex => write!(f, "IMEX"),
            IntegrationMode::Explicit => write!(f, "explicit"),
            IntegrationMode::Implicit => write!(f, "implicit"),
        }
    }
}

/// Nonlinear solver for the implicit stage equations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NonlinearSolver {
    /// Inexact Newton with matrix-free GMRES
    #[default]
    Newton,
    /// Fixed-point iteration, optionally Anderson-accelerated
    FixedPoint,
}

/// Configuration of an [`ArkStep`](crate::ark::ArkStep) integrator.
#[derive(Clone, Debug, PartialEq)]
pub struct ArkStepConfig {
    /// Integration mode
    pub mode: IntegrationMode,
    /// Method tables
    pub tables: MethodTables,
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
    /// Fixed step size; disables error control when set
    pub fixed_step: Option<f64>,
    /// Nonlinear solver
    pub nonlinear: NonlinearSolver,
    /// Anderson acceleration depth (fixed-point only, 0 disables it)
    pub anderson_depth: usize,
    /// Maximum nonlinear iterations per stage
    pub max_nonlinear_iters: usize,
    /// Maximum Krylov dimension (Newton only)
    pub max_krylov: usize,
    /// Maximum internal steps per `evolve` call
    pub max_steps: usize,
}

impl Default for ArkStepConfig {
    fn default() -> Self {
        Self::new(IntegrationMode::Imex)
    }
}

impl ArkStepConfig {
    /// Defaults for a mode: default tables, rtol 1e-6, atol 1e-10.
    pub fn new(mode: IntegrationMode) -> Self {
        Self {
            mode,
            tables: MethodTables::default_for(mode),
            rtol: 1e-6,
            atol: 1e-10,
            fixed_step: None,
            nonlinear: NonlinearSolver::Newton,
            anderson_depth: 0,
            max_nonlinear_iters: 3,
            max_krylov: 5,
            max_steps: 500,
        }
    }

    /// Set the method tables.
    pub fn with_tables(mut self, tables: MethodTables) -> Self {
        self.tables = tables;
        self
    }

    /// Set relative and absolute tolerances.
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    /// Use a fixed step size.
    pub fn with_fixed_step(mut self, h: f64) -> Self {
        self.fixed_step = Some(h);
        self
    }

    /// Set the nonlinear solver and its iteration limit.
    pub fn with_nonlinear(mut self, solver: NonlinearSolver, max_iters: usize) -> Self {
        self.nonlinear = solver;
        self.max_nonlinear_iters = max_iters;
        self
    }

    /// Set the Anderson acceleration depth.
    pub fn with_anderson(mut self, depth: usize) -> Self {
        self.anderson_depth = depth;
        self
    }

    /// Set the Krylov dimension.
    pub fn with_max_krylov(mut self, maxl: usize) -> Self {
        self.max_krylov = maxl;
        self
    }

    /// Set the step limit per `evolve` call.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Whether the method has an implicit part.
    pub fn is_implicit(&self) -> bool {
        self.tables.implicit.is_some()
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<(), ArkError> {
        self.tables.validate(self.mode)?;
        if !(self.rtol.is_finite() && self.rtol >= 0.0) {
            return Err(ArkError::IllegalInput(format!("rtol = {}", self.rtol)));
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return Err(ArkError::IllegalInput(format!("atol = {}", self.atol)));
        }
        if self.rtol == 0.0 && self.atol == 0.0 {
            return Err(ArkError::IllegalInput("rtol and atol are both zero".into()));
        }
        match self.fixed_step {
            Some(h) if !(h.is_finite() && h > 0.0) => {
                return Err(ArkError::IllegalInput(format!("fixed step {h}")));
            }
            None if !self.tables.has_embedding() => {
                return Err(ArkError::IllegalInput(
                    "adaptive stepping needs embedded weights".into(),
                ));
            }
            _ => {}
        }
        if self.is_implicit() && self.max_nonlinear_iters == 0 {
            return Err(ArkError::IllegalInput("nonlinear iteration limit is zero".into()));
        }
        if self.is_implicit() && self.nonlinear == NonlinearSolver::Newton && self.max_krylov == 0 {
            return Err(ArkError::IllegalInput("Krylov dimension is zero".into()));
        }
        if self.max_steps == 0 {
            return Err(ArkError::IllegalInput("step limit is zero".into()));
        }
        Ok(())
    }

    /// Number of vectors the integrator holds, not counting the solution.
    pub fn required_vectors(&self) -> usize {
        let stages = self.tables.stages();
        // yn, ycur, sdata, ewt, tmp
        let mut n = 5;
        if self.tables.explicit.is_some() {
            n += stages;
        }
        if self.tables.implicit.is_some() {
            n += stages;
            n += match self.nonlinear {
                // residual, delta, gz, ztmp, gtmp + Krylov basis
                NonlinearSolver::Newton => 5 + self.max_krylov + 1,
                // gval, fcur, gz, delta + Anderson history
                NonlinearSolver::FixedPoint => {
                    4 + if self.anderson_depth > 0 {
                        2 + 2 * self.anderson_depth
                    } else {
                        0
                    }
                }
            };
        }
        n
    }
}
