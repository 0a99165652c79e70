//! Settings of the adaptive adapter.

use crate::ark::{ArkStepConfig, IntegrationMode, MethodTables, NonlinearSolver};
use crate::error::{Result, TimestepError};

/// Configuration of [`ArkodeAdapter`](super::ArkodeAdapter).
///
/// `table_id` and `custom_table` are mutually exclusive; leaving both unset
/// selects the default method for `mode`.
#[derive(Clone, Debug, PartialEq)]
pub struct ArkodeConfig {
    /// Component and tracer instances requested from the driver
    pub nvectors: usize,
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
    /// Explicit, implicit or IMEX integration
    pub mode: IntegrationMode,
    /// Take exactly one step of size dt per call, without error control
    pub fixed_step: bool,
    /// Newton-Krylov or fixed-point stage solver
    pub nonlinear: NonlinearSolver,
    /// Anderson acceleration vectors (fixed point only)
    pub anderson_vectors: usize,
    /// Maximum nonlinear iterations per stage
    pub nonlinear_iters: usize,
    /// Maximum Krylov iterations per Newton iteration
    pub linear_iters: usize,
    /// Built-in Butcher table number
    pub table_id: Option<i32>,
    /// User-supplied Butcher tables
    pub custom_table: Option<MethodTables>,
    /// Maximum internal steps per call
    pub max_steps: usize,
}

impl Default for ArkodeConfig {
    fn default() -> Self {
        Self {
            nvectors: 50,
            rtol: 1e-6,
            atol: 1e-10,
            mode: IntegrationMode::Imex,
            fixed_step: false,
            nonlinear: NonlinearSolver::Newton,
            anderson_vectors: 0,
            nonlinear_iters: 3,
            linear_iters: 5,
            table_id: None,
            custom_table: None,
            max_steps: 500,
        }
    }
}

impl ArkodeConfig {
    /// Number of instances to request.
    pub fn with_nvectors(mut self, nvectors: usize) -> Self {
        self.nvectors = nvectors;
        self
    }

    /// Set relative and absolute tolerances.
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    /// Set the integration mode.
    pub fn with_mode(mut self, mode: IntegrationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use fixed steps of the driver's dt.
    pub fn with_fixed_step(mut self, fixed: bool) -> Self {
        self.fixed_step = fixed;
        self
    }

    /// Use the fixed-point solver with `anderson_vectors` acceleration vectors.
    pub fn with_fixed_point(mut self, anderson_vectors: usize) -> Self {
        self.nonlinear = NonlinearSolver::FixedPoint;
        self.anderson_vectors = anderson_vectors;
        self
    }

    /// Set the nonlinear and linear iteration caps.
    pub fn with_iterations(mut self, nonlinear_iters: usize, linear_iters: usize) -> Self {
        self.nonlinear_iters = nonlinear_iters;
        self.linear_iters = linear_iters;
        self
    }

    /// Select a built-in table by number.
    pub fn with_table_id(mut self, id: i32) -> Self {
        self.table_id = Some(id);
        self
    }

    /// Supply custom tables.
    pub fn with_custom_table(mut self, tables: MethodTables) -> Self {
        self.custom_table = Some(tables);
        self
    }

    /// Set the internal step limit per call.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Resolve the table selection and build the stepper configuration.
    ///
    /// `dt` is the initial fixed step; it is replaced on every call in
    /// fixed-step mode.
    ///
    /// # Errors
    /// Configuration errors for conflicting or unknown tables and for any
    /// setting the stepper rejects.
    pub fn step_config(&self, dt: f64) -> Result<ArkStepConfig> {
        let tables = match (self.table_id, &self.custom_table) {
            (Some(id), Some(_)) => {
                return Err(TimestepError::configuration(format!(
                    "Butcher table {id} and a custom table were both given"
                )));
            }
            (Some(id), None) => MethodTables::from_id(id, self.mode)?,
            (None, Some(custom)) => custom.clone(),
            (None, None) => MethodTables::default_for(self.mode),
        };

        let mut config = ArkStepConfig::new(self.mode)
            .with_tables(tables)
            .with_tolerances(self.rtol, self.atol)
            .with_nonlinear(self.nonlinear, self.nonlinear_iters)
            .with_anderson(self.anderson_vectors)
            .with_max_krylov(self.linear_iters)
            .with_max_steps(self.max_steps);
        if self.fixed_step {
            config = config.with_fixed_step(dt);
        }
        config.validate()?;
        Ok(config)
    }
}
