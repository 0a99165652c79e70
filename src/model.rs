//! Model driver: owns the state, the scheme and the evaluator, and runs the
//! step loop.
//!
//! # Example
//! ```
//! use atmos_ts::model::{Model, SimulationConfig};
//! use atmos_ts::rhs::LinearSplitRhs;
//! use atmos_ts::state::FieldLayout;
//! use atmos_ts::time::SchemeConfig;
//!
//! let scheme = "ars343".parse::<SchemeConfig>().unwrap().build();
//! let mut model = Model::new(FieldLayout::new(1, 0, 4), scheme, LinearSplitRhs::new(-1.0, -2.0)).unwrap();
//! model.state_mut().current_mut().fill(1.0);
//!
//! let stats = model.run(&SimulationConfig::new(0.0, 1.0, 0.05)).unwrap();
//! assert_eq!(stats.n_steps, 20);
//! assert!((model.state().current().components[0] - (-3.0_f64).exp()).abs() < 1e-4);
//! ```

use crate::diagnostics::{CountingRhs, ProgressReporter, RunStatistics};
use crate::error::{Result, TimestepError};
use crate::rhs::RhsEvaluator;
use crate::state::{FieldLayout, StateContainer};
use crate::time::{BoxedScheme, StepInfo};

// =============================================================================
// Simulation Configuration
// =============================================================================

/// Time span and step size of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Start time
    pub t_start: f64,
    /// End time; the last step is shortened to land on it
    pub t_end: f64,
    /// Step size handed to the scheme
    pub dt: f64,
    /// Progress is logged every this many percent (0 = never)
    pub report_interval_pct: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 1.0,
            dt: 0.1,
            report_interval_pct: 10,
        }
    }
}

impl SimulationConfig {
    /// Run from `t_start` to `t_end` with steps of `dt`.
    pub fn new(t_start: f64, t_end: f64, dt: f64) -> Self {
        Self {
            t_start,
            t_end,
            dt,
            ..Self::default()
        }
    }

    /// Set the progress report interval.
    pub fn with_report_interval(mut self, pct: u32) -> Self {
        self.report_interval_pct = pct;
        self
    }

    /// Check the time span and step size.
    pub fn validate(&self) -> Result<()> {
        if !(self.t_start.is_finite() && self.t_end.is_finite()) || self.t_end < self.t_start {
            return Err(TimestepError::configuration(format!(
                "invalid time span [{}, {}]",
                self.t_start, self.t_end
            )));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(TimestepError::configuration(format!(
                "step size must be positive and finite, got {}",
                self.dt
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Model
// =============================================================================

/// The collaborator that drives a [`TimestepScheme`](crate::time::TimestepScheme).
pub struct Model<E: RhsEvaluator> {
    scheme: BoxedScheme,
    evaluator: E,
    state: StateContainer,
}

impl<E: RhsEvaluator> Model<E> {
    /// Allocate the container the scheme asks for and initialize the scheme.
    ///
    /// # Errors
    /// Any configuration error from allocation or `initialize`.
    pub fn new(layout: FieldLayout, mut scheme: BoxedScheme, evaluator: E) -> Result<Self> {
        let state = StateContainer::allocate(
            layout,
            scheme.component_data_instances(),
            scheme.tracer_data_instances(),
        )?;
        scheme.initialize(&state, 0.0)?;
        log::info!(
            "Model ready: {} (order {}, {} stages), {} instances of {}",
            scheme.name(),
            scheme.order(),
            scheme.n_stages(),
            scheme.component_data_instances(),
            layout
        );
        Ok(Self {
            scheme,
            evaluator,
            state,
        })
    }

    /// The state container; instance 0 is the current state.
    pub fn state(&self) -> &StateContainer {
        &self.state
    }

    /// Mutable state, e.g. to set initial conditions.
    pub fn state_mut(&mut self) -> &mut StateContainer {
        &mut self.state
    }

    /// The active scheme.
    pub fn scheme(&self) -> &BoxedScheme {
        &self.scheme
    }

    /// The evaluator.
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Step from `t_start` to `t_end`.
    ///
    /// The first error aborts the run; instance 0 then still holds the state
    /// at the start of the failed step.
    pub fn run(&mut self, config: &SimulationConfig) -> Result<RunStatistics> {
        config.validate()?;
        let mut stats = RunStatistics::new(self.scheme.name(), config.t_start);
        let mut reporter = ProgressReporter::new(config.t_start, config.t_end, config.report_interval_pct);
        let mut rhs = CountingRhs::new(&mut self.evaluator);

        log::info!(
            "Starting run: {} from t = {} to t = {}, dt = {}",
            self.scheme.name(),
            config.t_start,
            config.t_end,
            config.dt
        );

        let mut t = config.t_start;
        while t < config.t_end {
            let remaining = config.t_end - t;
            // Land exactly on t_end instead of leaving a sliver step
            let last = remaining - config.dt <= 1e-10 * config.dt;
            let dt = if last { remaining } else { config.dt };

            let info = StepInfo::new(stats.n_steps == 0, last, t, dt);
            if let Err(err) = self.scheme.step(info, &mut self.state, &mut rhs) {
                log::error!("{} failed at t = {t} (step {}): {err}", self.scheme.name(), stats.n_steps + 1);
                return Err(err);
            }

            t = if last { config.t_end } else { t + dt };
            stats.record_step(t, dt);
            reporter.step();
            reporter.maybe_report(t);
            log::debug!("step {}: t = {t}, dt = {dt:.3e}", stats.n_steps);
        }

        stats.evaluations = rhs.counts();
        stats.wall_time = reporter.elapsed();
        log::info!("Run complete: {}", stats.summary_line());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhs::LinearSplitRhs;
    use crate::time::{Ars343, ForwardEuler, SspRk3};

    fn model(scheme: BoxedScheme) -> Model<LinearSplitRhs> {
        let mut model = Model::new(FieldLayout::new(2, 1, 3), scheme, LinearSplitRhs::new(-1.0, -1.0)).unwrap();
        model.state_mut().current_mut().fill(1.0);
        model
    }

    #[test]
    fn test_run_lands_on_end_time() {
        let mut model = model(Box::new(SspRk3));
        let stats = model.run(&SimulationConfig::new(0.0, 1.0, 0.3)).unwrap();
        assert_eq!(stats.n_steps, 4);
        assert_eq!(stats.final_time, 1.0);
        assert!((stats.dt_min - 0.1).abs() < 1e-12);
        assert_eq!(stats.evaluations.full, 12);
        let exact = (-2.0_f64).exp();
        assert!((model.state().current().tracers[0] - exact).abs() < 1e-2);
    }

    #[test]
    fn test_exact_multiple_has_no_sliver_step() {
        let mut model = model(Box::new(Ars343::new()));
        let stats = model.run(&SimulationConfig::new(0.0, 1.0, 0.1)).unwrap();
        assert_eq!(stats.n_steps, 10);
        assert_eq!(stats.evaluations.solves, 30);
    }

    #[test]
    fn test_empty_span_takes_no_steps() {
        let mut model = model(Box::new(ForwardEuler));
        let stats = model.run(&SimulationConfig::new(2.0, 2.0, 0.1)).unwrap();
        assert_eq!(stats.n_steps, 0);
        assert_eq!(model.state().current().components[0], 1.0);
    }

    #[test]
    fn test_invalid_config() {
        let mut model = model(Box::new(ForwardEuler));
        assert!(model.run(&SimulationConfig::new(1.0, 0.0, 0.1)).unwrap_err().is_configuration());
        assert!(model.run(&SimulationConfig::new(0.0, 1.0, -0.1)).is_err());
    }

    #[test]
    fn test_error_aborts_run() {
        struct Failing;
        impl RhsEvaluator for Failing {
            fn explicit_rhs(&mut self, _: &crate::state::StateBuffer, _: f64, _: &mut crate::state::StateBuffer) -> Result<()> {
                Err(TimestepError::Evaluator("boom".into()))
            }
            fn implicit_rhs(&mut self, _: &crate::state::StateBuffer, _: f64, t: &mut crate::state::StateBuffer) -> Result<()> {
                t.fill(0.0);
                Ok(())
            }
        }

        let mut model = Model::new(FieldLayout::new(1, 0, 1), Box::new(Ars343::new()), Failing).unwrap();
        model.state_mut().current_mut().fill(3.0);
        let err = model.run(&SimulationConfig::default()).unwrap_err();
        assert_eq!(err, TimestepError::Evaluator("boom".into()));
        assert_eq!(model.state().current().components[0], 3.0);
    }
}
