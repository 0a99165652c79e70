//! Trait-based time-stepping scheme abstraction.
//!
//! A scheme separates "how the state is advanced in time" from "how the
//! tendencies are computed". It advances instance 0 of a
//! [`StateContainer`] by one step, using as many extra instances as it
//! declared up front, and pulls tendencies from an [`RhsEvaluator`].
//!
//! # Example
//! ```
//! use atmos_ts::rhs::LinearSplitRhs;
//! use atmos_ts::state::{FieldLayout, StateContainer};
//! use atmos_ts::time::{Ars343, StepInfo, TimestepScheme};
//!
//! let mut scheme = Ars343::new();
//! let layout = FieldLayout::new(1, 0, 1);
//! let mut state = StateContainer::allocate(
//!     layout,
//!     scheme.component_data_instances(),
//!     scheme.tracer_data_instances(),
//! )
//! .unwrap();
//! state.current_mut().fill(1.0);
//!
//! let mut rhs = LinearSplitRhs::new(-1.0, 0.0);
//! scheme.initialize(&state, 0.0).unwrap();
//! scheme
//!     .step(StepInfo::new(true, true, 0.0, 0.1), &mut state, &mut rhs)
//!     .unwrap();
//! assert!((state.current().components[0] - (-0.1_f64).exp()).abs() < 1e-6);
//! ```

use crate::error::{Result, TimestepError};
use crate::rhs::RhsEvaluator;
use crate::state::StateContainer;
use crate::types::InstanceIndex;

// =============================================================================
// StepInfo
// =============================================================================

/// Arguments of one call to [`TimestepScheme::step`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepInfo {
    /// First step of the run
    pub first_step: bool,
    /// Last step of the run
    pub last_step: bool,
    /// Simulation time at the start of the step
    pub time: f64,
    /// Step size
    pub dt: f64,
}

impl StepInfo {
    /// Create a new step description.
    pub fn new(first_step: bool, last_step: bool, time: f64, dt: f64) -> Self {
        Self {
            first_step,
            last_step,
            time,
            dt,
        }
    }

    /// Simulation time at the end of the step.
    pub fn end_time(&self) -> f64 {
        self.time + self.dt
    }

    /// Check that the step size is positive and finite.
    pub fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(TimestepError::configuration(format!(
                "step size must be positive and finite, got {}",
                self.dt
            )));
        }
        if !self.time.is_finite() {
            return Err(TimestepError::numerical_domain("time", self.time));
        }
        Ok(())
    }
}

// =============================================================================
// SchemeInfo Trait (dyn-compatible metadata)
// =============================================================================

/// Non-generic information about a time-stepping scheme.
pub trait SchemeInfo {
    /// Human-readable name for debugging and logging.
    fn name(&self) -> &'static str;

    /// Order of accuracy of the scheme.
    ///
    /// Adaptive schemes report the order of the method in use.
    fn order(&self) -> usize;

    /// Number of stages per step.
    fn n_stages(&self) -> usize;
}

// =============================================================================
// TimestepScheme Trait
// =============================================================================

/// A time-stepping scheme driven by the model's step loop.
///
/// # Contract
///
/// - The instance counts are stable for the lifetime of the scheme; the
///   driver allocates that many slots before calling [`initialize`].
/// - `step` never touches an instance index at or beyond the declared counts.
/// - On success, instance 0 holds the state at `time + dt`. On failure the
///   run is over; instance 0 is never overwritten with a partial result.
///
/// [`initialize`]: TimestepScheme::initialize
pub trait TimestepScheme: SchemeInfo {
    /// Number of component-data instances this scheme needs.
    fn component_data_instances(&self) -> usize;

    /// Number of tracer-data instances this scheme needs.
    fn tracer_data_instances(&self) -> usize;

    /// One-time setup before the first step.
    ///
    /// Calling it again with the same container is allowed and yields the
    /// same internal sizes. The default only checks instance counts.
    fn initialize(&mut self, state: &StateContainer, _time: f64) -> Result<()> {
        check_instance_counts(
            self.component_data_instances(),
            self.tracer_data_instances(),
            state,
        )
    }

    /// Advance instance 0 by one step.
    fn step(
        &mut self,
        step: StepInfo,
        state: &mut StateContainer,
        rhs: &mut dyn RhsEvaluator,
    ) -> Result<()>;
}

/// Type alias for a runtime-selected scheme.
pub type BoxedScheme = Box<dyn TimestepScheme>;

/// Check that a container provides at least the requested instance counts.
pub fn check_instance_counts(
    components: usize,
    tracers: usize,
    state: &StateContainer,
) -> Result<()> {
    if state.component_instances() < components {
        return Err(TimestepError::configuration(format!(
            "scheme needs {components} component instances, container has {}",
            state.component_instances()
        )));
    }
    if state.layout().has_tracers() && state.tracer_instances() < tracers {
        return Err(TimestepError::configuration(format!(
            "scheme needs {tracers} tracer instances, container has {}",
            state.tracer_instances()
        )));
    }
    Ok(())
}

/// Copy a finished step from `staging` into the current slot.
///
/// The staged state is checked for NaN/Inf first so a blown-up step never
/// reaches instance 0.
pub fn commit_staged(state: &mut StateContainer, staging: InstanceIndex) -> Result<()> {
    if let Some((kind, offset, value)) = state.buffer(staging)?.first_non_finite() {
        return Err(TimestepError::numerical_domain(
            format!("{kind} value {offset} of the new state"),
            value,
        ));
    }
    state.copy(InstanceIndex::CURRENT, staging)
}
