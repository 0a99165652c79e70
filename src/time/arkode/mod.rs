//! Adaptive IMEX integration through the [`ark`](crate::ark) stepper.
//!
//! The adapter lends container instances to an [`ArkStep`] integrator as
//! its work vectors and forwards the integrator's right-hand-side callbacks
//! to the model's [`RhsEvaluator`]. Each `step` call integrates from `time`
//! to `time + dt`; inside, the integrator takes as many adaptive sub-steps
//! as its tolerances demand.
//!
//! # Lifecycle
//!
//! ```text
//! Unconfigured --initialize--> Initialized --first step--> Stepping
//! ```
//!
//! `initialize` validates the configuration (table selection, vector budget)
//! and creates the integrator at the initial time, drawing its work vectors
//! from the instance pool. A `step` that starts at another time, or follows
//! a failed step, recreates it there. Dropping the adapter releases it.
//!
//! # Example
//! ```
//! use atmos_ts::ark::IntegrationMode;
//! use atmos_ts::rhs::LinearSplitRhs;
//! use atmos_ts::state::{FieldLayout, StateContainer};
//! use atmos_ts::time::{ArkodeAdapter, ArkodeConfig, StepInfo, TimestepScheme};
//!
//! let config = ArkodeConfig::default()
//!     .with_mode(IntegrationMode::Implicit)
//!     .with_tolerances(1e-8, 1e-12)
//!     .with_max_steps(5000);
//! let mut scheme = ArkodeAdapter::new(config);
//! let mut state = StateContainer::allocate(
//!     FieldLayout::new(1, 0, 1),
//!     scheme.component_data_instances(),
//!     scheme.tracer_data_instances(),
//! )
//! .unwrap();
//! state.current_mut().fill(1.0);
//!
//! let mut rhs = LinearSplitRhs::new(-1.0, 0.0);
//! scheme.initialize(&state, 0.0).unwrap();
//! scheme
//!     .step(StepInfo::new(true, true, 0.0, 1.0), &mut state, &mut rhs)
//!     .unwrap();
//! assert!((state.current().components[0] - (-1.0_f64).exp()).abs() < 1e-6);
//! ```

mod config;
mod context;

pub use config::ArkodeConfig;
pub use context::{CallbackContext, InstancePool};

use crate::ark::{ArkStats, ArkStep, ArkStepConfig, MethodTables};
use crate::error::{Result, TimestepError};
use crate::rhs::RhsEvaluator;
use crate::state::{FieldLayout, StateContainer};
use crate::time::scheme::{SchemeInfo, StepInfo, TimestepScheme, check_instance_counts};
use crate::types::InstanceIndex;

/// Where the adapter is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterPhase {
    /// No successful `initialize` yet
    Unconfigured,
    /// Integrator ready at the initial time, no step taken yet
    Initialized,
    /// Integrator has advanced the solution
    Stepping,
}

/// Integrator state bound to one container layout.
struct Session {
    layout: FieldLayout,
    step_config: ArkStepConfig,
    pool: InstancePool,
    stepper: Option<ArkStep<InstanceIndex>>,
}

impl Session {
    /// Drop the integrator and take all its instances back.
    fn restart(&mut self, n_instances: usize) {
        self.stepper = None;
        self.pool = InstancePool::new(n_instances);
    }
}

/// [`TimestepScheme`] backed by the adaptive additive Runge-Kutta stepper.
pub struct ArkodeAdapter {
    config: ArkodeConfig,
    session: Option<Session>,
}

impl ArkodeAdapter {
    /// Create an unconfigured adapter.
    pub fn new(config: ArkodeConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Adapter settings.
    pub fn config(&self) -> &ArkodeConfig {
        &self.config
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> AdapterPhase {
        match &self.session {
            None => AdapterPhase::Unconfigured,
            Some(Session {
                stepper: Some(stepper), ..
            }) if stepper.stats().attempts > 0 => AdapterPhase::Stepping,
            Some(_) => AdapterPhase::Initialized,
        }
    }

    /// Integrator counters, once initialized.
    pub fn stats(&self) -> Option<&ArkStats> {
        self.session.as_ref()?.stepper.as_ref().map(ArkStep::stats)
    }

    /// Work vectors the configured method needs, besides the solution.
    ///
    /// # Errors
    /// Configuration errors from the table selection.
    pub fn required_vectors(&self) -> Result<usize> {
        Ok(self.config.step_config(1.0)?.required_vectors())
    }

    fn tables(&self) -> Option<MethodTables> {
        match &self.session {
            Some(s) => Some(s.step_config.tables.clone()),
            None => self.config.step_config(1.0).ok().map(|c| c.tables),
        }
    }
}

impl SchemeInfo for ArkodeAdapter {
    fn name(&self) -> &'static str {
        "arkode"
    }

    fn order(&self) -> usize {
        self.tables().map_or(0, |t| t.order())
    }

    fn n_stages(&self) -> usize {
        self.tables().map_or(0, |t| t.stages())
    }
}

impl TimestepScheme for ArkodeAdapter {
    fn component_data_instances(&self) -> usize {
        self.config.nvectors
    }

    fn tracer_data_instances(&self) -> usize {
        self.config.nvectors
    }

    fn initialize(&mut self, state: &StateContainer, time: f64) -> Result<()> {
        let n = self.config.nvectors;
        check_instance_counts(n, n, state)?;

        let step_config = self.config.step_config(1.0)?;
        let required = step_config.required_vectors();
        if n < required + 1 {
            return Err(TimestepError::configuration(format!(
                "arkode needs {required} work instances plus the solution, nvectors = {n}"
            )));
        }

        log::info!(
            "arkode: {} integration, {} stages, order {}, {} of {} instances in use, {}",
            step_config.mode,
            step_config.tables.stages(),
            step_config.tables.order(),
            required + 1,
            n,
            if self.config.fixed_step { "fixed steps" } else { "adaptive steps" }
        );
        let mut pool = InstancePool::new(n);
        let stepper = ArkStep::create(&mut pool, step_config.clone(), InstanceIndex::CURRENT, time)?;
        self.session = Some(Session {
            layout: state.layout(),
            step_config,
            pool,
            stepper: Some(stepper),
        });
        Ok(())
    }

    fn step(
        &mut self,
        step: StepInfo,
        state: &mut StateContainer,
        rhs: &mut dyn RhsEvaluator,
    ) -> Result<()> {
        step.validate()?;
        if self.session.is_none() {
            self.initialize(state, step.time)?;
        }
        let n = self.config.nvectors;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| TimestepError::configuration("arkode adapter is not initialized"))?;
        if session.layout != state.layout() {
            return Err(TimestepError::layout_mismatch(
                session.layout.to_string(),
                state.layout().to_string(),
            ));
        }

        // The driver may restart from another time; the integrator follows.
        if let Some(stepper) = &session.stepper {
            let t = stepper.current_time();
            if (t - step.time).abs() > 1e-12 * step.time.abs().max(1.0) {
                log::debug!("arkode: restarting integrator at t = {} (was at t = {t})", step.time);
                session.restart(n);
            }
        }

        if session.stepper.is_none() {
            let config = session.step_config.clone();
            let stepper = ArkStep::create(&mut session.pool, config, InstanceIndex::CURRENT, step.time)?;
            session.stepper = Some(stepper);
        }
        let Some(stepper) = session.stepper.as_mut() else {
            return Err(TimestepError::configuration("arkode integrator missing"));
        };
        if self.config.fixed_step {
            stepper.set_fixed_step(step.dt)?;
        }

        let mut ctx = CallbackContext::new(state, rhs, &mut session.pool);

        match stepper.evolve(&mut ctx, step.end_time()) {
            Ok(_) => {
                let stats = stepper.stats();
                log::debug!(
                    "arkode: reached t = {}, {} steps ({} rejected), last h = {:.3e}",
                    step.end_time(),
                    stats.steps,
                    stats.error_test_failures + stats.convergence_failures,
                    stats.last_step
                );
                Ok(())
            }
            Err(err) => {
                let failure = ctx.take_failure();
                drop(ctx);
                session.restart(n);
                Err(failure.unwrap_or_else(|| err.into()))
            }
        }
    }
}
