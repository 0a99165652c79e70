//! Run diagnostics: progress reports and per-run statistics.
//!
//! - [`ProgressReporter`]: logs progress every N percent of simulated time
//! - [`RunStatistics`]: step counts, step-size range, wall time and
//!   evaluator call counts of one run
//! - [`CountingRhs`]: wraps an evaluator and counts the calls a scheme makes

use std::time::Instant;

use crate::error::Result;
use crate::rhs::{ImplicitSolveConfig, RhsEvaluator};
use crate::state::StateBuffer;

// =============================================================================
// Evaluator call counting
// =============================================================================

/// Calls a scheme made into its evaluator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvaluationCounts {
    /// Explicit tendency evaluations
    pub explicit: usize,
    /// Implicit tendency evaluations
    pub implicit: usize,
    /// Combined tendency evaluations
    pub full: usize,
    /// Implicit solves
    pub solves: usize,
}

impl EvaluationCounts {
    /// Sum of all calls.
    pub fn total(&self) -> usize {
        self.explicit + self.implicit + self.full + self.solves
    }
}

/// Pass-through evaluator that counts every call.
///
/// Calls the inner evaluator makes to itself (inside its own implicit solve,
/// say) are not seen.
pub struct CountingRhs<'a> {
    inner: &'a mut dyn RhsEvaluator,
    counts: EvaluationCounts,
}

impl<'a> CountingRhs<'a> {
    /// Wrap `inner` with zeroed counters.
    pub fn new(inner: &'a mut dyn RhsEvaluator) -> Self {
        Self {
            inner,
            counts: EvaluationCounts::default(),
        }
    }

    /// Calls seen so far.
    pub fn counts(&self) -> EvaluationCounts {
        self.counts
    }
}

impl RhsEvaluator for CountingRhs<'_> {
    fn explicit_rhs(&mut self, state: &StateBuffer, time: f64, tendency: &mut StateBuffer) -> Result<()> {
        self.counts.explicit += 1;
        self.inner.explicit_rhs(state, time, tendency)
    }

    fn implicit_rhs(&mut self, state: &StateBuffer, time: f64, tendency: &mut StateBuffer) -> Result<()> {
        self.counts.implicit += 1;
        self.inner.implicit_rhs(state, time, tendency)
    }

    fn full_rhs(
        &mut self,
        state: &StateBuffer,
        time: f64,
        tendency: &mut StateBuffer,
        scratch: &mut StateBuffer,
    ) -> Result<()> {
        self.counts.full += 1;
        self.inner.full_rhs(state, time, tendency, scratch)
    }

    fn solve_implicit(
        &mut self,
        perturbation: &StateBuffer,
        sub_dt: f64,
        time: f64,
        result: &mut StateBuffer,
    ) -> Result<()> {
        self.counts.solves += 1;
        self.inner.solve_implicit(perturbation, sub_dt, time, result)
    }

    fn implicit_solve_config(&self) -> ImplicitSolveConfig {
        self.inner.implicit_solve_config()
    }
}

// =============================================================================
// Run statistics
// =============================================================================

/// Summary of one model run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunStatistics {
    /// Scheme that advanced the run
    pub scheme: &'static str,
    /// Final simulation time reached
    pub final_time: f64,
    /// Number of driver steps taken
    pub n_steps: usize,
    /// Smallest step size used
    pub dt_min: f64,
    /// Largest step size used
    pub dt_max: f64,
    /// Wall-clock time in seconds
    pub wall_time: f64,
    /// Evaluator calls made by the scheme
    pub evaluations: EvaluationCounts,
}

impl RunStatistics {
    /// Empty statistics for a run starting at `t_start`.
    pub fn new(scheme: &'static str, t_start: f64) -> Self {
        Self {
            scheme,
            final_time: t_start,
            n_steps: 0,
            dt_min: f64::INFINITY,
            dt_max: 0.0,
            wall_time: 0.0,
            evaluations: EvaluationCounts::default(),
        }
    }

    /// Record one completed step of size `dt` ending at `time`.
    pub fn record_step(&mut self, time: f64, dt: f64) {
        self.final_time = time;
        self.n_steps += 1;
        self.dt_min = self.dt_min.min(dt);
        self.dt_max = self.dt_max.max(dt);
    }

    /// One-line summary for logs.
    pub fn summary_line(&self) -> String {
        format!(
            "{}: t = {}, {} steps, dt in [{:.3e}, {:.3e}], {} evaluator calls, {}",
            self.scheme,
            self.final_time,
            self.n_steps,
            self.dt_min,
            self.dt_max,
            self.evaluations.total(),
            format_duration(self.wall_time)
        )
    }
}

// =============================================================================
// Progress reporting
// =============================================================================

/// Progress reporter for long-running simulations.
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    start_instant: Instant,
    t_start: f64,
    t_end: f64,
    /// Last reported progress percentage
    last_reported_pct: u32,
    /// Report every this many percent; 0 disables reports
    report_interval_pct: u32,
    n_steps: usize,
}

impl ProgressReporter {
    /// Reporter for a run from `t_start` to `t_end`.
    pub fn new(t_start: f64, t_end: f64, report_interval_pct: u32) -> Self {
        Self {
            start_instant: Instant::now(),
            t_start,
            t_end,
            last_reported_pct: 0,
            report_interval_pct,
            n_steps: 0,
        }
    }

    /// Record a timestep.
    pub fn step(&mut self) {
        self.n_steps += 1;
    }

    /// Completed fraction of the run in percent.
    pub fn percent(&self, current_time: f64) -> f64 {
        let span = self.t_end - self.t_start;
        if span <= 0.0 {
            return 100.0;
        }
        ((current_time - self.t_start) / span * 100.0).clamp(0.0, 100.0)
    }

    /// Report if the next threshold was crossed. Returns true if it reported.
    pub fn maybe_report(&mut self, current_time: f64) -> bool {
        if self.report_interval_pct == 0 {
            return false;
        }
        let pct = self.percent(current_time) as u32;
        let threshold = self.last_reported_pct + self.report_interval_pct;

        if pct >= threshold || (pct == 100 && self.last_reported_pct < 100) {
            self.report(current_time);
            self.last_reported_pct = (pct / self.report_interval_pct) * self.report_interval_pct;
            true
        } else {
            false
        }
    }

    /// Log a progress line now.
    pub fn report(&self, current_time: f64) {
        let elapsed = self.start_instant.elapsed().as_secs_f64();
        let pct = self.percent(current_time);

        let eta = if pct > 0.1 {
            format_duration(elapsed * 100.0 / pct - elapsed)
        } else {
            "calculating...".to_string()
        };
        let steps_per_sec = if elapsed > 0.0 { self.n_steps as f64 / elapsed } else { 0.0 };

        log::info!(
            "[{:>5.1}%] t={:.4} | elapsed={} | ETA={} | {:.0} steps/s",
            pct,
            current_time,
            format_duration(elapsed),
            eta,
            steps_per_sec
        );
    }

    /// Wall-clock seconds since the reporter was created.
    pub fn elapsed(&self) -> f64 {
        self.start_instant.elapsed().as_secs_f64()
    }
}

/// Format a duration in seconds as a human-readable string.
fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        format!("{:.0}m{:.0}s", mins, secs - mins * 60.0)
    } else {
        let hours = (secs / 3600.0).floor();
        let mins = ((secs - hours * 3600.0) / 60.0).floor();
        format!("{hours:.0}h{mins:.0}m")
    }
}
