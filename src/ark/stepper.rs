//! Additive Runge-Kutta time stepper with embedded error control.
//!
//! Each step computes the stages
//!
//! ```text
//! z_i = y_n + h sum_{j<i} (ae_ij f(t_j, z_j) + ai_ij g(t_j, z_j)) + h ai_ii g(t_i, z_i)
//! ```
//!
//! solving the last term implicitly when `ai_ii != 0`, then combines them with
//! the solution weights. The difference to the embedded weights gives the
//! local error estimate that drives the step size.

use crate::ark::butcher::ButcherTable;
use crate::ark::config::{ArkStepConfig, IntegrationMode};
use crate::ark::controller::{CONVERGENCE_FAILURE_ETA, StepController, initial_step};
use crate::ark::nonlinear::{NonlinearCounters, RhsPart, StageEquation, StageSolver};
use crate::ark::vector::clone_vectors;
use crate::ark::{ArkError, ArkSystem, VectorPool};

/// Error test failures allowed within one step.
const MAX_ERROR_TEST_FAILURES: usize = 7;
/// Nonlinear solver failures allowed within one step.
const MAX_CONVERGENCE_FAILURES: usize = 10;

/// Integrator counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ArkStats {
    /// Accepted steps
    pub steps: usize,
    /// Attempted steps, including rejected ones
    pub attempts: usize,
    /// Steps rejected by the error test
    pub error_test_failures: usize,
    /// Steps rejected because a stage solve did not converge
    pub convergence_failures: usize,
    /// Evaluations of the explicit part
    pub explicit_rhs_evals: usize,
    /// Evaluations of the implicit part, including those in the solver
    pub implicit_rhs_evals: usize,
    /// Nonlinear iterations
    pub nonlinear_iterations: usize,
    /// Krylov iterations
    pub linear_iterations: usize,
    /// Size of the last accepted step
    pub last_step: f64,
}

/// Which weights combine the stage derivatives.
#[derive(Clone, Copy)]
enum Weights {
    /// Lower part of row `i` of `A`
    Row(usize),
    /// Solution weights `b`
    Solution,
}

enum Attempt {
    /// All stages solved; `dsm` is the weighted local error (0 without error control)
    Completed { dsm: f64 },
    /// A stage solve did not converge
    SolverFailed,
}

/// Adaptive or fixed-step additive Runge-Kutta integrator.
///
/// All vectors belong to the [`ArkSystem`] passed to each call; the stepper
/// only remembers handles. Call [`free`](Self::free) with the same system to
/// hand them back.
pub struct ArkStep<H> {
    config: ArkStepConfig,
    explicit_part: Option<RhsPart>,
    implicit_part: Option<RhsPart>,
    controller: StepController,
    y: H,
    yn: H,
    ycur: H,
    sdata: H,
    ewt: H,
    tmp: H,
    fe: Vec<H>,
    fi: Vec<H>,
    solver: Option<StageSolver<H>>,
    t: f64,
    h: f64,
    first_step: bool,
    stats: ArkStats,
}

impl<H: Copy + Eq + std::fmt::Debug> ArkStep<H> {
    /// Set up an integrator for the solution vector `y` at time `t0`.
    ///
    /// Only work vectors are allocated here; the first call to
    /// [`evolve`](Self::evolve) reads `y` and estimates the initial step.
    ///
    /// # Errors
    /// [`ArkError::IllegalInput`] for an inconsistent configuration, or the
    /// provider's error if it cannot supply the work vectors. Nothing stays
    /// allocated on failure.
    pub fn create<S: VectorPool<Handle = H>>(
        sys: &mut S,
        config: ArkStepConfig,
        y: H,
        t0: f64,
    ) -> Result<Self, ArkError> {
        config.validate()?;
        if !t0.is_finite() {
            return Err(ArkError::IllegalInput(format!("initial time {t0}")));
        }
        let (explicit_part, implicit_part) = match config.mode {
            IntegrationMode::Imex => (Some(RhsPart::Explicit), Some(RhsPart::Implicit)),
            IntegrationMode::Explicit => (Some(RhsPart::Full), None),
            IntegrationMode::Implicit => (None, Some(RhsPart::Full)),
        };

        let stages = config.tables.stages();
        let per_stage = usize::from(explicit_part.is_some()) + usize::from(implicit_part.is_some());
        let mut vecs = clone_vectors(sys, y, 5 + stages * per_stage)?;
        let fi = if implicit_part.is_some() { vecs.split_off(vecs.len() - stages) } else { Vec::new() };
        let fe = if explicit_part.is_some() { vecs.split_off(vecs.len() - stages) } else { Vec::new() };
        let (yn, ycur, sdata, ewt, tmp) = (vecs[0], vecs[1], vecs[2], vecs[3], vecs[4]);

        let solver = match implicit_part.map(|_| StageSolver::new(sys, y, &config)) {
            None => None,
            Some(Ok(solver)) => Some(solver),
            Some(Err(e)) => {
                for v in vecs.into_iter().chain(fe).chain(fi) {
                    sys.destroy_vector(v);
                }
                return Err(e);
            }
        };

        let controller = StepController::new(config.tables.embedded_order());
        log::debug!(
            "ArkStep created: {} mode, {} stages, order {}, {} work vectors",
            config.mode,
            stages,
            config.tables.order(),
            config.required_vectors()
        );
        Ok(Self {
            config,
            explicit_part,
            implicit_part,
            controller,
            y,
            yn,
            ycur,
            sdata,
            ewt,
            tmp,
            fe,
            fi,
            solver,
            t: t0,
            h: 0.0,
            first_step: true,
            stats: ArkStats::default(),
        })
    }

    /// Hand every work vector back to the provider.
    pub fn free<S: VectorPool<Handle = H>>(self, sys: &mut S) {
        for v in self.work_vectors() {
            sys.destroy_vector(v);
        }
    }

    /// All work vectors held by the integrator.
    pub fn work_vectors(&self) -> Vec<H> {
        let mut v = vec![self.yn, self.ycur, self.sdata, self.ewt, self.tmp];
        v.extend(self.fe.iter().copied());
        v.extend(self.fi.iter().copied());
        if let Some(solver) = &self.solver {
            v.extend(solver.vectors());
        }
        v
    }

    /// Configuration in use.
    pub fn config(&self) -> &ArkStepConfig {
        &self.config
    }

    /// Time of the last accepted step.
    pub fn current_time(&self) -> f64 {
        self.t
    }

    /// Step size the next attempt will use (0 before the first estimate).
    pub fn next_step(&self) -> f64 {
        self.config.fixed_step.unwrap_or(self.h)
    }

    /// Counters since creation.
    pub fn stats(&self) -> &ArkStats {
        &self.stats
    }

    /// Change the fixed step size. Fails on an adaptive integrator.
    pub fn set_fixed_step(&mut self, h: f64) -> Result<(), ArkError> {
        if self.config.fixed_step.is_none() {
            return Err(ArkError::IllegalInput(
                "integrator was created with adaptive stepping".into(),
            ));
        }
        if !(h.is_finite() && h > 0.0) {
            return Err(ArkError::IllegalInput(format!("fixed step {h}")));
        }
        self.config.fixed_step = Some(h);
        Ok(())
    }

    /// Advance the solution vector from the current time to `tout`.
    ///
    /// The solution vector is read at the start and written only once `tout`
    /// is reached, so it keeps its old contents when an error is returned.
    pub fn evolve<S: ArkSystem<Handle = H>>(&mut self, sys: &mut S, tout: f64) -> Result<f64, ArkError> {
        if !(tout.is_finite() && tout > self.t) {
            return Err(ArkError::IllegalInput(format!(
                "output time {tout} is not after the current time {}",
                self.t
            )));
        }
        sys.scale(1.0, self.y, self.yn)?;

        if self.config.fixed_step.is_none() && self.h == 0.0 {
            self.update_weights(sys)?;
            self.h = self.estimate_initial_step(sys, tout)?;
            log::debug!("initial step estimate h = {:.3e}", self.h);
        }

        let mut steps = 0;
        while self.t < tout {
            if steps >= self.config.max_steps {
                return Err(ArkError::TooMuchWork {
                    time: self.t,
                    tout,
                    steps,
                });
            }
            self.take_step(sys, tout)?;
            steps += 1;
        }

        if !sys.max_norm(self.yn)?.is_finite() {
            return Err(ArkError::NonFinite { time: self.t });
        }
        sys.scale(1.0, self.yn, self.y)?;
        Ok(self.t)
    }

    /// Take one accepted step towards `tout`, retrying as needed.
    fn take_step<S: ArkSystem<Handle = H>>(&mut self, sys: &mut S, tout: f64) -> Result<(), ArkError> {
        self.update_weights(sys)?;
        let fixed = self.config.fixed_step;
        let mut h = fixed.unwrap_or(self.h);
        let mut error_failures = 0;
        let mut solver_failures = 0;

        loop {
            let remaining = tout - self.t;
            // Stretch to the output time rather than leave a sliver
            let lands = remaining - h <= 1e-8 * h;
            if lands {
                h = remaining;
            }
            if self.t + h == self.t {
                return Err(ArkError::StepTooSmall { time: self.t, h });
            }

            self.stats.attempts += 1;
            match self.attempt(sys, h)? {
                Attempt::SolverFailed => {
                    self.stats.convergence_failures += 1;
                    solver_failures += 1;
                    if fixed.is_some() || solver_failures > MAX_CONVERGENCE_FAILURES {
                        return Err(ArkError::ConvergenceFailure {
                            time: self.t,
                            h,
                            failures: solver_failures,
                        });
                    }
                    log::warn!("stage solve failed at t = {}, retrying with h = {:.3e}", self.t, h * CONVERGENCE_FAILURE_ETA);
                    h *= CONVERGENCE_FAILURE_ETA;
                }
                Attempt::Completed { dsm } if fixed.is_some() || dsm <= 1.0 => {
                    self.t = if lands { tout } else { self.t + h };
                    std::mem::swap(&mut self.yn, &mut self.sdata);
                    self.stats.steps += 1;
                    self.stats.last_step = h;
                    if fixed.is_none() {
                        let next = h * self.controller.eta(dsm, true, self.first_step);
                        // A step cut short to land on tout says little about the next one
                        self.h = if lands { next.max(self.h) } else { next };
                    }
                    self.first_step = false;
                    log::trace!("step accepted: t = {}, h = {:.3e}, dsm = {:.3e}", self.t, h, dsm);
                    return Ok(());
                }
                Attempt::Completed { dsm } => {
                    self.stats.error_test_failures += 1;
                    error_failures += 1;
                    if error_failures > MAX_ERROR_TEST_FAILURES {
                        return Err(ArkError::ErrorTestFailure {
                            time: self.t,
                            h,
                            failures: error_failures,
                        });
                    }
                    let eta = self.controller.eta(dsm, false, self.first_step);
                    log::debug!("step rejected: t = {}, h = {:.3e}, dsm = {:.3e}", self.t, h, dsm);
                    h *= eta;
                    self.h = h;
                }
            }
        }
    }

    /// Compute all stages, the new solution (into `sdata`) and the error norm.
    fn attempt<S: ArkSystem<Handle = H>>(&mut self, sys: &mut S, h: f64) -> Result<Attempt, ArkError> {
        let stages = self.config.tables.stages();
        let c = self.config.tables.c().to_vec();
        let mut counters = NonlinearCounters::default();

        for i in 0..stages {
            let ti = self.t + c[i] * h;

            let mut terms = vec![(1.0, self.yn)];
            self.push_stage_terms(&mut terms, h, Weights::Row(i));
            sys.linear_combination(&terms, self.sdata)?;

            let diag = self
                .config
                .tables
                .implicit
                .as_ref()
                .map_or(0.0, |t| t.a[i][i]);
            if let (Some(part), Some(solver), true) = (self.implicit_part, self.solver.as_mut(), diag != 0.0) {
                sys.scale(1.0, self.yn, self.ycur)?;
                let eq = StageEquation {
                    t: ti,
                    gamma: h * diag,
                    sdata: self.sdata,
                    ewt: self.ewt,
                    z: self.ycur,
                    part,
                };
                let ok = solver.solve(sys, &eq, &mut counters)?;
                self.record(&counters);
                counters = NonlinearCounters::default();
                if !ok {
                    return Ok(Attempt::SolverFailed);
                }
            } else {
                sys.scale(1.0, self.sdata, self.ycur)?;
            }

            if let Some(part) = self.explicit_part {
                part.eval(sys, ti, self.ycur, self.fe[i])?;
                self.stats.explicit_rhs_evals += 1;
            }
            if let Some(part) = self.implicit_part {
                part.eval(sys, ti, self.ycur, self.fi[i])?;
                self.stats.implicit_rhs_evals += 1;
            }
        }

        // New solution
        let mut terms = vec![(1.0, self.yn)];
        self.push_stage_terms(&mut terms, h, Weights::Solution);
        sys.linear_combination(&terms, self.sdata)?;

        if self.config.fixed_step.is_some() {
            return Ok(Attempt::Completed { dsm: 0.0 });
        }

        // Local error estimate: h sum (b_j - d_j) F_j
        let mut terms = Vec::with_capacity(2 * stages);
        for (table, vecs) in self.parts() {
            let Some(d) = table.embedding.as_ref() else {
                continue;
            };
            for j in 0..stages {
                let w = table.b[j] - d[j];
                if w != 0.0 {
                    terms.push((h * w, vecs[j]));
                }
            }
        }
        sys.linear_combination(&terms, self.tmp)?;
        let dsm = sys.wrms_norm(self.tmp, self.ewt)?;
        if !dsm.is_finite() {
            // Treated like a hard error test failure
            return Ok(Attempt::Completed { dsm: f64::MAX });
        }
        Ok(Attempt::Completed { dsm })
    }

    /// Tables paired with the stage derivatives they weight.
    fn parts(&self) -> impl Iterator<Item = (&ButcherTable, &[H])> {
        let explicit = self.config.tables.explicit.as_ref().map(|t| (t, self.fe.as_slice()));
        let implicit = self.config.tables.implicit.as_ref().map(|t| (t, self.fi.as_slice()));
        explicit.into_iter().chain(implicit)
    }

    fn push_stage_terms(&self, terms: &mut Vec<(f64, H)>, h: f64, weights: Weights) {
        for (table, vecs) in self.parts() {
            let w = match weights {
                Weights::Row(i) => &table.a[i][..i],
                Weights::Solution => table.b.as_slice(),
            };
            for (&w, &v) in w.iter().zip(vecs) {
                if w != 0.0 {
                    terms.push((h * w, v));
                }
            }
        }
    }

    fn record(&mut self, counters: &NonlinearCounters) {
        self.stats.nonlinear_iterations += counters.iterations;
        self.stats.linear_iterations += counters.linear_iterations;
        self.stats.implicit_rhs_evals += counters.rhs_evals;
    }

    /// ewt = 1 / (rtol |yn| + atol)
    fn update_weights<S: ArkSystem<Handle = H>>(&mut self, sys: &mut S) -> Result<(), ArkError> {
        sys.abs(self.yn, self.ewt)?;
        sys.scale(self.config.rtol, self.ewt, self.ewt)?;
        sys.add_const(self.ewt, self.config.atol, self.ewt)?;
        sys.inv(self.ewt, self.ewt)?;
        let max = sys.max_norm(self.ewt)?;
        if !max.is_finite() {
            return Err(ArkError::IllegalInput(
                "error weight is infinite; a solution component is zero and atol = 0".into(),
            ));
        }
        Ok(())
    }

    fn estimate_initial_step<S: ArkSystem<Handle = H>>(&mut self, sys: &mut S, tout: f64) -> Result<f64, ArkError> {
        sys.full_rhs(self.t, self.yn, self.tmp)?;
        match (self.explicit_part, self.implicit_part) {
            (Some(_), Some(_)) => {
                self.stats.explicit_rhs_evals += 1;
                self.stats.implicit_rhs_evals += 1;
            }
            (Some(_), None) => self.stats.explicit_rhs_evals += 1,
            _ => self.stats.implicit_rhs_evals += 1,
        }
        let d0 = sys.wrms_norm(self.yn, self.ewt)?;
        let d1 = sys.wrms_norm(self.tmp, self.ewt)?;
        if !(d0.is_finite() && d1.is_finite()) {
            return Err(ArkError::NonFinite { time: self.t });
        }
        Ok(initial_step(d0, d1, tout - self.t))
    }
}
