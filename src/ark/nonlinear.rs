//! Nonlinear solvers for the implicit stage equation
//!
//! ```text
//! z = sdata + h * a_ii * g(t_i, z)
//! ```
//!
//! Both solvers report a recoverable failure (`Ok(false)`) when they do not
//! converge; the stepper then shrinks the step. Errors from the right-hand
//! side or the vector provider are returned as `Err` and end the integration.

use faer::{Mat, linalg::solvers::Solve};

use crate::ark::config::{ArkStepConfig, NonlinearSolver};
use crate::ark::gmres::Gmres;
use crate::ark::vector::clone_vectors;
use crate::ark::{ArkError, ArkSystem, VectorOps, VectorPool};

/// Convergence rate damping between iterations.
const RATE_DAMPING: f64 = 0.3;
/// Ratio of successive updates above which the iteration is declared divergent.
const DIVERGENCE_RATIO: f64 = 2.0;
/// Safety factor on the nonlinear tolerance relative to the error test.
const NONLINEAR_COEF: f64 = 0.1;
/// Relative tolerance of the inner Krylov solve.
const KRYLOV_TOL: f64 = 0.005;

/// Which right-hand side a method part is applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RhsPart {
    Explicit,
    Implicit,
    Full,
}

impl RhsPart {
    pub(crate) fn eval<S: ArkSystem>(
        self,
        sys: &mut S,
        t: f64,
        y: S::Handle,
        ydot: S::Handle,
    ) -> Result<(), ArkError> {
        match self {
            RhsPart::Explicit => sys.explicit_rhs(t, y, ydot),
            RhsPart::Implicit => sys.implicit_rhs(t, y, ydot),
            RhsPart::Full => sys.full_rhs(t, y, ydot),
        }
    }
}

/// One implicit stage equation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StageEquation<H> {
    pub t: f64,
    /// h * a_ii
    pub gamma: f64,
    /// Known part of the stage value
    pub sdata: H,
    /// Error weights
    pub ewt: H,
    /// Iterate; holds the initial guess on entry and the solution on exit
    pub z: H,
    pub part: RhsPart,
}

/// Work counters accumulated by the solvers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NonlinearCounters {
    /// Nonlinear iterations
    pub iterations: usize,
    /// Krylov iterations (Newton only)
    pub linear_iterations: usize,
    /// Implicit right-hand side evaluations made by the solver
    pub rhs_evals: usize,
}

// =============================================================================
// Newton-Krylov
// =============================================================================

struct NewtonWork<H> {
    residual: H,
    delta: H,
    gz: H,
    ztmp: H,
    gtmp: H,
    gmres: Gmres<H>,
}

impl<H: Copy + Eq + std::fmt::Debug> NewtonWork<H> {
    fn solve<S: ArkSystem<Handle = H>>(
        &mut self,
        sys: &mut S,
        eq: &StageEquation<H>,
        max_iters: usize,
        counters: &mut NonlinearCounters,
    ) -> Result<bool, ArkError> {
        let StageEquation { t, gamma, sdata, ewt, z, part } = *eq;
        let (residual, delta, gz, ztmp, gtmp) = (self.residual, self.delta, self.gz, self.ztmp, self.gtmp);

        let mut rate = 1.0;
        let mut del_prev = 0.0;
        for m in 0..max_iters {
            counters.iterations += 1;
            part.eval(sys, t, z, gz)?;
            counters.rhs_evals += 1;

            // residual = -(z - sdata - gamma g(z))
            sys.linear_sum(1.0, sdata, gamma, gz, residual)?;
            sys.linear_sum(1.0, residual, -1.0, z, residual)?;

            // Finite-difference Jacobian-vector product of I - gamma dg/dy
            let mut jv_evals = 0;
            let outcome = self.gmres.solve(sys, residual, delta, |sys, v, jv| {
                let vnorm = sys.wrms_norm(v, ewt)?;
                if vnorm == 0.0 {
                    return sys.scale(1.0, v, jv);
                }
                let sigma = 1.0 / vnorm;
                sys.linear_sum(1.0, z, sigma, v, ztmp)?;
                part.eval(sys, t, ztmp, gtmp)?;
                jv_evals += 1;
                sys.linear_sum(1.0, gtmp, -1.0, gz, gtmp)?;
                sys.linear_sum(1.0, v, -gamma / sigma, gtmp, jv)
            })?;
            counters.rhs_evals += jv_evals;
            counters.linear_iterations += outcome.iterations;
            if !outcome.relative_residual.is_finite() {
                return Ok(false);
            }
            if !outcome.converged {
                log::trace!(
                    "GMRES stopped at relative residual {:.3e} after {} iterations",
                    outcome.relative_residual,
                    outcome.iterations
                );
            }

            sys.linear_sum(1.0, z, 1.0, delta, z)?;
            let del = sys.wrms_norm(delta, ewt)?;
            if !del.is_finite() {
                return Ok(false);
            }
            if converged(m, del, del_prev, &mut rate) {
                return Ok(true);
            }
            if m > 0 && del > DIVERGENCE_RATIO * del_prev {
                log::trace!("Newton iteration diverging at t = {t}: {del:.3e} > 2 * {del_prev:.3e}");
                return Ok(false);
            }
            del_prev = del;
        }
        Ok(false)
    }

    fn vectors(&self) -> Vec<H> {
        let mut v = vec![self.residual, self.delta, self.gz, self.ztmp, self.gtmp];
        v.extend(self.gmres.vectors());
        v
    }
}

// =============================================================================
// Fixed point with Anderson acceleration
// =============================================================================

struct Anderson<H> {
    fold: H,
    gold: H,
    df: Vec<H>,
    dg: Vec<H>,
    stored: usize,
    next: usize,
}

impl<H: Copy + Eq + std::fmt::Debug> Anderson<H> {
    fn reset(&mut self) {
        self.stored = 0;
        self.next = 0;
    }

    /// Record the latest residual and overwrite `gval` with the accelerated
    /// iterate.
    fn accelerate<S: VectorOps<Handle = H>>(
        &mut self,
        sys: &mut S,
        first: bool,
        fcur: H,
        gval: H,
    ) -> Result<(), ArkError> {
        let depth = self.df.len();
        if !first {
            let slot = self.next;
            sys.linear_sum(1.0, fcur, -1.0, self.fold, self.df[slot])?;
            sys.linear_sum(1.0, gval, -1.0, self.gold, self.dg[slot])?;
            self.next = (slot + 1) % depth;
            self.stored = (self.stored + 1).min(depth);
        }
        sys.scale(1.0, fcur, self.fold)?;
        sys.scale(1.0, gval, self.gold)?;
        if self.stored == 0 {
            return Ok(());
        }

        // Least squares min |fcur - DF alpha| via the normal equations
        let n = self.stored;
        let mut gram = Mat::<f64>::zeros(n, n);
        let mut rhs = Mat::<f64>::zeros(n, 1);
        for i in 0..n {
            for j in 0..=i {
                let v = sys.dot(self.df[i], self.df[j])?;
                gram[(i, j)] = v;
                gram[(j, i)] = v;
            }
            rhs[(i, 0)] = sys.dot(self.df[i], fcur)?;
        }
        let alpha = gram.as_ref().full_piv_lu().solve(&rhs);
        if (0..n).any(|i| !alpha[(i, 0)].is_finite()) {
            log::trace!("Anderson least-squares system singular, taking plain update");
            return Ok(());
        }
        for i in 0..n {
            sys.linear_sum(1.0, gval, -alpha[(i, 0)], self.dg[i], gval)?;
        }
        Ok(())
    }
}

struct FixedPointWork<H> {
    gval: H,
    fcur: H,
    gz: H,
    delta: H,
    anderson: Option<Anderson<H>>,
}

impl<H: Copy + Eq + std::fmt::Debug> FixedPointWork<H> {
    fn solve<S: ArkSystem<Handle = H>>(
        &mut self,
        sys: &mut S,
        eq: &StageEquation<H>,
        max_iters: usize,
        counters: &mut NonlinearCounters,
    ) -> Result<bool, ArkError> {
        let StageEquation { t, gamma, sdata, ewt, z, part } = *eq;
        if let Some(aa) = self.anderson.as_mut() {
            aa.reset();
        }

        let mut rate = 1.0;
        let mut del_prev = 0.0;
        for m in 0..max_iters {
            counters.iterations += 1;
            part.eval(sys, t, z, self.gz)?;
            counters.rhs_evals += 1;

            // gval = G(z) = sdata + gamma g(z), fcur = G(z) - z
            sys.linear_sum(1.0, sdata, gamma, self.gz, self.gval)?;
            sys.linear_sum(1.0, self.gval, -1.0, z, self.fcur)?;
            if let Some(aa) = self.anderson.as_mut() {
                aa.accelerate(sys, m == 0, self.fcur, self.gval)?;
            }

            sys.linear_sum(1.0, self.gval, -1.0, z, self.delta)?;
            sys.scale(1.0, self.gval, z)?;
            let del = sys.wrms_norm(self.delta, ewt)?;
            if !del.is_finite() {
                return Ok(false);
            }
            if converged(m, del, del_prev, &mut rate) {
                return Ok(true);
            }
            if m > 0 && del > DIVERGENCE_RATIO * del_prev {
                log::trace!("fixed-point iteration diverging at t = {t}");
                return Ok(false);
            }
            del_prev = del;
        }
        Ok(false)
    }

    fn vectors(&self) -> Vec<H> {
        let mut v = vec![self.gval, self.fcur, self.gz, self.delta];
        if let Some(aa) = &self.anderson {
            v.push(aa.fold);
            v.push(aa.gold);
            v.extend(aa.df.iter().copied());
            v.extend(aa.dg.iter().copied());
        }
        v
    }
}

fn converged(m: usize, del: f64, del_prev: f64, rate: &mut f64) -> bool {
    if m > 0 {
        *rate = (RATE_DAMPING * *rate).max(del / del_prev);
    }
    del * rate.min(1.0) / NONLINEAR_COEF <= 1.0
}

// =============================================================================
// Solver selection
// =============================================================================

/// Stage solver with its workspace.
pub(crate) struct StageSolver<H> {
    kind: SolverWork<H>,
    max_iters: usize,
}

enum SolverWork<H> {
    Newton(NewtonWork<H>),
    FixedPoint(FixedPointWork<H>),
}

impl<H: Copy + Eq + std::fmt::Debug> StageSolver<H> {
    /// Allocate the workspace chosen by `config`.
    pub(crate) fn new<S: VectorPool<Handle = H>>(
        sys: &mut S,
        template: H,
        config: &ArkStepConfig,
    ) -> Result<Self, ArkError> {
        let kind = match config.nonlinear {
            NonlinearSolver::Newton => {
                let mut v = clone_vectors(sys, template, 5 + config.max_krylov + 1)?;
                let basis = v.split_off(5);
                SolverWork::Newton(NewtonWork {
                    residual: v[0],
                    delta: v[1],
                    gz: v[2],
                    ztmp: v[3],
                    gtmp: v[4],
                    gmres: Gmres::with_basis(basis, KRYLOV_TOL),
                })
            }
            NonlinearSolver::FixedPoint => {
                let depth = config.anderson_depth;
                let history = if depth > 0 { 2 + 2 * depth } else { 0 };
                let mut v = clone_vectors(sys, template, 4 + history)?;
                let anderson = (depth > 0).then(|| {
                    let dg = v.split_off(6 + depth);
                    let df = v.split_off(6);
                    Anderson {
                        fold: v[4],
                        gold: v[5],
                        df,
                        dg,
                        stored: 0,
                        next: 0,
                    }
                });
                SolverWork::FixedPoint(FixedPointWork {
                    gval: v[0],
                    fcur: v[1],
                    gz: v[2],
                    delta: v[3],
                    anderson,
                })
            }
        };
        Ok(Self {
            kind,
            max_iters: config.max_nonlinear_iters,
        })
    }

    /// Solve one stage equation. `Ok(false)` means no convergence.
    pub(crate) fn solve<S: ArkSystem<Handle = H>>(
        &mut self,
        sys: &mut S,
        eq: &StageEquation<H>,
        counters: &mut NonlinearCounters,
    ) -> Result<bool, ArkError> {
        match &mut self.kind {
            SolverWork::Newton(w) => w.solve(sys, eq, self.max_iters, counters),
            SolverWork::FixedPoint(w) => w.solve(sys, eq, self.max_iters, counters),
        }
    }

    /// Every vector held by the solver.
    pub(crate) fn vectors(&self) -> Vec<H> {
        match &self.kind {
            SolverWork::Newton(w) => w.vectors(),
            SolverWork::FixedPoint(w) => w.vectors(),
        }
    }
}
