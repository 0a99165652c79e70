//! Explicit single-step schemes driven by the full tendency.
//!
//! These treat f + g as one non-stiff right-hand side. They are mainly
//! useful as references for the IMEX schemes and for non-stiff test cases.

use crate::error::Result;
use crate::rhs::RhsEvaluator;
use crate::state::StateContainer;
use crate::time::scheme::{SchemeInfo, StepInfo, TimestepScheme, commit_staged};
use crate::types::InstanceIndex;

// =============================================================================
// SSP-RK3
// =============================================================================

/// Strong Stability Preserving Runge-Kutta 3rd order scheme.
///
/// Shu-Osher form:
/// ```text
/// u1 = u + dt * L(u, t)
/// u2 = 3/4 * u + 1/4 * u1 + 1/4 * dt * L(u1, t + dt)
/// u_new = 1/3 * u + 2/3 * u2 + 2/3 * dt * L(u2, t + dt/2)
/// ```
///
/// Instances: 0 = u, 1 = L, 2 = u1 (reused for u_new), 3 = u2. The stage
/// not yet written serves as scratch for the full tendency.
#[derive(Clone, Copy, Debug, Default)]
pub struct SspRk3;

impl SspRk3 {
    const TENDENCY: InstanceIndex = InstanceIndex::new(1);
    const U1: InstanceIndex = InstanceIndex::new(2);
    const U2: InstanceIndex = InstanceIndex::new(3);
}

impl SchemeInfo for SspRk3 {
    fn name(&self) -> &'static str {
        "ssp-rk3"
    }

    fn order(&self) -> usize {
        3
    }

    fn n_stages(&self) -> usize {
        3
    }
}

impl TimestepScheme for SspRk3 {
    fn component_data_instances(&self) -> usize {
        4
    }

    fn tracer_data_instances(&self) -> usize {
        4
    }

    fn step(
        &mut self,
        step: StepInfo,
        state: &mut StateContainer,
        rhs: &mut dyn RhsEvaluator,
    ) -> Result<()> {
        step.validate()?;
        let (t, dt) = (step.time, step.dt);
        let u = InstanceIndex::CURRENT;

        // Stage 1: u1 = u + dt * L(u, t)
        let (src, l, work) = state.triple_mut(u, Self::TENDENCY, Self::U2)?;
        rhs.full_rhs(src, t, l, work)?;
        state.linear_combination(Self::U1, &[(1.0, u), (dt, Self::TENDENCY)])?;

        // Stage 2: u2 = 3/4 * u + 1/4 * u1 + 1/4 * dt * L(u1, t + dt)
        let (src, l, work) = state.triple_mut(Self::U1, Self::TENDENCY, Self::U2)?;
        rhs.full_rhs(src, t + dt, l, work)?;
        state.linear_combination(
            Self::U2,
            &[(0.75, u), (0.25, Self::U1), (0.25 * dt, Self::TENDENCY)],
        )?;

        // Stage 3: u_new = 1/3 * u + 2/3 * u2 + 2/3 * dt * L(u2, t + dt/2)
        let (src, l, work) = state.triple_mut(Self::U2, Self::TENDENCY, Self::U1)?;
        rhs.full_rhs(src, t + 0.5 * dt, l, work)?;
        state.linear_combination(
            Self::U1,
            &[
                (1.0 / 3.0, u),
                (2.0 / 3.0, Self::U2),
                (2.0 / 3.0 * dt, Self::TENDENCY),
            ],
        )?;

        commit_staged(state, Self::U1)
    }
}

// =============================================================================
// Forward Euler (for comparison/testing)
// =============================================================================

/// Forward Euler scheme (1st order).
///
/// ```text
/// u_new = u + dt * L(u, t)
/// ```
///
/// Instances: 0 = u, 1 = L, 2 = u_new.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForwardEuler;

impl SchemeInfo for ForwardEuler {
    fn name(&self) -> &'static str {
        "forward-euler"
    }

    fn order(&self) -> usize {
        1
    }

    fn n_stages(&self) -> usize {
        1
    }
}

impl TimestepScheme for ForwardEuler {
    fn component_data_instances(&self) -> usize {
        3
    }

    fn tracer_data_instances(&self) -> usize {
        3
    }

    fn step(
        &mut self,
        step: StepInfo,
        state: &mut StateContainer,
        rhs: &mut dyn RhsEvaluator,
    ) -> Result<()> {
        step.validate()?;
        let u = InstanceIndex::CURRENT;
        let l = InstanceIndex::new(1);
        let next = InstanceIndex::new(2);

        let (src, tendency, work) = state.triple_mut(u, l, next)?;
        rhs.full_rhs(src, step.time, tendency, work)?;
        state.linear_combination(next, &[(1.0, u), (step.dt, l)])?;
        commit_staged(state, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhs::LinearSplitRhs;
    use crate::state::FieldLayout;

    fn run<S: TimestepScheme>(scheme: &mut S, rhs: &mut LinearSplitRhs, dt: f64, n_steps: usize) -> f64 {
        let mut state = StateContainer::allocate(
            FieldLayout::new(1, 1, 3),
            scheme.component_data_instances(),
            scheme.tracer_data_instances(),
        )
        .unwrap();
        state.current_mut().fill(1.0);
        scheme.initialize(&state, 0.0).unwrap();

        for i in 0..n_steps {
            let info = StepInfo::new(i == 0, i + 1 == n_steps, dt * i as f64, dt);
            scheme.step(info, &mut state, rhs).unwrap();
        }
        state.current().tracers[0]
    }

    #[test]
    fn test_ssprk3_order() {
        // du/dt = u, u(0) = 1; exact exp(t)
        let mut rhs = LinearSplitRhs::new(0.5, 0.5);
        let v = run(&mut SspRk3, &mut rhs, 0.01, 10);
        let expected = 0.1_f64.exp();
        assert!((v - expected).abs() < 1e-4, "Expected {expected}, got {v}");
        assert_eq!(rhs.counts().explicit, 30);
    }

    #[test]
    fn test_forward_euler_order() {
        // du/dt = -u, u(0) = 1; exact exp(-t)
        let mut rhs = LinearSplitRhs::new(-1.0, 0.0);
        let v = run(&mut ForwardEuler, &mut rhs, 0.001, 100);
        let expected = (-0.1_f64).exp();
        assert!((v - expected).abs() < 0.02, "Expected {expected}, got {v}");
    }

    #[test]
    fn test_scheme_names() {
        assert_eq!(SspRk3.name(), "ssp-rk3");
        assert_eq!(ForwardEuler.name(), "forward-euler");
        assert_eq!(SspRk3.order(), 3);
        assert_eq!(ForwardEuler.n_stages(), 1);
    }

    #[test]
    fn test_rejects_small_container() {
        let state = StateContainer::allocate(FieldLayout::new(1, 0, 1), 2, 0).unwrap();
        let err = SspRk3.initialize(&state, 0.0).unwrap_err();
        assert!(err.is_configuration());
    }
}
