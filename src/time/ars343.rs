//! ARS(3,4,3) additive implicit-explicit Runge-Kutta scheme.
//!
//! Ascher, Ruuth & Spiteri (1997): a 3-stage, 3rd-order IMEX method whose
//! implicit part is an L-stable SDIRK and whose explicit part is a 4-stage
//! ERK sharing the first stage with the current state.
//!
//! For `dy/dt = f(y) + g(y)` with `f` explicit and `g` implicit:
//!
//! ```text
//! Y1 = y_n
//! Yi = y_n + dt * sum_{j<i} a_ij f(Yj) + dt * sum_{1<j<i} â_ij g(Yj) + dt * gamma * g(Yi)
//! y_{n+1} = y_n + dt * sum_j b_j (f(Yj) + g(Yj))
//! ```
//!
//! Every `Yi` with `i > 1` is an implicit correction of its perturbation
//! `Pi` (all terms but the last), delegated to
//! [`RhsEvaluator::solve_implicit`] with sub-step `gamma * dt`. The implicit
//! tendency of the stage is then recovered as `(Yi - Pi) / (gamma * dt)`
//! rather than re-evaluated.
//!
//! Instance map:
//!
//! | instance | content |
//! |---|---|
//! | 0 | y_n (and y_{n+1} on return) |
//! | 1, 2, 3 | stage states Y2, Y3, Y4 |
//! | 4..=7 | explicit tendencies f(Y1) .. f(Y4) |
//! | 8 | stage perturbation P_i |
//! | 9 | staged y_{n+1} |

use crate::ark::{ButcherTable, MethodTables};
use crate::error::{Result, TimestepError};
use crate::rhs::RhsEvaluator;
use crate::state::{FieldLayout, Integrable, StateBuffer, StateContainer};
use crate::time::scheme::{SchemeInfo, StepInfo, TimestepScheme, check_instance_counts, commit_staged};
use crate::types::InstanceIndex;

/// Diagonal coefficient of the implicit table.
pub const GAMMA: f64 = 0.435_866_521_508_459;

/// Second weight, `-3 gamma^2 / 2 + 4 gamma - 1/4`.
const B2: f64 = -1.5 * GAMMA * GAMMA + 4.0 * GAMMA - 0.25;

/// Third weight, `3 gamma^2 / 2 - 5 gamma + 5/4`.
const B3: f64 = 1.5 * GAMMA * GAMMA - 5.0 * GAMMA + 1.25;

/// Stage abscissae.
pub const C: [f64; 4] = [0.0, GAMMA, 0.5 * (1.0 + GAMMA), 1.0];

/// Explicit table (strictly lower triangular).
pub const A_EXPLICIT: [[f64; 4]; 4] = [
    [0.0, 0.0, 0.0, 0.0],
    [GAMMA, 0.0, 0.0, 0.0],
    [0.321_278_886_0, 0.396_654_374_7, 0.0, 0.0],
    [-0.105_858_296, 0.552_929_147_9, 0.552_929_147_9, 0.0],
];

/// Implicit table (lower triangular, empty first stage).
pub const A_IMPLICIT: [[f64; 4]; 4] = [
    [0.0, 0.0, 0.0, 0.0],
    [0.0, GAMMA, 0.0, 0.0],
    [0.0, 0.5 * (1.0 - GAMMA), GAMMA, 0.0],
    [0.0, B2, B3, GAMMA],
];

/// Weights, shared by both tables.
pub const B: [f64; 4] = [0.0, B2, B3, GAMMA];

const STAGE: [InstanceIndex; 4] = [
    InstanceIndex::CURRENT,
    InstanceIndex::new(1),
    InstanceIndex::new(2),
    InstanceIndex::new(3),
];
const EXPLICIT: [InstanceIndex; 4] = [
    InstanceIndex::new(4),
    InstanceIndex::new(5),
    InstanceIndex::new(6),
    InstanceIndex::new(7),
];
const PERTURBATION: InstanceIndex = InstanceIndex::new(8);
const NEXT: InstanceIndex = InstanceIndex::new(9);

/// Implicit tendencies of stages 2..4, sized once to the field layout.
#[derive(Clone, Debug)]
struct ImplicitStages {
    layout: FieldLayout,
    g: [StateBuffer; 3],
}

impl ImplicitStages {
    fn new(layout: FieldLayout) -> Self {
        Self {
            layout,
            g: std::array::from_fn(|_| StateBuffer::new(layout)),
        }
    }
}

/// Fixed-step ARS(3,4,3) scheme.
#[derive(Clone, Debug, Default)]
pub struct Ars343 {
    stages: Option<ImplicitStages>,
}

impl Ars343 {
    /// Create the scheme; stage buffers are sized in `initialize`.
    pub fn new() -> Self {
        Self { stages: None }
    }

    /// Layout the stage buffers were sized for, once initialized.
    pub fn stage_layout(&self) -> Option<FieldLayout> {
        self.stages.as_ref().map(|s| s.layout)
    }

    /// The same method as tables for the adaptive stepper.
    ///
    /// There is no embedded method, so the tables only run with fixed steps.
    pub fn method_tables() -> MethodTables {
        let table = |name: &str, a: &[[f64; 4]; 4]| ButcherTable {
            name: name.to_string(),
            c: C.to_vec(),
            a: a.iter().map(|row| row.to_vec()).collect(),
            b: B.to_vec(),
            embedding: None,
            order: 3,
            embedded_order: 0,
        };
        MethodTables::pair(table("ars343-erk", &A_EXPLICIT), table("ars343-dirk", &A_IMPLICIT))
    }

    /// Build stage `i` (1..=3): perturbation, implicit correction, tendencies.
    fn stage(
        stages: &mut ImplicitStages,
        i: usize,
        t: f64,
        dt: f64,
        state: &mut StateContainer,
        rhs: &mut dyn RhsEvaluator,
    ) -> Result<()> {
        let stage_time = t + C[i] * dt;

        // P_i = y_n + dt * sum_j a_ij f_j + dt * sum_j â_ij g_j
        let mut terms = vec![(1.0, STAGE[0])];
        terms.extend((0..i).map(|j| (dt * A_EXPLICIT[i][j], EXPLICIT[j])));
        state.linear_combination(PERTURBATION, &terms)?;
        {
            let p = state.buffer_mut(PERTURBATION)?;
            for j in 1..i {
                p.axpy(dt * A_IMPLICIT[i][j], &stages.g[j - 1]);
            }
        }

        // Y_i = P_i + gamma dt g(Y_i)
        let sub_dt = A_IMPLICIT[i][i] * dt;
        let (p, y) = state.pair_mut(PERTURBATION, STAGE[i])?;
        rhs.solve_implicit(p, sub_dt, stage_time, y)?;

        // g_i = (Y_i - P_i) / (gamma dt)
        let inv = 1.0 / sub_dt;
        stages.g[i - 1].linear_combination(&[
            (inv, state.buffer(STAGE[i])?),
            (-inv, state.buffer(PERTURBATION)?),
        ]);

        let (y, f) = state.pair_mut(STAGE[i], EXPLICIT[i])?;
        rhs.explicit_rhs(y, stage_time, f)?;

        log::trace!("ars343 stage {} done at t = {stage_time}", i + 1);
        Ok(())
    }
}

impl SchemeInfo for Ars343 {
    fn name(&self) -> &'static str {
        "ars343"
    }

    fn order(&self) -> usize {
        3
    }

    fn n_stages(&self) -> usize {
        3
    }
}

impl TimestepScheme for Ars343 {
    fn component_data_instances(&self) -> usize {
        10
    }

    fn tracer_data_instances(&self) -> usize {
        10
    }

    fn initialize(&mut self, state: &StateContainer, _time: f64) -> Result<()> {
        check_instance_counts(
            self.component_data_instances(),
            self.tracer_data_instances(),
            state,
        )?;
        let layout = state.layout();
        if self.stage_layout() != Some(layout) {
            log::debug!("ars343: sizing stage buffers for {layout}");
            self.stages = Some(ImplicitStages::new(layout));
        }
        Ok(())
    }

    /// One ARS(3,4,3) step. The first/last-step flags do not change anything:
    /// the method has no start-up or history.
    fn step(
        &mut self,
        step: StepInfo,
        state: &mut StateContainer,
        rhs: &mut dyn RhsEvaluator,
    ) -> Result<()> {
        step.validate()?;
        if self.stages.is_none() {
            self.initialize(state, step.time)?;
        }
        let stages = self
            .stages
            .as_mut()
            .ok_or_else(|| TimestepError::configuration("ars343 stage buffers not allocated"))?;
        if stages.layout != state.layout() {
            return Err(TimestepError::layout_mismatch(
                stages.layout.to_string(),
                state.layout().to_string(),
            ));
        }

        let (t, dt) = (step.time, step.dt);

        // Stage 1 is the incoming state: only its explicit tendency is needed.
        let (y, f) = state.pair_mut(STAGE[0], EXPLICIT[0])?;
        rhs.explicit_rhs(y, t, f)?;

        for i in 1..4 {
            Self::stage(stages, i, t, dt, state, rhs)?;
        }

        // y_{n+1} = y_n + dt * sum_j b_j (f_j + g_j)
        let mut terms = vec![(1.0, STAGE[0])];
        terms.extend((1..4).map(|j| (dt * B[j], EXPLICIT[j])));
        state.linear_combination(NEXT, &terms)?;
        {
            let next = state.buffer_mut(NEXT)?;
            for j in 1..4 {
                next.axpy(dt * B[j], &stages.g[j - 1]);
            }
        }

        commit_staged(state, NEXT)
    }
}
