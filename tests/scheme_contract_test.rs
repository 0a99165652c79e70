//! Contract tests run against every scheme: instance honesty, zero tendencies,
//! re-initialization and configuration failures.

use atmos_ts::error::TimestepError;
use atmos_ts::rhs::{LinearSplitRhs, RhsEvaluator};
use atmos_ts::state::{FieldLayout, StateBuffer, StateContainer};
use atmos_ts::ark::{ButcherTable, IntegrationMode, MethodTables};
use atmos_ts::time::{
    AdapterPhase, ArkodeAdapter, ArkodeConfig, Ars343, BoxedScheme, SchemeConfig, StepInfo,
    TimestepScheme,
};

fn all_schemes() -> Vec<SchemeConfig> {
    vec![
        SchemeConfig::ForwardEuler,
        SchemeConfig::SspRk3,
        SchemeConfig::Ars343,
        SchemeConfig::Arkode(ArkodeConfig::default()),
        SchemeConfig::Arkode(ArkodeConfig::default().with_fixed_step(true)),
        SchemeConfig::Arkode(ArkodeConfig::default().with_mode(IntegrationMode::Implicit)),
        SchemeConfig::Arkode(ArkodeConfig::default().with_fixed_point(1).with_iterations(8, 5)),
    ]
}

fn allocate(scheme: &BoxedScheme, layout: FieldLayout) -> StateContainer {
    let mut state = StateContainer::allocate(
        layout,
        scheme.component_data_instances(),
        scheme.tracer_data_instances(),
    )
    .unwrap();
    for (i, v) in state.current_mut().values_mut().enumerate() {
        *v = 0.5 + 0.25 * (i % 7) as f64;
    }
    state
}

fn run_steps(scheme: &mut BoxedScheme, state: &mut StateContainer, rhs: &mut dyn RhsEvaluator, n: usize) {
    let dt = 0.02;
    for i in 0..n {
        let info = StepInfo::new(i == 0, i + 1 == n, i as f64 * dt, dt);
        scheme
            .step(info, state, rhs)
            .unwrap_or_else(|e| panic!("{} failed: {e}", scheme.name()));
    }
}

#[test]
fn test_instance_honesty() {
    let layout = FieldLayout::new(3, 2, 5);
    for config in all_schemes() {
        let mut scheme = config.build();
        let mut state = allocate(&scheme, layout);
        scheme.initialize(&state, 0.0).unwrap();
        state.reset_access_tracking();

        let mut rhs = LinearSplitRhs::new(-1.0, -5.0);
        run_steps(&mut scheme, &mut state, &mut rhs, 5);

        let max = state.max_instance_accessed().unwrap().get();
        let declared = scheme.component_data_instances().min(scheme.tracer_data_instances());
        assert!(max < declared, "{}: touched instance {max}, declared {declared}", scheme.name());
    }
}

#[test]
fn test_zero_tendency_is_a_no_op() {
    let layout = FieldLayout::new(2, 1, 4);
    for config in all_schemes() {
        let mut scheme = config.build();
        let mut state = allocate(&scheme, layout);
        let before = state.current().clone();
        scheme.initialize(&state, 0.0).unwrap();

        // Every call starts again at t = 0
        let mut rhs = LinearSplitRhs::new(0.0, 0.0);
        for dt in [1e-3, 0.1, 10.0] {
            scheme
                .step(StepInfo::new(true, true, 0.0, dt), &mut state, &mut rhs)
                .unwrap();
            let diff = state.current().max_abs_diff(&before);
            assert!(diff < 1e-14, "{} changed the state by {diff} with dt = {dt}", scheme.name());
        }
    }
}

#[test]
fn test_initialize_is_idempotent() {
    let layout = FieldLayout::new(2, 0, 6);
    let mut scheme = Ars343::new();
    let state = StateContainer::allocate(layout, 10, 10).unwrap();
    scheme.initialize(&state, 0.0).unwrap();
    let first = scheme.stage_layout();
    scheme.initialize(&state, 0.0).unwrap();
    assert_eq!(scheme.stage_layout(), first);
    assert_eq!(first, Some(layout));

    let mut adapter = ArkodeAdapter::new(ArkodeConfig::default());
    let state = StateContainer::allocate(layout, 50, 50).unwrap();
    adapter.initialize(&state, 0.0).unwrap();
    adapter.initialize(&state, 0.0).unwrap();
    assert_eq!(adapter.phase(), AdapterPhase::Initialized);
    assert_eq!(adapter.required_vectors().unwrap(), 24);
}

#[test]
fn test_too_few_instances_rejected_at_initialize() {
    let layout = FieldLayout::new(1, 1, 2);
    for config in all_schemes() {
        let mut scheme = config.build();
        let n = scheme.component_data_instances();
        let state = StateContainer::allocate(layout, n - 1, n).unwrap();
        let err = scheme.initialize(&state, 0.0).unwrap_err();
        assert!(err.is_configuration(), "{}: {err}", scheme.name());
    }
}

#[test]
fn test_unknown_table_fails_at_initialize() {
    let mut scheme = ArkodeAdapter::new(ArkodeConfig::default().with_table_id(99));
    let state = StateContainer::allocate(FieldLayout::new(1, 0, 1), 50, 50).unwrap();
    let err = scheme.initialize(&state, 0.0).unwrap_err();
    assert!(err.is_configuration(), "{err}");
    assert_eq!(scheme.phase(), AdapterPhase::Unconfigured);
}

#[test]
fn test_table_id_and_custom_table_are_exclusive() {
    let config = ArkodeConfig::default()
        .with_table_id(16)
        .with_custom_table(MethodTables::default_for(IntegrationMode::Imex));
    let mut scheme = ArkodeAdapter::new(config);
    let state = StateContainer::allocate(FieldLayout::new(1, 0, 1), 50, 50).unwrap();
    assert!(scheme.initialize(&state, 0.0).unwrap_err().is_configuration());
}

#[test]
fn test_malformed_custom_table_fails_at_initialize() {
    let ragged = ButcherTable {
        name: "ragged".into(),
        c: vec![0.0, 1.0],
        a: vec![vec![], vec![1.0]],
        b: vec![0.5, 0.5],
        embedding: None,
        order: 2,
        embedded_order: 0,
    };
    let state = StateContainer::allocate(FieldLayout::new(1, 0, 1), 50, 50).unwrap();
    for (mode, tables) in [
        (IntegrationMode::Implicit, MethodTables::implicit(ragged.clone())),
        (IntegrationMode::Explicit, MethodTables::explicit(ragged)),
    ] {
        let config = ArkodeConfig::default()
            .with_mode(mode)
            .with_fixed_step(true)
            .with_custom_table(tables);
        let mut scheme = ArkodeAdapter::new(config);
        let err = scheme.initialize(&state, 0.0).unwrap_err();
        assert!(err.is_configuration(), "{mode}: {err}");
        assert_eq!(scheme.phase(), AdapterPhase::Unconfigured);
    }
}

#[test]
fn test_undersized_vector_budget_fails_at_initialize() {
    let mut scheme = ArkodeAdapter::new(ArkodeConfig::default().with_nvectors(24));
    let state = StateContainer::allocate(FieldLayout::new(1, 0, 1), 24, 24).unwrap();
    let err = scheme.initialize(&state, 0.0).unwrap_err();
    assert!(err.is_configuration(), "{err}");
    assert_eq!(scheme.phase(), AdapterPhase::Unconfigured);

    let mut scheme = ArkodeAdapter::new(ArkodeConfig::default().with_nvectors(25));
    let state = StateContainer::allocate(FieldLayout::new(1, 0, 1), 25, 25).unwrap();
    scheme.initialize(&state, 0.0).unwrap();
    assert_eq!(scheme.stats().unwrap().steps, 0);
}

#[test]
fn test_unknown_scheme_name_is_unsupported() {
    let err = "rk4-classic".parse::<SchemeConfig>().unwrap_err();
    assert!(matches!(err, TimestepError::Unsupported(_)));
    assert!(err.is_configuration());
}

#[test]
fn test_layout_change_is_rejected() {
    for config in [SchemeConfig::Ars343, SchemeConfig::Arkode(ArkodeConfig::default())] {
        let mut scheme = config.build();
        let state = allocate(&scheme, FieldLayout::new(1, 0, 4));
        scheme.initialize(&state, 0.0).unwrap();

        let mut other = allocate(&scheme, FieldLayout::new(1, 0, 5));
        let mut rhs = LinearSplitRhs::new(-1.0, 0.0);
        let err = scheme
            .step(StepInfo::new(true, true, 0.0, 0.1), &mut other, &mut rhs)
            .unwrap_err();
        assert!(matches!(err, TimestepError::LayoutMismatch { .. }), "{}: {err}", scheme.name());
    }
}

/// Evaluator whose implicit part blows up.
struct Exploding;

impl RhsEvaluator for Exploding {
    fn explicit_rhs(&mut self, _: &StateBuffer, _: f64, tendency: &mut StateBuffer) -> atmos_ts::Result<()> {
        tendency.fill(0.0);
        Ok(())
    }

    fn implicit_rhs(&mut self, _: &StateBuffer, _: f64, tendency: &mut StateBuffer) -> atmos_ts::Result<()> {
        tendency.fill(f64::NAN);
        Ok(())
    }

    fn solve_implicit(&mut self, _: &StateBuffer, _: f64, _: f64, result: &mut StateBuffer) -> atmos_ts::Result<()> {
        result.fill(f64::INFINITY);
        Ok(())
    }
}

#[test]
fn test_failed_step_never_commits() {
    for config in [
        SchemeConfig::Ars343,
        SchemeConfig::Arkode(ArkodeConfig::default().with_fixed_step(true)),
        SchemeConfig::Arkode(ArkodeConfig::default()),
    ] {
        let mut scheme = config.build();
        let mut state = allocate(&scheme, FieldLayout::new(1, 1, 3));
        let before = state.current().clone();
        scheme.initialize(&state, 0.0).unwrap();

        let err = scheme
            .step(StepInfo::new(true, true, 0.0, 0.1), &mut state, &mut Exploding)
            .unwrap_err();
        println!("{}: {err}", scheme.name());
        assert_eq!(state.current(), &before, "{} committed a failed step", scheme.name());
    }
}
