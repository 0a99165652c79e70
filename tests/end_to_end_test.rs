//! End-to-end runs of the IMEX schemes against exact solutions.

use atmos_ts::ark::{IntegrationMode, table_id};
use atmos_ts::model::{Model, SimulationConfig};
use atmos_ts::rhs::LinearSplitRhs;
use atmos_ts::state::{FieldLayout, StateContainer};
use atmos_ts::time::{
    AdapterPhase, ArkodeAdapter, ArkodeConfig, Ars343, SchemeConfig, StepInfo, TimestepScheme,
};

fn scalar_state(scheme: &dyn TimestepScheme) -> StateContainer {
    let mut state = StateContainer::allocate(
        FieldLayout::new(1, 0, 1),
        scheme.component_data_instances(),
        scheme.tracer_data_instances(),
    )
    .unwrap();
    state.current_mut().fill(1.0);
    state
}

#[test]
fn test_ars343_single_step_decay() {
    let mut scheme = Ars343::new();
    let mut state = scalar_state(&scheme);
    let mut rhs = LinearSplitRhs::new(-1.0, 0.0);

    scheme.initialize(&state, 0.0).unwrap();
    scheme
        .step(StepInfo::new(true, true, 0.0, 0.1), &mut state, &mut rhs)
        .unwrap();

    let y = state.current().components[0];
    assert!((y - (-0.1_f64).exp()).abs() < 1e-6, "y = {y}");
    assert!((y - 0.904_837).abs() < 1e-6);
}

#[test]
fn test_arkode_implicit_mode_to_unit_time() {
    let config = ArkodeConfig::default()
        .with_mode(IntegrationMode::Implicit)
        .with_tolerances(1e-8, 1e-8)
        .with_max_steps(5000);
    let mut scheme = ArkodeAdapter::new(config);
    let mut state = scalar_state(&scheme);
    let mut rhs = LinearSplitRhs::new(-1.0, 0.0);

    scheme.initialize(&state, 0.0).unwrap();
    assert_eq!(scheme.phase(), AdapterPhase::Initialized);
    scheme
        .step(StepInfo::new(true, true, 0.0, 1.0), &mut state, &mut rhs)
        .unwrap();

    let err = (state.current().components[0] - (-1.0_f64).exp()).abs();
    assert!(err < 1e-6, "error {err:.3e}");
    let stats = scheme.stats().unwrap();
    println!("implicit ARK: {stats:?}");
    assert!(stats.steps > 1);
    assert!(stats.nonlinear_iterations >= stats.steps);
}

#[test]
fn test_arkode_imex_through_model() {
    let config = ArkodeConfig::default().with_tolerances(1e-7, 1e-10);
    let scheme = SchemeConfig::Arkode(config).build();
    let rhs = LinearSplitRhs::new(-0.5, -20.0);
    let mut model = Model::new(FieldLayout::new(2, 1, 8), scheme, rhs).unwrap();
    model.state_mut().current_mut().fill(2.0);

    let stats = model.run(&SimulationConfig::new(0.0, 0.5, 0.05)).unwrap();
    assert_eq!(stats.n_steps, 10);
    assert!(stats.evaluations.explicit > 0);
    assert!(stats.evaluations.implicit > 0);

    let exact = model.evaluator().exact(2.0, 0.5);
    let error = model
        .state()
        .current()
        .values()
        .map(|&y| (y - exact).abs())
        .fold(0.0, f64::max);
    assert!(error < 1e-6, "error {error:.3e}");
}

#[test]
fn test_arkode_explicit_mode_with_named_table() {
    let config = ArkodeConfig::default()
        .with_mode(IntegrationMode::Explicit)
        .with_table_id(table_id::BOGACKI_SHAMPINE_4_2_3)
        .with_tolerances(1e-8, 1e-12);
    let mut model = Model::new(
        FieldLayout::new(1, 0, 2),
        Box::new(ArkodeAdapter::new(config)),
        LinearSplitRhs::new(-1.0, -1.0),
    )
    .unwrap();
    model.state_mut().current_mut().fill(1.0);
    model.run(&SimulationConfig::new(0.0, 1.0, 0.25)).unwrap();

    let y = model.state().current().components[1];
    assert!((y - (-2.0_f64).exp()).abs() < 1e-6);
    // Explicit mode routes the whole tendency through the full RHS
    assert_eq!(model.evaluator().counts().explicit, model.evaluator().counts().implicit);
}

#[test]
fn test_arkode_fixed_point_with_anderson() {
    let config = ArkodeConfig::default()
        .with_fixed_point(1)
        .with_iterations(10, 5)
        .with_tolerances(1e-7, 1e-10);
    let mut model = Model::new(
        FieldLayout::new(1, 0, 3),
        Box::new(ArkodeAdapter::new(config)),
        LinearSplitRhs::new(-1.0, -0.5),
    )
    .unwrap();
    model.state_mut().current_mut().fill(1.0);
    model.run(&SimulationConfig::new(0.0, 1.0, 0.1)).unwrap();

    let y = model.state().current().components[0];
    assert!((y - (-1.5_f64).exp()).abs() < 1e-5, "y = {y}");
}

#[test]
fn test_ars343_and_arkode_fixed_step_agree() {
    // The ARS343 tables run through the adaptive stepper with fixed steps
    // reproduce the hand-coded scheme.
    let dt = 0.05;
    let rhs_rates = (-1.0, -4.0);

    let mut reference = Model::new(
        FieldLayout::new(1, 0, 1),
        Box::new(Ars343::new()),
        LinearSplitRhs::new(rhs_rates.0, rhs_rates.1),
    )
    .unwrap();
    reference.state_mut().current_mut().fill(1.0);
    reference.run(&SimulationConfig::new(0.0, 0.5, dt)).unwrap();

    let config = ArkodeConfig::default()
        .with_fixed_step(true)
        .with_custom_table(Ars343::method_tables())
        .with_tolerances(1e-10, 1e-14);
    let mut adaptive = Model::new(
        FieldLayout::new(1, 0, 1),
        Box::new(ArkodeAdapter::new(config)),
        LinearSplitRhs::new(rhs_rates.0, rhs_rates.1),
    )
    .unwrap();
    adaptive.state_mut().current_mut().fill(1.0);
    adaptive.run(&SimulationConfig::new(0.0, 0.5, dt)).unwrap();

    let a = reference.state().current().components[0];
    let b = adaptive.state().current().components[0];
    assert!((a - b).abs() < 1e-8, "ars343 {a} vs fixed-step ark {b}");
}
