//! Benchmarks for one step of each scheme.
//!
//! Run with: `cargo bench --bench time_stepping_bench`
//!
//! Measures the per-step cost of the fixed-step schemes and of one adaptive
//! step call over a range of state sizes, with the linear split problem as
//! the tendency.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use atmos_ts::rhs::LinearSplitRhs;
use atmos_ts::state::{FieldLayout, StateContainer};
use atmos_ts::time::{ArkodeConfig, BoxedScheme, SchemeConfig, StepInfo};

/// Five components and two tracers, the shape of a dry dynamical core.
fn layout(n_points: usize) -> FieldLayout {
    FieldLayout::new(5, 2, n_points)
}

fn setup(config: &SchemeConfig, n_points: usize) -> (BoxedScheme, StateContainer) {
    let mut scheme = config.build();
    let mut state = StateContainer::allocate(
        layout(n_points),
        scheme.component_data_instances(),
        scheme.tracer_data_instances(),
    )
    .expect("allocation");
    for (i, v) in state.current_mut().values_mut().enumerate() {
        *v = 1.0 + 1e-3 * (i % 101) as f64;
    }
    scheme.initialize(&state, 0.0).expect("initialize");
    (scheme, state)
}

/// Benchmark a single fixed step.
fn bench_fixed_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixed_step");

    for n_points in [1_000, 10_000, 100_000] {
        for config in [SchemeConfig::ForwardEuler, SchemeConfig::SspRk3, SchemeConfig::Ars343] {
            let (mut scheme, mut state) = setup(&config, n_points);
            let mut rhs = LinearSplitRhs::new(-1.0, -50.0);

            group.bench_with_input(
                BenchmarkId::new(config.name(), format!("{n_points}_points")),
                &n_points,
                |b, _| {
                    b.iter(|| {
                        scheme
                            .step(StepInfo::new(false, false, 0.0, black_box(1e-3)), &mut state, &mut rhs)
                            .expect("step");
                    })
                },
            );
        }
    }

    group.finish();
}

/// Benchmark one adaptive call, restarted from the same time every iteration.
fn bench_adaptive_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("adaptive_step");
    group.sample_size(20);

    for n_points in [1_000, 10_000] {
        for (name, config) in [
            ("imex_newton", ArkodeConfig::default().with_tolerances(1e-6, 1e-10)),
            ("imex_fixed_point", ArkodeConfig::default().with_fixed_point(1).with_iterations(10, 5)),
            ("imex_fixed_dt", ArkodeConfig::default().with_fixed_step(true)),
        ] {
            let (mut scheme, mut state) = setup(&SchemeConfig::Arkode(config), n_points);
            let mut rhs = LinearSplitRhs::new(-1.0, -5.0);

            group.bench_with_input(
                BenchmarkId::new(name, format!("{n_points}_points")),
                &n_points,
                |b, _| {
                    b.iter(|| {
                        scheme
                            .step(StepInfo::new(false, false, 0.0, black_box(1e-2)), &mut state, &mut rhs)
                            .expect("step");
                    })
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_fixed_step, bench_adaptive_step);
criterion_main!(benches);
