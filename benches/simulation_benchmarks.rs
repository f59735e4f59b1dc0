//! Simulation Benchmarks
//!
//! Integrator step cost per scheme, full executor runs, and run-configuration
//! generation for a sweep.
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use montesim::prelude::*;

/// Harmonic oscillator right-hand side.
fn oscillator(_t: f64, y: &[f64], dydt: &mut [f64]) {
    for i in (0..y.len()).step_by(2) {
        dydt[i] = y[i + 1];
        dydt[i + 1] = -y[i];
    }
}

/// One integrator step per scheme and state size.
fn bench_integrator_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("Integrator_step");
    group.sample_size(100);
    group.confidence_level(0.95);

    let schemes = [
        IntegrationScheme::Euler,
        IntegrationScheme::RungeKutta2,
        IntegrationScheme::RungeKutta4,
        IntegrationScheme::AdamsBashforthMoulton4,
    ];
    for scheme in schemes {
        for size in [2usize, 6, 64] {
            let id = BenchmarkId::new(scheme.to_string(), size);
            group.bench_with_input(id, &size, |b, &size| {
                let mut integrator = Integrator::new(scheme, size);
                let mut y: Vec<f64> = (0..size).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
                let mut t = 0.0;
                b.iter(|| {
                    if let Ok(next) = integrator.step(t, 0.001, &y, &oscillator) {
                        y = next;
                    }
                    t += 0.001;
                    black_box(&y)
                });
            });
        }
    }

    group.finish();
}

/// Whole runs of the bundled models.
fn bench_executor_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("Executor_run");
    group.sample_size(20);

    let executor = RunExecutor::new(Arc::new(ModelCatalog::builtin()));
    let cases = [
        ("msd_rk4", RunConfig::new(RunId(0), "msd").with_dt(0.001).with_terminate_time(1.0)),
        (
            "baseball_abm",
            RunConfig::new(RunId(0), "baseball")
                .with_integrator(IntegrationScheme::AdamsBashforthMoulton4, Some(6))
                .with_dt(0.01)
                .with_terminate_time(10.0)
                .with_binding(Binding::literal("dyn.baseball.vel[0]", 30.0))
                .with_binding(Binding::literal("dyn.baseball.vel[2]", 30.0)),
        ),
    ];
    for (name, config) in cases {
        group.bench_function(name, |b| {
            b.iter(|| black_box(executor.execute(&config)));
        });
    }

    group.finish();
}

/// Expanding a template into per-run configurations.
fn bench_generate_run_configs(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sweep_generate");
    group.sample_size(50);

    for runs in [70usize, 1000] {
        let config = SweepConfig::builder("baseball")
            .runs(runs)
            .slave("localhost")
            .integrator(IntegrationScheme::RungeKutta4, Some(6))
            .variable(
                "dyn.baseball.theta",
                Some("deg"),
                RuleSpec::Gaussian {
                    mean: 45.0,
                    std_dev: 5.0,
                    min: None,
                    max: None,
                },
            )
            .variable(
                "dyn.baseball.omega0",
                Some("rad/s"),
                RuleSpec::Uniform {
                    min: 0.0,
                    max: 200.0,
                },
            )
            .build();
        let Ok(config) = config else { continue };
        let Ok(sweep) = config.into_monte_carlo(Arc::new(ModelCatalog::builtin()), false) else {
            continue;
        };

        group.bench_with_input(BenchmarkId::new("runs", runs), &runs, |b, _| {
            b.iter(|| black_box(sweep.generate_run_configs()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_integrator_step,
    bench_executor_run,
    bench_generate_run_configs,
);
criterion_main!(benches);
