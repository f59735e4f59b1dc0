//! Resuming runs from checkpoints.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use montesim::engine::RecordSpec;
use montesim::prelude::*;

fn executor() -> RunExecutor {
    RunExecutor::new(Arc::new(ModelCatalog::builtin()))
}

fn baseball(scheme: IntegrationScheme) -> RunConfig {
    RunConfig::new(RunId(3), "baseball")
        .with_integrator(scheme, Some(6))
        .with_dt(0.01)
        .with_terminate_time(4.0)
        .with_checkpoint_period(1.0)
        .with_binding(Binding::literal("dyn.baseball.vel[0]", 25.0))
        .with_binding(Binding::literal("dyn.baseball.vel[2]", 25.0))
        .with_binding(Binding::literal("dyn.baseball.omega0", 60.0))
        .with_record(RecordSpec {
            period: 0.25,
            variables: vec!["dyn.baseball.pos[2]".to_string()],
        })
}

#[test]
fn test_every_checkpoint_resumes_to_same_end() {
    for scheme in [
        IntegrationScheme::RungeKutta4,
        IntegrationScheme::AdamsBashforthMoulton4,
    ] {
        let config = baseball(scheme);
        let full = executor().execute(&config);
        assert!(full.is_completed(), "{scheme}: {}", full.status);
        assert_eq!(full.checkpoints.len(), 4);

        for checkpoint in &full.checkpoints {
            assert!(checkpoint.verify());
            let resumed = executor().resume(&config, checkpoint);
            assert!(resumed.is_completed());
            assert_eq!(resumed.steps, full.steps, "{scheme} from {}", checkpoint.time);
            assert_eq!(resumed.final_values, full.final_values);
            assert_eq!(resumed.trajectories, full.trajectories);
        }
    }
}

#[test]
fn test_checkpoint_times_are_periodic() {
    let full = executor().execute(&baseball(IntegrationScheme::RungeKutta4));
    let times: Vec<f64> = full
        .checkpoints
        .iter()
        .map(|c| c.time.as_secs_f64())
        .collect();
    assert_eq!(times, vec![1.0, 2.0, 3.0, 4.0]);
    assert!(full.checkpoints.iter().all(|c| c.run_id == RunId(3)));
}

#[test]
fn test_tampered_checkpoint_rejected() {
    let config = baseball(IntegrationScheme::RungeKutta4);
    let full = executor().execute(&config);
    let mut checkpoint = full.checkpoints[1].clone();
    if let Some(byte) = checkpoint.data.last_mut() {
        *byte ^= 0xff;
    }
    assert!(!checkpoint.verify());

    let resumed = executor().resume(&config, &checkpoint);
    assert!(matches!(resumed.status, RunStatus::Failed { reason } if reason.contains("integrity")));
}

#[test]
fn test_checkpoint_of_other_run_rejected() {
    let config = baseball(IntegrationScheme::RungeKutta4);
    let full = executor().execute(&config);
    let mut other = config.clone();
    other.run_id = RunId(4);

    let resumed = executor().resume(&other, &full.checkpoints[0]);
    assert!(matches!(resumed.status, RunStatus::Failed { reason } if reason.contains("run#3")));
}
