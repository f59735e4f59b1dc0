//! Run Executor.
//!
//! Drives one run from its [`RunConfig`] to a [`RunResult`]:
//!
//! ```text
//! Initializing ──▶ Running ──▶ Completed
//!       │             │
//!       └─────────────┴──────▶ Failed
//! ```
//!
//! Initializing resolves the model, applies bindings and builds the
//! integrator. Running fires due events, then steps toward the earlier of the
//! next event and the terminate time, so steps land exactly on event times.
//! Events scheduled at the terminate time still fire.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::engine::clock::SimClock;
use crate::engine::jidoka::JidokaGuard;
use crate::engine::run::{FiredEvent, RunConfig, RunResult, RunStatus, Sample};
use crate::engine::scheduler::{
    EventAction, EventScheduler, ScheduleEvent, SchedulerSnapshot, Trigger,
};
use crate::engine::state::{SimState, Slot};
use crate::engine::SimTime;
use crate::error::{SimError, SimResult};
use crate::integration::{DerivativeHistory, IntegrationScheme, Integrator};
use crate::models::{Dynamics, ModelCatalog};
use crate::registry::{Expr, StateContext, VariableHandle, VariableRegistry};
use crate::replay::RunCheckpoint;

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorPhase {
    /// Resolving the model and applying bindings.
    Initializing,
    /// Stepping.
    Running,
    /// Reached terminate time.
    Completed,
    /// Stopped on an error.
    Failed,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared cooperative cancellation signal.
///
/// The executor polls it between steps; async holders can await it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelInner>,
}

impl CancelFlag {
    /// New, not-cancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Executes runs against a model catalog.
#[derive(Debug, Clone)]
pub struct RunExecutor {
    catalog: Arc<ModelCatalog>,
    pacing: bool,
    cancel: CancelFlag,
}

impl RunExecutor {
    /// Create an executor without pacing.
    #[must_use]
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self {
            catalog,
            pacing: false,
            cancel: CancelFlag::new(),
        }
    }

    /// Honor `freeze_frame` by sleeping between steps.
    #[must_use]
    pub const fn with_pacing(mut self, pacing: bool) -> Self {
        self.pacing = pacing;
        self
    }

    /// Use `cancel` as this executor's cancellation signal.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Model catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    /// Cancellation signal checked between steps.
    #[must_use]
    pub const fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Run `config` to completion.
    ///
    /// Errors never escape: they become a `Failed` result.
    #[must_use]
    pub fn execute(&self, config: &RunConfig) -> RunResult {
        let span = tracing::debug_span!("run", run_id = config.run_id.0, model = %config.model);
        let _enter = span.enter();
        let started = Instant::now();

        let outcome = Session::start(self, config)
            .map_err(Failure::from)
            .and_then(Session::run);
        finish(config, outcome, started)
    }

    /// Continue a run from one of its checkpoints.
    #[must_use]
    pub fn resume(&self, config: &RunConfig, checkpoint: &RunCheckpoint) -> RunResult {
        let span = tracing::debug_span!("resume", run_id = config.run_id.0, at = %checkpoint.time);
        let _enter = span.enter();
        let started = Instant::now();

        let outcome = Session::restore(self, config, checkpoint).and_then(Session::run);
        finish(config, outcome, started)
    }
}

fn finish(config: &RunConfig, outcome: Result<RunResult, Failure>, started: Instant) -> RunResult {
    let mut result = match outcome {
        Ok(result) => {
            debug!(phase = ?ExecutorPhase::Completed, steps = result.steps, "run finished");
            result
        }
        Err(Failure { error, partial }) => {
            if error.is_numeric_fault() {
                info!(phase = ?ExecutorPhase::Failed, error = %error, "run stopped on a numeric fault");
            } else {
                warn!(phase = ?ExecutorPhase::Failed, error = %error, "run failed");
            }
            let mut result = partial.unwrap_or_else(|| RunResult::failed(config.run_id, ""));
            result.status = RunStatus::Failed {
                reason: error.to_string(),
            };
            result
        }
    };
    result.wall_secs = started.elapsed().as_secs_f64();
    result
}

/// Error plus whatever the run produced before it.
struct Failure {
    error: SimError,
    partial: Option<RunResult>,
}

impl From<SimError> for Failure {
    fn from(error: SimError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

/// Everything a checkpoint needs to continue a run.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointPayload {
    scheme: IntegrationScheme,
    state: SimState,
    history: DerivativeHistory,
    scheduler: SchedulerSnapshot,
    trajectories: IndexMap<String, Vec<Sample>>,
    fired: Vec<FiredEvent>,
}

/// Compiled form of an event action.
enum Action {
    Log(Vec<(String, VariableHandle)>),
    Assign { target: VariableHandle, expr: Expr },
    Record,
    Checkpoint,
}

struct Session<'a> {
    executor: &'a RunExecutor,
    config: &'a RunConfig,
    model: Arc<dyn Dynamics>,
    registry: VariableRegistry,
    state: SimState,
    integrator: Integrator,
    events: EventScheduler,
    actions: Vec<Action>,
    clock: SimClock,
    guard: JidokaGuard,
    terminate: SimTime,
    recorded: Vec<(String, VariableHandle)>,
    trajectories: IndexMap<String, Vec<Sample>>,
    fired: Vec<FiredEvent>,
    checkpoints: Vec<RunCheckpoint>,
    pace_mark: Option<Instant>,
}

impl<'a> Session<'a> {
    /// Initializing phase for a fresh run.
    fn start(executor: &'a RunExecutor, config: &'a RunConfig) -> SimResult<Self> {
        debug!(phase = ?ExecutorPhase::Initializing, scheme = %config.scheme, "setting up run");
        let (model, mut registry, mut state) = declare(executor, config)?;

        for binding in &config.bindings {
            registry.bind_name(&binding.name, &binding.value, binding.unit.as_deref())?;
        }
        registry.apply_bindings(&mut state)?;

        let mut events = EventScheduler::new();
        for event in &config.events {
            events.register(event.clone())?;
        }
        if let Some(record) = &config.record {
            events.register(ScheduleEvent::new(
                Trigger::Every {
                    period: positive_time(record.period, "record period")?,
                    offset: SimTime::ZERO,
                },
                EventAction::Record,
            ))?;
        }
        if let Some(period) = config.checkpoint_period {
            events.register(ScheduleEvent::new(
                Trigger::every(positive_time(period, "checkpoint period")?),
                EventAction::Checkpoint,
            ))?;
        }

        let integrator = Integrator::new(
            config.scheme,
            config.state_size.unwrap_or_else(|| state.state_len()),
        );
        Self::assemble(executor, config, model, registry, state, integrator, events)
    }

    /// Initializing phase for a resumed run.
    fn restore(
        executor: &'a RunExecutor,
        config: &'a RunConfig,
        checkpoint: &RunCheckpoint,
    ) -> Result<Self, Failure> {
        if checkpoint.run_id != config.run_id {
            return Err(SimError::config(format!(
                "checkpoint belongs to {}, not {}",
                checkpoint.run_id, config.run_id
            ))
            .into());
        }
        let payload: CheckpointPayload = checkpoint.restore()?;
        let (model, mut registry, mut scratch) = declare(executor, config)?;

        // Re-apply bindings so calculated overrides match the original run.
        for binding in &config.bindings {
            registry.bind_name(&binding.name, &binding.value, binding.unit.as_deref())?;
        }
        registry.apply_bindings(&mut scratch)?;

        let mut integrator = Integrator::new(
            payload.scheme,
            config.state_size.unwrap_or_else(|| scratch.state_len()),
        );
        integrator.select(config.scheme)?;
        integrator.restore_history(payload.history);

        let events = EventScheduler::restore(payload.scheduler);
        let mut session =
            Self::assemble(executor, config, model, registry, payload.state, integrator, events)?;
        session.clock.restore(checkpoint.time, checkpoint.step);
        session.trajectories = payload.trajectories;
        session.fired = payload.fired;
        Ok(session)
    }

    fn assemble(
        executor: &'a RunExecutor,
        config: &'a RunConfig,
        model: Arc<dyn Dynamics>,
        registry: VariableRegistry,
        state: SimState,
        integrator: Integrator,
        events: EventScheduler,
    ) -> SimResult<Self> {
        if integrator.size() != state.state_len() {
            return Err(SimError::StateSizeMismatch {
                expected: integrator.size(),
                found: state.state_len(),
            });
        }

        let actions = events
            .events()
            .iter()
            .map(|event| compile_action(&registry, &event.action))
            .collect::<SimResult<Vec<_>>>()?;

        let recorded = config
            .record
            .iter()
            .flat_map(|r| r.variables.iter())
            .map(|name| registry.resolve(name).map(|h| (name.clone(), h)))
            .collect::<SimResult<Vec<_>>>()?;
        let trajectories = recorded
            .iter()
            .map(|(name, _)| (name.clone(), Vec::new()))
            .collect();

        let mut guard = JidokaGuard::new();
        guard.check(&state, &registry)?;

        Ok(Self {
            executor,
            config,
            model,
            registry,
            state,
            integrator,
            events,
            actions,
            clock: SimClock::new(config.dt)?,
            guard,
            terminate: SimTime::try_from_secs(config.terminate_time)?,
            recorded,
            trajectories,
            fired: Vec::new(),
            checkpoints: Vec::new(),
            pace_mark: None,
        })
    }

    /// Running phase.
    fn run(mut self) -> Result<RunResult, Failure> {
        debug!(phase = ?ExecutorPhase::Running, terminate = %self.terminate, "running");
        match self.step_loop() {
            Ok(()) => Ok(self.into_result(RunStatus::Completed)),
            Err(error) => {
                let partial = self.into_result(RunStatus::Failed {
                    reason: error.to_string(),
                });
                Err(Failure {
                    error,
                    partial: Some(partial),
                })
            }
        }
    }

    fn step_loop(&mut self) -> SimResult<()> {
        loop {
            self.fire_due()?;

            let now = self.clock.current_time();
            if now >= self.terminate {
                return Ok(());
            }
            if self.executor.cancel.is_cancelled() {
                return Err(SimError::Cancelled);
            }

            let target = self
                .events
                .next_event_time()
                .map_or(self.terminate, |t| t.min(self.terminate));
            let h = self.clock.step_toward(target);
            self.step(now, h)?;
            self.pace();
        }
    }

    fn step(&mut self, now: SimTime, h: u64) -> SimResult<()> {
        let t = now.as_secs_f64();
        let dt = SimTime::from_nanos(h).as_secs_f64();

        let next = {
            let params = self.state.parameters();
            let model = &self.model;
            let rhs = |t: f64, y: &[f64], dydt: &mut [f64]| model.derivatives(t, y, params, dydt);
            self.integrator.step(t, dt, self.state.continuous(), &rhs)
        }
        .map_err(|e| self.name_state_fault(e))?;

        self.state.set_continuous(next)?;
        self.state.time = self.clock.advance(h);
        self.events.advance_horizon(self.state.time);
        self.guard.check(&self.state, &self.registry)
    }

    /// Replace `state[i]` in an integrator fault with the variable name.
    fn name_state_fault(&self, error: SimError) -> SimError {
        match error {
            SimError::NonFiniteState { location, time } => {
                let name = location
                    .strip_prefix("state[")
                    .and_then(|s| s.strip_suffix(']'))
                    .and_then(|s| s.parse::<usize>().ok())
                    .and_then(|i| self.registry.slot_name(Slot::State(i)))
                    .map_or(location.clone(), str::to_string);
                SimError::NonFiniteState {
                    location: name,
                    time,
                }
            }
            other => other,
        }
    }

    fn fire_due(&mut self) -> SimResult<()> {
        let now = self.clock.current_time();
        while let Some((time, index)) = self.events.pop_due(now) {
            let action = self
                .actions
                .get(index)
                .ok_or_else(|| SimError::config(format!("no action for event {index}")))?;
            match action {
                Action::Log(variables) => {
                    let mut values = IndexMap::new();
                    for (name, handle) in variables {
                        values.insert(name.clone(), self.registry.read(*handle, &self.state)?);
                    }
                    info!(run_id = self.config.run_id.0, time = %time, values = ?values, "read");
                    self.push_fired(time, index, values);
                }
                Action::Assign { target, expr } => {
                    let value = expr.eval(&StateContext::new(&self.registry, &self.state))?;
                    self.registry.write(*target, value, &mut self.state)?;
                    debug!(time = %time, expression = %expr, value, "assign");
                    self.push_fired(time, index, IndexMap::new());
                    self.guard.check(&self.state, &self.registry)?;
                }
                Action::Record => {
                    let secs = time.as_secs_f64();
                    for (name, handle) in &self.recorded {
                        let value = self.registry.read(*handle, &self.state)?;
                        if let Some(samples) = self.trajectories.get_mut(name) {
                            samples.push(Sample { time: secs, value });
                        }
                    }
                }
                Action::Checkpoint => {
                    let checkpoint = self.checkpoint()?;
                    debug!(time = %time, bytes = checkpoint.compressed_size(), "checkpoint");
                    self.checkpoints.push(checkpoint);
                }
            }
        }
        Ok(())
    }

    fn push_fired(&mut self, time: SimTime, index: usize, values: IndexMap<String, f64>) {
        if let Some(event) = self.events.event(index) {
            self.fired.push(FiredEvent {
                time,
                action: event.action.clone(),
                values,
            });
        }
    }

    fn checkpoint(&self) -> SimResult<RunCheckpoint> {
        let payload = CheckpointPayload {
            scheme: self.integrator.scheme(),
            state: self.state.clone(),
            history: self.integrator.history().clone(),
            scheduler: self.events.snapshot(),
            trajectories: self.trajectories.clone(),
            fired: self.fired.clone(),
        };
        RunCheckpoint::create(
            self.config.run_id,
            self.clock.current_time(),
            self.clock.step_count(),
            &payload,
        )
    }

    /// Cap the wall-clock rate at one step per freeze-frame interval.
    fn pace(&mut self) {
        let Some(interval) = self.config.freeze_frame.filter(|_| self.executor.pacing) else {
            return;
        };
        let Ok(interval) = Duration::try_from_secs_f64(interval) else {
            return;
        };
        if let Some(mark) = self.pace_mark {
            let elapsed = mark.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.pace_mark = Some(Instant::now());
    }

    fn into_result(self, status: RunStatus) -> RunResult {
        let final_values = self.registry.snapshot(&self.state).unwrap_or_default();
        RunResult {
            run_id: self.config.run_id,
            status,
            end_time: self.clock.current_time(),
            steps: self.clock.step_count(),
            final_values,
            trajectories: self.trajectories,
            events: self.fired,
            checkpoints: self.checkpoints,
            slave: None,
            attempts: 0,
            wall_secs: 0.0,
        }
    }
}

/// Resolve the model and declare its variables.
fn declare(
    executor: &RunExecutor,
    config: &RunConfig,
) -> SimResult<(Arc<dyn Dynamics>, VariableRegistry, SimState)> {
    let model = executor.catalog.get(&config.model)?;
    let mut registry = VariableRegistry::new();
    model.declare(&mut registry)?;
    let state = registry.instantiate();
    Ok((model, registry, state))
}

fn compile_action(registry: &VariableRegistry, action: &EventAction) -> SimResult<Action> {
    Ok(match action {
        EventAction::Log { variables } => Action::Log(
            variables
                .iter()
                .map(|name| registry.resolve(name).map(|h| (name.clone(), h)))
                .collect::<SimResult<_>>()?,
        ),
        EventAction::Assign {
            variable,
            expression,
        } => Action::Assign {
            target: registry.resolve(variable)?,
            expr: registry.compile(expression)?,
        },
        EventAction::Record => Action::Record,
        EventAction::Checkpoint => Action::Checkpoint,
    })
}

fn positive_time(secs: f64, what: &str) -> SimResult<SimTime> {
    let time = SimTime::try_from_secs(secs)?;
    if time == SimTime::ZERO {
        return Err(SimError::config(format!("{what} must be positive")));
    }
    Ok(time)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::engine::run::{Binding, RecordSpec, RunId};

    fn executor() -> RunExecutor {
        RunExecutor::new(Arc::new(ModelCatalog::builtin()))
    }

    fn baseball(run: u64) -> RunConfig {
        RunConfig::new(RunId(run), "baseball")
            .with_integrator(IntegrationScheme::RungeKutta4, Some(6))
            .with_terminate_time(10.0)
            .with_binding(Binding::literal("dyn.baseball.vel[0]", 43.30))
            .with_binding(Binding::literal("dyn.baseball.vel[2]", 25.0))
            .with_binding(Binding::literal("dyn.baseball.theta", -90.0).with_unit("d"))
            .with_binding(Binding::literal("dyn.baseball.phi", 1.0).with_unit("d"))
            .with_binding(Binding::literal("dyn.baseball.omega0", 30.0).with_unit("rev/s"))
    }

    fn read_every(period: f64, variables: &[&str]) -> ScheduleEvent {
        ScheduleEvent::new(
            Trigger::every(SimTime::from_secs(period)),
            EventAction::Log {
                variables: variables.iter().map(|s| (*s).to_string()).collect(),
            },
        )
    }

    #[test]
    fn test_baseball_run_completes() {
        let result = executor().execute(&baseball(0));
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.end_time, SimTime::from_secs(10.0));
        assert_eq!(result.steps, 1000);
        let omega = result.final_value("dyn.baseball.omega0").unwrap();
        assert!((omega - 60.0 * std::f64::consts::PI).abs() < 1e-9);
        assert!(result.final_value("dyn.baseball.pos[0]").unwrap() > 0.0);
    }

    #[test]
    fn test_identical_configs_identical_results() {
        let a = executor().execute(&baseball(0));
        let b = executor().execute(&baseball(0));
        assert_eq!(a.final_values, b.final_values);
    }

    #[test]
    fn test_periodic_read_fires_on_schedule() {
        let config = RunConfig::new(RunId(0), "msd")
            .with_integrator(IntegrationScheme::AdamsBashforthMoulton4, None)
            .with_dt(0.1)
            .with_terminate_time(300.0)
            .with_freeze_frame(0.10)
            .with_event(read_every(55.0, &["msd.x", "msd.v"]));

        let result = executor().execute(&config);
        assert!(result.is_completed(), "{}", result.status);
        let times: Vec<f64> = result.events.iter().map(|e| e.time.as_secs_f64()).collect();
        assert_eq!(times, vec![55.0, 110.0, 165.0, 220.0, 275.0]);
        assert_eq!(result.events[0].values.len(), 2);
        assert_eq!(result.steps, 3000);
    }

    #[test]
    fn test_event_at_terminate_fires() {
        let config = RunConfig::new(RunId(0), "msd")
            .with_terminate_time(1.0)
            .with_event(ScheduleEvent::new(
                Trigger::At(SimTime::from_secs(1.0)),
                EventAction::Log {
                    variables: vec!["msd.x".to_string()],
                },
            ));
        let result = executor().execute(&config);
        assert_eq!(result.events.len(), 1);
    }

    #[test]
    fn test_steps_shorten_to_land_on_events() {
        let config = RunConfig::new(RunId(0), "msd")
            .with_dt(0.3)
            .with_terminate_time(1.0)
            .with_event(ScheduleEvent::new(
                Trigger::At(SimTime::from_secs(0.5)),
                EventAction::Log {
                    variables: vec!["msd.x".to_string()],
                },
            ));
        let result = executor().execute(&config);
        // 0.3, 0.5 (event), 0.8, 1.0 (terminate)
        assert_eq!(result.steps, 4);
        assert_eq!(result.events[0].time, SimTime::from_secs(0.5));
    }

    #[test]
    fn test_state_size_mismatch_fails_run() {
        let config = baseball(0).with_integrator(IntegrationScheme::RungeKutta4, Some(4));
        let result = executor().execute(&config);
        match result.status {
            RunStatus::Failed { reason } => assert!(reason.contains("integrator expects 4")),
            other => panic!("unexpected status {other}"),
        }
    }

    #[test]
    fn test_unknown_binding_fails_run() {
        let config = baseball(0).with_binding(Binding::literal("dyn.baseball.pos[7]", 1.0));
        let result = executor().execute(&config);
        assert!(matches!(result.status, RunStatus::Failed { reason } if reason.contains("pos[7]")));
    }

    #[test]
    fn test_non_finite_state_fails_with_variable_name() {
        let config = RunConfig::new(RunId(5), "msd")
            .with_integrator(IntegrationScheme::Euler, None)
            .with_binding(Binding::literal("msd.m", 0.0))
            .with_terminate_time(1.0);
        let result = executor().execute(&config);
        match result.status {
            RunStatus::Failed { reason } => assert!(reason.contains("msd.v"), "{reason}"),
            other => panic!("unexpected status {other}"),
        }
        assert_eq!(result.steps, 0);
    }

    #[test]
    fn test_assign_event_writes_parameter() {
        let config = RunConfig::new(RunId(0), "msd")
            .with_terminate_time(2.0)
            .with_binding(Binding::literal("msd.k", 0.0))
            .with_event(ScheduleEvent::new(
                Trigger::At(SimTime::from_secs(1.0)),
                EventAction::Assign {
                    variable: "msd.F".to_string(),
                    expression: "2 * msd.m * t".to_string(),
                },
            ));
        let result = executor().execute(&config);
        assert!(result.is_completed());
        assert_eq!(result.final_value("msd.F"), Some(2.0));
        // a = 2 for one second from rest: v = 2
        assert!((result.final_value("msd.v").unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_assign_to_calculated_fails() {
        let config = RunConfig::new(RunId(0), "msd").with_event(ScheduleEvent::new(
            Trigger::At(SimTime::from_secs(0.5)),
            EventAction::Assign {
                variable: "msd.energy".to_string(),
                expression: "1".to_string(),
            },
        ));
        assert!(!executor().execute(&config).is_completed());
    }

    #[test]
    fn test_record_samples_trajectory() {
        let config = RunConfig::new(RunId(0), "msd")
            .with_terminate_time(1.0)
            .with_record(RecordSpec {
                period: 0.25,
                variables: vec!["msd.x".to_string(), "msd.energy".to_string()],
            });
        let result = executor().execute(&config);
        let x = &result.trajectories["msd.x"];
        let times: Vec<f64> = x.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(x[0].value, 1.0);
        assert_eq!(result.trajectories["msd.energy"].len(), 5);
    }

    #[test]
    fn test_cancelled_run_fails() {
        let executor = executor();
        executor.cancel_flag().cancel();
        let result = executor.execute(&baseball(0));
        assert_eq!(
            result.status,
            RunStatus::Failed {
                reason: "cancelled".to_string()
            }
        );
    }

    #[test]
    fn test_pacing_does_not_change_results() {
        let config = RunConfig::new(RunId(0), "msd")
            .with_dt(0.1)
            .with_terminate_time(0.5)
            .with_freeze_frame(0.01);
        let plain = executor().execute(&config);
        let paced = executor().with_pacing(true).execute(&config);
        assert_eq!(plain.final_values, paced.final_values);
        assert!(paced.wall_secs >= 0.04);
    }

    #[test]
    fn test_resume_matches_uninterrupted_run() {
        let config = RunConfig::new(RunId(9), "msd")
            .with_integrator(IntegrationScheme::AdamsBashforthMoulton4, None)
            .with_dt(0.05)
            .with_terminate_time(3.0)
            .with_checkpoint_period(1.0)
            .with_record(RecordSpec {
                period: 0.5,
                variables: vec!["msd.x".to_string()],
            });
        let full = executor().execute(&config);
        assert!(full.is_completed());
        assert_eq!(full.checkpoints.len(), 3);

        let resumed = executor().resume(&config, &full.checkpoints[0]);
        assert!(resumed.is_completed());
        assert_eq!(resumed.final_values, full.final_values);
        assert_eq!(resumed.trajectories, full.trajectories);
        assert_eq!(resumed.steps, full.steps);
    }

    #[test]
    fn test_resume_rejects_scheme_switch() {
        let config = RunConfig::new(RunId(0), "msd")
            .with_terminate_time(2.0)
            .with_checkpoint_period(1.0);
        let full = executor().execute(&config);
        let switched = config
            .clone()
            .with_integrator(IntegrationScheme::AdamsBashforthMoulton4, None);
        let result = executor().resume(&switched, &full.checkpoints[0]);
        assert!(matches!(result.status, RunStatus::Failed { reason } if reason.contains("switch")));
    }

    #[tokio::test]
    async fn test_cancel_flag_wakes_waiters() {
        let flag = CancelFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };
        tokio::task::yield_now().await;
        flag.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(flag.is_cancelled());
    }
}
