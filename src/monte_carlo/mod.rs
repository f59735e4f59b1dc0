//! Monte Carlo Scheduler.
//!
//! The master side of a sweep. It expands a template [`RunConfig`] into N run
//! configurations, hands them to slaves from a work queue and collects the
//! results.
//!
//! # Dispatch
//!
//! ```text
//!            ┌──────── requeue (front) ◀── SlaveUnreachable ─┐
//!            ▼                                               │
//!  queue ──▶ idle slave ──▶ busy ──▶ result ──▶ collected ───┘
//!                             │
//!                             └── deadline ──▶ unreachable ──▶ ping ──▶ idle
//! ```
//!
//! The scheduler task is the only writer of the queue and the slave table.
//! Dispatch is at-least-once: a run whose slave goes unreachable returns to
//! the front of the queue, and duplicate results are discarded by run id.
//! A run that misses its deadline is requeued too, but the overdue execution
//! keeps going and its answer is accepted if it arrives first.
//! When every slave is unreachable with runs pending for longer than the idle
//! timeout the sweep fails with `InsufficientCapacity`.

pub mod generation;
pub mod remote;
pub mod slave;

pub use generation::{GenerationContext, GenerationRule, RuleSpec};
pub use remote::{serve_slave, RemoteSlave};
pub use slave::{LocalSlave, SlaveConnector, SlaveId, SlaveStatus};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::rng::SimRng;
use crate::engine::{
    Binding, BindingValue, CancelFlag, RunConfig, RunExecutor, RunId, RunResult, RunStatus,
};
use crate::error::{SimError, SimResult};
use crate::registry::VariableRegistry;

/// A variable the sweep sets on every run.
#[derive(Clone)]
pub struct VariableSpec {
    /// Dotted variable name.
    pub name: String,
    /// Unit of generated and declared values.
    pub unit: Option<String>,
    /// Value used when the sweep is disabled, and for every run when there
    /// is no rule.
    pub declared: Option<f64>,
    rule: Option<Arc<dyn GenerationRule>>,
}

impl VariableSpec {
    /// Variable computed per run by `rule`.
    #[must_use]
    pub fn calculated(name: impl Into<String>, rule: Arc<dyn GenerationRule>) -> Self {
        Self {
            name: name.into(),
            unit: None,
            declared: None,
            rule: Some(rule),
        }
    }

    /// Variable with one value for every run.
    #[must_use]
    pub fn declared(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            unit: None,
            declared: Some(value),
            rule: None,
        }
    }

    /// Attach a unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Value used when the sweep is disabled.
    #[must_use]
    pub const fn with_declared(mut self, value: f64) -> Self {
        self.declared = Some(value);
        self
    }

    /// Check if the value varies per run.
    #[must_use]
    pub const fn is_calculated(&self) -> bool {
        self.rule.is_some()
    }
}

impl fmt::Debug for VariableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableSpec")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("declared", &self.declared)
            .field("rule", &self.rule)
            .finish()
    }
}

/// Sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSettings {
    /// Run the Monte Carlo machinery at all.
    pub enabled: bool,
    /// Number of runs when enabled.
    pub num_runs: usize,
    /// Master seed for generation rules.
    pub seed: u64,
    /// How long every slave may stay unreachable with runs pending.
    pub idle_timeout: Duration,
    /// Per-dispatch deadline; exceeding it marks the slave unreachable and
    /// requeues the run.
    pub run_deadline: Option<Duration>,
    /// Interval between pings of unreachable slaves.
    pub ping_interval: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            num_runs: 0,
            seed: 0,
            idle_timeout: Duration::from_secs(30),
            run_deadline: None,
            ping_interval: Duration::from_secs(1),
        }
    }
}

/// Point-in-time sweep progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepProgress {
    /// Runs waiting for a slave.
    pub queued: usize,
    /// Runs executing on a slave.
    pub in_flight: usize,
    /// Runs with a collected result.
    pub completed: usize,
    /// Runs returned to the queue after a slave became unreachable.
    pub requeued: usize,
}

#[derive(Debug, Default)]
struct ProgressCounters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    requeued: AtomicUsize,
}

/// Lock-free reader of sweep progress, usable while the sweep runs.
#[derive(Debug, Clone)]
pub struct ProgressHandle(Arc<ProgressCounters>);

impl ProgressHandle {
    /// Current counters.
    #[must_use]
    pub fn snapshot(&self) -> SweepProgress {
        SweepProgress {
            queued: self.0.queued.load(Ordering::Relaxed),
            in_flight: self.0.in_flight.load(Ordering::Relaxed),
            completed: self.0.completed.load(Ordering::Relaxed),
            requeued: self.0.requeued.load(Ordering::Relaxed),
        }
    }
}

/// Aborts a running sweep.
#[derive(Debug, Clone)]
pub struct SweepCancel(Arc<watch::Sender<bool>>);

impl SweepCancel {
    /// Signal busy slaves and make `run()` return `Cancelled`. The sweep
    /// stays aborted.
    pub fn abort(&self) {
        self.0.send_replace(true);
    }

    /// Check if the sweep was aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.0.borrow()
    }
}

struct SlaveEntry {
    connector: Arc<dyn SlaveConnector>,
    status: SlaveStatus,
    assignment: Option<Assignment>,
    pinging: bool,
}

#[derive(Clone)]
struct Assignment {
    run: RunId,
    token: u64,
    cancel: CancelFlag,
}

enum SlaveEvent {
    Finished {
        slave: SlaveId,
        run: RunId,
        token: u64,
        outcome: SimResult<RunResult>,
    },
    Overdue {
        slave: SlaveId,
        run: RunId,
        token: u64,
    },
    Pinged {
        slave: SlaveId,
        reachable: bool,
    },
}

/// Monte Carlo sweep over a template run.
pub struct MonteCarlo {
    template: RunConfig,
    executor: RunExecutor,
    settings: SweepSettings,
    variables: Vec<VariableSpec>,
    slaves: Vec<SlaveEntry>,
    progress: Arc<ProgressCounters>,
    cancel: Arc<watch::Sender<bool>>,
    completed: Vec<RunResult>,
    exhausted: Vec<RunResult>,
}

impl fmt::Debug for MonteCarlo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonteCarlo")
            .field("model", &self.template.model)
            .field("settings", &self.settings)
            .field("variables", &self.variables.len())
            .field("slaves", &self.slaves.len())
            .finish_non_exhaustive()
    }
}

impl MonteCarlo {
    /// Create a disabled sweep over `template`.
    ///
    /// `executor` runs the single configuration when the sweep is disabled
    /// and resolves variable names up front.
    #[must_use]
    pub fn new(template: RunConfig, executor: RunExecutor) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            template,
            executor,
            settings: SweepSettings::default(),
            variables: Vec::new(),
            slaves: Vec::new(),
            progress: Arc::new(ProgressCounters::default()),
            cancel: Arc::new(cancel),
            completed: Vec::new(),
            exhausted: Vec::new(),
        }
    }

    /// Enable or disable the sweep and set its run count.
    pub fn configure(&mut self, enabled: bool, num_runs: usize) {
        self.settings.enabled = enabled;
        self.settings.num_runs = num_runs;
    }

    /// Replace all settings.
    pub fn set_settings(&mut self, settings: SweepSettings) {
        self.settings = settings;
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    /// Template every run starts from.
    #[must_use]
    pub const fn template(&self) -> &RunConfig {
        &self.template
    }

    /// Register a slave.
    pub fn add_slave(&mut self, connector: Arc<dyn SlaveConnector>) -> SlaveId {
        let id = SlaveId(self.slaves.len());
        info!(%id, host = connector.host(), "slave registered");
        self.slaves.push(SlaveEntry {
            connector,
            status: SlaveStatus::Idle,
            assignment: None,
            pinging: false,
        });
        id
    }

    /// Register an in-process slave sharing this sweep's executor.
    pub fn add_local_slave(&mut self) -> SlaveId {
        self.add_slave(Arc::new(LocalSlave::new(self.executor.clone())))
    }

    /// Register a variable.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if the name is already registered.
    pub fn add_variable(&mut self, spec: VariableSpec) -> SimResult<()> {
        if self.variables.iter().any(|v| v.name == spec.name) {
            return Err(SimError::config(format!(
                "variable '{}' added twice",
                spec.name
            )));
        }
        self.variables.push(spec);
        Ok(())
    }

    /// Registered variables.
    #[must_use]
    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    /// Slave hosts and their availability.
    #[must_use]
    pub fn slave_statuses(&self) -> Vec<(SlaveId, String, SlaveStatus)> {
        self.slaves
            .iter()
            .enumerate()
            .map(|(i, s)| (SlaveId(i), s.connector.host().to_string(), s.status))
            .collect()
    }

    /// Handle that aborts the sweep.
    #[must_use]
    pub fn cancel_handle(&self) -> SweepCancel {
        SweepCancel(Arc::clone(&self.cancel))
    }

    /// Handle for reading progress while `run()` holds the sweep.
    #[must_use]
    pub fn progress_handle(&self) -> ProgressHandle {
        ProgressHandle(Arc::clone(&self.progress))
    }

    /// Current progress.
    #[must_use]
    pub fn progress(&self) -> SweepProgress {
        self.progress_handle().snapshot()
    }

    /// Results collected by the last `run()`, including an aborted or
    /// exhausted one.
    #[must_use]
    pub fn completed_results(&self) -> &[RunResult] {
        &self.completed
    }

    /// Runs the last `run()` never completed because capacity ran out.
    #[must_use]
    pub fn exhausted_results(&self) -> &[RunResult] {
        &self.exhausted
    }

    /// Expand the template into the run configurations `run()` dispatches.
    ///
    /// Disabled: one configuration with every declared value. Enabled:
    /// `num_runs` configurations; calculated variables draw from the run's
    /// own RNG stream, others keep their declared value.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable does not exist in the model, carries an
    /// unconvertible unit, or its rule fails or yields a non-finite value.
    pub fn generate_run_configs(&self) -> SimResult<Vec<RunConfig>> {
        self.check_variables()?;

        if !self.settings.enabled {
            let mut config = self.template.clone();
            config.run_id = RunId(0);
            for spec in &self.variables {
                if let Some(value) = spec.declared {
                    config.bindings.push(binding(spec, value));
                }
            }
            return Ok(vec![config]);
        }

        let num_runs = self.settings.num_runs;
        (0..num_runs as u64)
            .map(|run| {
                let mut config = self.template.clone();
                config.run_id = RunId(run);
                let mut rng = SimRng::for_stream(self.settings.seed, run);
                for spec in &self.variables {
                    let value = match &spec.rule {
                        Some(rule) => rule.generate(&mut GenerationContext {
                            run: RunId(run),
                            num_runs,
                            rng: &mut rng,
                        })?,
                        None => match spec.declared {
                            Some(value) => value,
                            None => continue,
                        },
                    };
                    if !value.is_finite() {
                        return Err(SimError::config(format!(
                            "rule for '{}' produced {value} in run#{run}",
                            spec.name
                        )));
                    }
                    config.bindings.push(binding(spec, value));
                }
                Ok(config)
            })
            .collect()
    }

    fn check_variables(&self) -> SimResult<()> {
        let model = self.executor.catalog().get(&self.template.model)?;
        let mut registry = VariableRegistry::new();
        model.declare(&mut registry)?;
        for spec in &self.variables {
            registry.bind_name(&spec.name, &BindingValue::Literal(0.0), spec.unit.as_deref())?;
        }
        Ok(())
    }

    /// Execute the sweep and return results ordered by run id.
    ///
    /// # Errors
    ///
    /// Returns `SimError::InsufficientCapacity` if every slave stays
    /// unreachable for the idle timeout with runs pending,
    /// `SimError::Cancelled` if the sweep is aborted, and generation errors
    /// from [`MonteCarlo::generate_run_configs`]. Failed runs are results,
    /// not errors.
    pub async fn run(&mut self) -> SimResult<Vec<RunResult>> {
        self.completed.clear();
        self.exhausted.clear();
        let configs = self.generate_run_configs()?;

        if !self.settings.enabled {
            info!(model = %self.template.model, "monte carlo disabled, single run");
            return self.run_single(configs).await;
        }

        info!(
            runs = configs.len(),
            slaves = self.slaves.len(),
            seed = self.settings.seed,
            "sweep started"
        );
        let outcome = Dispatcher::new(self, configs).drive().await;
        self.publish(0, 0);
        self.completed.sort_by_key(|r| r.run_id);

        match outcome {
            Ok(()) => {
                info!(runs = self.completed.len(), "sweep finished");
                Ok(self.completed.clone())
            }
            Err(e) => {
                warn!(error = %e, collected = self.completed.len(), "sweep aborted");
                Err(e)
            }
        }
    }

    async fn run_single(&mut self, configs: Vec<RunConfig>) -> SimResult<Vec<RunResult>> {
        let executor = self.executor.clone();
        let mut results = Vec::with_capacity(configs.len());
        for config in configs {
            let executor = executor.clone();
            let mut result = tokio::task::spawn_blocking(move || executor.execute(&config))
                .await
                .map_err(|e| SimError::config(format!("run task failed: {e}")))?;
            result.attempts = 1;
            results.push(result);
        }
        self.completed.clone_from(&results);
        self.progress.completed.store(results.len(), Ordering::Relaxed);
        Ok(results)
    }

    fn publish(&self, queued: usize, in_flight: usize) {
        self.progress.queued.store(queued, Ordering::Relaxed);
        self.progress.in_flight.store(in_flight, Ordering::Relaxed);
        self.progress
            .completed
            .store(self.completed.len(), Ordering::Relaxed);
    }
}

fn binding(spec: &VariableSpec, value: f64) -> Binding {
    let binding = Binding::literal(spec.name.clone(), value);
    match &spec.unit {
        Some(unit) => binding.with_unit(unit.clone()),
        None => binding,
    }
}

/// State of one `run()` call.
struct Dispatcher<'a> {
    sweep: &'a mut MonteCarlo,
    configs: Vec<RunConfig>,
    queue: VecDeque<RunId>,
    done: Vec<bool>,
    attempts: Vec<u32>,
    stragglers: Vec<Assignment>,
    next_token: u64,
    starved_since: Option<Instant>,
    events_tx: mpsc::UnboundedSender<SlaveEvent>,
    events_rx: mpsc::UnboundedReceiver<SlaveEvent>,
}

impl<'a> Dispatcher<'a> {
    fn new(sweep: &'a mut MonteCarlo, configs: Vec<RunConfig>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let n = configs.len();
        sweep.progress.requeued.store(0, Ordering::Relaxed);
        for slave in &mut sweep.slaves {
            slave.assignment = None;
            slave.pinging = false;
            if slave.status == SlaveStatus::Busy {
                slave.status = SlaveStatus::Idle;
            }
        }
        Self {
            sweep,
            queue: (0..n as u64).map(RunId).collect(),
            done: vec![false; n],
            attempts: vec![0; n],
            stragglers: Vec::new(),
            configs,
            next_token: 0,
            starved_since: None,
            events_tx,
            events_rx,
        }
    }

    async fn drive(mut self) -> SimResult<()> {
        let mut cancel_rx = self.sweep.cancel.subscribe();
        let mut ping = tokio::time::interval(self.sweep.settings.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *cancel_rx.borrow_and_update() {
                self.abort();
                return Err(SimError::Cancelled);
            }
            self.dispatch();
            self.publish();
            if self.done.iter().all(|d| *d) {
                return Ok(());
            }

            let idle_deadline = self.update_starvation();
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.handle(event),
                Ok(()) = cancel_rx.changed() => {}
                _ = ping.tick() => self.ping_unreachable(),
                () = sleep_until(idle_deadline), if idle_deadline.is_some() => {
                    return Err(self.exhaust());
                }
            }
        }
    }

    /// Assign queued runs to idle slaves.
    fn dispatch(&mut self) {
        for index in 0..self.sweep.slaves.len() {
            if self.sweep.slaves[index].status != SlaveStatus::Idle {
                continue;
            }
            let Some(run) = self.next_queued() else {
                return;
            };
            let Some(config) = self.configs.get(index_of(run)).cloned() else {
                continue;
            };

            self.attempts[index_of(run)] += 1;
            self.next_token += 1;
            let assignment = Assignment {
                run,
                token: self.next_token,
                cancel: CancelFlag::new(),
            };
            let slave = &mut self.sweep.slaves[index];
            slave.status = SlaveStatus::Busy;
            slave.assignment = Some(assignment.clone());
            debug!(%run, slave = slave.connector.host(), attempt = self.attempts[index_of(run)], "dispatch");

            let connector = Arc::clone(&slave.connector);
            let tx = self.events_tx.clone();
            let deadline = self.sweep.settings.run_deadline;
            tokio::spawn(async move {
                let mut execute = connector.execute(config, assignment.cancel.clone());
                let outcome = match deadline {
                    Some(limit) => match tokio::time::timeout(limit, &mut execute).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            // Keep waiting; a late answer may still win.
                            let _ = tx.send(SlaveEvent::Overdue {
                                slave: SlaveId(index),
                                run,
                                token: assignment.token,
                            });
                            execute.await
                        }
                    },
                    None => execute.await,
                };
                let _ = tx.send(SlaveEvent::Finished {
                    slave: SlaveId(index),
                    run,
                    token: assignment.token,
                    outcome,
                });
            });
        }
    }

    /// Pop the queue head, skipping runs a late result already completed.
    fn next_queued(&mut self) -> Option<RunId> {
        while let Some(run) = self.queue.pop_front() {
            if !self.done[index_of(run)] {
                return Some(run);
            }
        }
        None
    }

    fn handle(&mut self, event: SlaveEvent) {
        match event {
            SlaveEvent::Finished {
                slave,
                run,
                token,
                outcome,
            } => self.finished(slave, run, token, outcome),
            SlaveEvent::Overdue { slave, run, token } => self.overdue(slave, run, token),
            SlaveEvent::Pinged { slave, reachable } => {
                let Some(entry) = self.sweep.slaves.get_mut(slave.0) else {
                    return;
                };
                entry.pinging = false;
                if reachable && entry.status == SlaveStatus::Unreachable {
                    info!(%slave, host = entry.connector.host(), "slave reachable again");
                    entry.status = SlaveStatus::Idle;
                }
            }
        }
    }

    /// The run missed its deadline: write the slave off and requeue.
    fn overdue(&mut self, slave: SlaveId, run: RunId, token: u64) {
        let Some(entry) = self.sweep.slaves.get_mut(slave.0) else {
            return;
        };
        if !entry.assignment.as_ref().is_some_and(|a| a.token == token) {
            return;
        }
        let Some(assignment) = entry.assignment.take() else {
            return;
        };
        warn!(%run, %slave, deadline = ?self.sweep.settings.run_deadline, "no result before the deadline, requeueing run");
        entry.status = SlaveStatus::Unreachable;
        self.stragglers.push(assignment);
        self.requeue(run);
    }

    fn finished(&mut self, slave: SlaveId, run: RunId, token: u64, outcome: SimResult<RunResult>) {
        self.stragglers.retain(|a| a.token != token);
        let Some(entry) = self.sweep.slaves.get_mut(slave.0) else {
            return;
        };
        let current = entry
            .assignment
            .as_ref()
            .is_some_and(|a| a.token == token && a.run == run);

        if !current {
            // Late answer from a slave already written off.
            match outcome {
                Ok(result) if result.run_id == run && index_of(run) < self.done.len() => {
                    debug!(%run, %slave, "late result");
                    self.collect(entry_host(&self.sweep.slaves, slave), result);
                }
                _ => debug!(%run, %slave, "stale event discarded"),
            }
            return;
        }

        entry.assignment = None;
        let host = entry.connector.host().to_string();
        match outcome {
            Ok(result) if result.run_id == run => {
                entry.status = SlaveStatus::Idle;
                self.collect(Some(host), result);
            }
            Ok(result) => {
                warn!(%run, %slave, answered = %result.run_id, "result for the wrong run");
                entry.status = SlaveStatus::Idle;
                self.collect(
                    Some(host),
                    RunResult::failed(run, format!("slave answered {} for {run}", result.run_id)),
                );
            }
            Err(e) if e.is_transient() => {
                warn!(%run, %slave, error = %e, "slave unreachable, requeueing run");
                entry.status = SlaveStatus::Unreachable;
                self.requeue(run);
            }
            Err(SimError::Cancelled) => {
                // The sweep is still live, so the connector gave up on its own.
                warn!(%run, %slave, "slave cancelled the run, requeueing");
                entry.status = SlaveStatus::Unreachable;
                self.requeue(run);
            }
            Err(e) => {
                entry.status = SlaveStatus::Idle;
                self.collect(Some(host), RunResult::failed(run, e.to_string()));
            }
        }
    }

    fn requeue(&mut self, run: RunId) {
        if !self.done[index_of(run)] {
            self.queue.push_front(run);
            self.sweep.progress.requeued.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn collect(&mut self, host: Option<String>, mut result: RunResult) {
        let index = index_of(result.run_id);
        match self.done.get_mut(index) {
            Some(done) if !*done => *done = true,
            Some(_) => {
                debug!(run = %result.run_id, "duplicate result discarded");
                return;
            }
            None => {
                warn!(run = %result.run_id, "result for unknown run discarded");
                return;
            }
        }
        result.slave = host;
        result.attempts = self.attempts[index];
        debug!(run = %result.run_id, status = %result.status, "run collected");
        self.sweep.completed.push(result);
    }

    fn ping_unreachable(&mut self) {
        for (index, entry) in self.sweep.slaves.iter_mut().enumerate() {
            if entry.status != SlaveStatus::Unreachable || entry.pinging {
                continue;
            }
            entry.pinging = true;
            let connector = Arc::clone(&entry.connector);
            let tx = self.events_tx.clone();
            tokio::spawn(async move {
                let reachable = connector.ping().await;
                let _ = tx.send(SlaveEvent::Pinged {
                    slave: SlaveId(index),
                    reachable,
                });
            });
        }
    }

    /// Start or stop the idle timer; returns when it expires.
    fn update_starvation(&mut self) -> Option<Instant> {
        let pending = self.queue.iter().any(|run| !self.done[index_of(*run)]);
        let capacity = self
            .sweep
            .slaves
            .iter()
            .any(|s| s.status != SlaveStatus::Unreachable);

        if pending && !capacity {
            let since = *self.starved_since.get_or_insert_with(Instant::now);
            Some(since + self.sweep.settings.idle_timeout)
        } else {
            self.starved_since = None;
            None
        }
    }

    fn exhaust(&mut self) -> SimError {
        let idle_secs = self.sweep.settings.idle_timeout.as_secs_f64();
        self.sweep.exhausted = self
            .done
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(i, _)| {
                let mut result =
                    RunResult::with_status(RunId(i as u64), RunStatus::UnreachableExhausted);
                result.attempts = self.attempts[i];
                result
            })
            .collect();
        warn!(
            pending = self.sweep.exhausted.len(),
            idle_secs, "no reachable slave, giving up"
        );
        SimError::InsufficientCapacity {
            pending: self.sweep.exhausted.len(),
            idle_secs,
        }
    }

    fn abort(&mut self) {
        for assignment in self.stragglers.drain(..) {
            debug!(run = %assignment.run, "cancelling overdue run");
            assignment.cancel.cancel();
        }
        for entry in &mut self.sweep.slaves {
            if let Some(assignment) = entry.assignment.take() {
                debug!(run = %assignment.run, "cancelling in-flight run");
                assignment.cancel.cancel();
                entry.status = SlaveStatus::Idle;
            }
        }
    }

    fn publish(&self) {
        let in_flight = self
            .sweep
            .slaves
            .iter()
            .filter(|s| s.assignment.is_some())
            .count();
        self.sweep.publish(self.queue.len(), in_flight);
    }
}

fn entry_host(slaves: &[SlaveEntry], slave: SlaveId) -> Option<String> {
    slaves.get(slave.0).map(|s| s.connector.host().to_string())
}

const fn index_of(run: RunId) -> usize {
    run.0 as usize
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}
