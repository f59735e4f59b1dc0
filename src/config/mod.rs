//! Sweep file: YAML schema and validation.
//!
//! Mistakes are caught in two passes: `validator` checks each field's
//! range, then [`SweepConfig::validate_semantic`] checks what no single field
//! can (scheme names, host syntax, rule parameters, slaves for an enabled
//! sweep).
//!
//! ```yaml
//! monte_carlo:
//!   enabled: true
//!   num_runs: 70
//! slaves:
//!   - host: localhost
//! variables:
//!   - name: dyn.baseball.time_to_fire_jet_1
//!     unit: s
//!     rule: { kind: uniform, min: 1.0, max: 2.0 }
//! run:
//!   model: baseball
//!   integrator: { scheme: rk4, state_size: 6 }
//!   terminate_time: 10.0
//!   initial_conditions:
//!     - { name: dyn.baseball.vel[0], value: 43.30 }
//!     - { name: dyn.baseball.theta, value: -90.0, unit: d }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::engine::{
    Binding, BindingValue, EventAction, RecordSpec, RunConfig, RunExecutor, RunId, ScheduleEvent,
    SimTime, Trigger,
};
use crate::error::{SimError, SimResult};
use crate::integration::IntegrationScheme;
use crate::models::ModelCatalog;
use crate::monte_carlo::{
    LocalSlave, MonteCarlo, RemoteSlave, RuleSpec, SweepSettings, VariableSpec,
};

/// Host names that select the in-process slave.
pub const LOCAL_HOSTS: [&str; 2] = ["localhost", "local"];

/// Top-level sweep file.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// Schema version for forward compatibility.
    #[validate(length(min = 1))]
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Sweep settings.
    #[validate(nested)]
    #[serde(default)]
    pub monte_carlo: MonteCarloConfig,

    /// Slaves runs are dispatched to.
    #[validate(nested)]
    #[serde(default)]
    pub slaves: Vec<SlaveConfig>,

    /// Variables set per run.
    #[validate(nested)]
    #[serde(default)]
    pub variables: Vec<VariableConfig>,

    /// Template run.
    #[validate(nested)]
    pub run: RunTemplateConfig,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

impl SweepConfig {
    /// Load a sweep file.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a sweep file from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn from_yaml(yaml: &str) -> SimResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        config.validate_semantic()?;
        Ok(config)
    }

    /// Create a builder for `model`.
    #[must_use]
    pub fn builder(model: impl Into<String>) -> SweepConfigBuilder {
        SweepConfigBuilder::new(model)
    }

    /// Check constraints that span fields.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` naming the first violated constraint.
    pub fn validate_semantic(&self) -> SimResult<()> {
        self.scheme()?;

        if self.monte_carlo.enabled && self.monte_carlo.num_runs > 0 && self.slaves.is_empty() {
            return Err(SimError::config(
                "monte carlo is enabled but no slaves are listed",
            ));
        }
        self.settings()?;
        for slave in &self.slaves {
            slave.kind()?;
            if let Some(timeout) = slave.connect_timeout {
                duration("connect_timeout", timeout)?;
            }
        }

        for (i, variable) in self.variables.iter().enumerate() {
            if variable.rule.is_none() && variable.declared.is_none() {
                return Err(SimError::config(format!(
                    "variable '{}' needs a rule or a declared value",
                    variable.name
                )));
            }
            if let Some(rule) = &variable.rule {
                rule.build()?;
            }
            if self.variables[..i].iter().any(|v| v.name == variable.name) {
                return Err(SimError::config(format!(
                    "variable '{}' listed twice",
                    variable.name
                )));
            }
        }

        let run = &self.run;
        if run.terminate_time < run.dt {
            return Err(SimError::config(format!(
                "terminate time {} is shorter than one step ({})",
                run.terminate_time, run.dt
            )));
        }
        for read in &run.reads {
            if read.offset.is_some_and(|o| o < 0.0) {
                return Err(SimError::config("read offset must not be negative"));
            }
        }
        for assignment in &run.assignments {
            if assignment.at.is_some() == assignment.every.is_some() {
                return Err(SimError::config(format!(
                    "assignment to '{}' needs exactly one of `at` or `every`",
                    assignment.variable
                )));
            }
        }
        Ok(())
    }

    fn scheme(&self) -> SimResult<IntegrationScheme> {
        self.run.integrator.scheme.parse()
    }

    /// Sweep settings.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if a timeout is not a representable
    /// duration.
    pub fn settings(&self) -> SimResult<SweepSettings> {
        let mc = &self.monte_carlo;
        Ok(SweepSettings {
            enabled: mc.enabled,
            num_runs: mc.num_runs,
            seed: mc.seed,
            idle_timeout: duration("idle_timeout", mc.idle_timeout)?,
            run_deadline: mc
                .run_deadline
                .map(|secs| duration("run_deadline", secs))
                .transpose()?,
            ping_interval: duration("ping_interval", mc.ping_interval)?,
        })
    }

    /// Template run configuration.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` for an unknown scheme or an invalid event
    /// time.
    pub fn run_config(&self) -> SimResult<RunConfig> {
        let run = &self.run;
        let mut config = RunConfig::new(RunId(0), run.model.clone())
            .with_integrator(self.scheme()?, run.integrator.state_size)
            .with_dt(run.dt)
            .with_terminate_time(run.terminate_time);
        config.freeze_frame = run.freeze_frame;
        config.checkpoint_period = run.checkpoint_period;
        config.record.clone_from(&run.record);

        for ic in &run.initial_conditions {
            let binding = Binding {
                name: ic.name.clone(),
                value: ic.value.clone(),
                unit: ic.unit.clone(),
            };
            config.bindings.push(binding);
        }

        for read in &run.reads {
            let period = SimTime::try_from_secs(read.period)?;
            let offset = read
                .offset
                .map_or(Ok(period), SimTime::try_from_secs)?;
            config.events.push(ScheduleEvent::new(
                Trigger::Every { period, offset },
                EventAction::Log {
                    variables: read.variables.clone(),
                },
            ));
        }

        for assignment in &run.assignments {
            let trigger = match (assignment.at, assignment.every) {
                (Some(at), None) => Trigger::At(SimTime::try_from_secs(at)?),
                (None, Some(every)) => Trigger::every(SimTime::try_from_secs(every)?),
                _ => {
                    return Err(SimError::config(format!(
                        "assignment to '{}' needs exactly one of `at` or `every`",
                        assignment.variable
                    )))
                }
            };
            config.events.push(ScheduleEvent::new(
                trigger,
                EventAction::Assign {
                    variable: assignment.variable.clone(),
                    expression: assignment.expression.clone(),
                },
            ));
        }

        Ok(config)
    }

    /// Wire the sweep file to a scheduler.
    ///
    /// `localhost` and `local` become in-process slaves; anything else is
    /// treated as a `host:port` TCP address.
    ///
    /// # Errors
    ///
    /// Returns an error if the template or a variable rule is invalid.
    pub fn into_monte_carlo(&self, catalog: Arc<ModelCatalog>, pacing: bool) -> SimResult<MonteCarlo> {
        let executor = RunExecutor::new(catalog).with_pacing(pacing);
        let mut mc = MonteCarlo::new(self.run_config()?, executor.clone());
        mc.set_settings(self.settings()?);

        for slave in &self.slaves {
            match slave.kind()? {
                SlaveKind::Local => {
                    mc.add_slave(Arc::new(LocalSlave::named(slave.host.clone(), executor.clone())));
                }
                SlaveKind::Remote => {
                    let mut remote = RemoteSlave::new(slave.host.clone());
                    if let Some(timeout) = slave.connect_timeout {
                        remote = remote.with_connect_timeout(duration("connect_timeout", timeout)?);
                    }
                    mc.add_slave(Arc::new(remote));
                }
            }
        }

        for variable in &self.variables {
            let mut spec = match &variable.rule {
                Some(rule) => VariableSpec::calculated(variable.name.clone(), rule.build()?),
                None => VariableSpec::declared(variable.name.clone(), 0.0),
            };
            spec.declared = variable.declared;
            spec.unit.clone_from(&variable.unit);
            mc.add_variable(spec)?;
        }
        Ok(mc)
    }
}

fn duration(field: &str, secs: f64) -> SimResult<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| SimError::config(format!("{field} of {secs} s: {e}")))
}

/// Sweep settings as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct MonteCarloConfig {
    /// Whether the sweep runs at all.
    #[serde(default)]
    pub enabled: bool,
    /// Number of runs when enabled.
    #[serde(default)]
    pub num_runs: usize,
    /// Master seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Seconds every slave may stay unreachable with runs pending.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: f64,
    /// Seconds a dispatched run may take.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default)]
    pub run_deadline: Option<f64>,
    /// Seconds between pings of unreachable slaves.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_ping_interval")]
    pub ping_interval: f64,
}

const fn default_seed() -> u64 {
    42
}

const fn default_idle_timeout() -> f64 {
    30.0
}

const fn default_ping_interval() -> f64 {
    1.0
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            num_runs: 0,
            seed: default_seed(),
            idle_timeout: default_idle_timeout(),
            run_deadline: None,
            ping_interval: default_ping_interval(),
        }
    }
}

/// One slave.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SlaveConfig {
    /// `localhost`, `local`, or `host:port`.
    #[validate(length(min = 1))]
    pub host: String,
    /// Seconds allowed to connect to a remote slave.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default)]
    pub connect_timeout: Option<f64>,
}

enum SlaveKind {
    Local,
    Remote,
}

impl SlaveConfig {
    fn kind(&self) -> SimResult<SlaveKind> {
        if LOCAL_HOSTS.contains(&self.host.as_str()) {
            return Ok(SlaveKind::Local);
        }
        match self.host.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(SlaveKind::Remote)
            }
            _ => Err(SimError::config(format!(
                "slave host '{}' is neither localhost nor host:port",
                self.host
            ))),
        }
    }
}

/// One sweep variable.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    /// Dotted variable name.
    #[validate(length(min = 1))]
    pub name: String,
    /// Unit of the values.
    #[serde(default)]
    pub unit: Option<String>,
    /// Value for a disabled sweep (or every run without a rule).
    #[serde(default)]
    pub declared: Option<f64>,
    /// Per-run generation rule.
    #[serde(default)]
    pub rule: Option<RuleSpec>,
}

/// Template run.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RunTemplateConfig {
    /// Model name.
    #[validate(length(min = 1))]
    pub model: String,
    /// Integrator selection.
    #[serde(default)]
    pub integrator: IntegratorConfig,
    /// Timestep in seconds.
    #[validate(range(min = 0.000_001, max = 1.0))]
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Terminate time in seconds.
    #[validate(range(min = 0.0))]
    pub terminate_time: f64,
    /// Wall-clock seconds per step when paced.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default)]
    pub freeze_frame: Option<f64>,
    /// Initial conditions, applied in order.
    #[validate(nested)]
    #[serde(default)]
    pub initial_conditions: Vec<InitialCondition>,
    /// Periodic reads.
    #[validate(nested)]
    #[serde(default)]
    pub reads: Vec<ReadConfig>,
    /// Scheduled assignments.
    #[validate(nested)]
    #[serde(default)]
    pub assignments: Vec<AssignmentConfig>,
    /// Trajectory recording.
    #[serde(default)]
    pub record: Option<RecordSpec>,
    /// Checkpoint period in seconds.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default)]
    pub checkpoint_period: Option<f64>,
}

const fn default_dt() -> f64 {
    0.01
}

/// Integrator selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegratorConfig {
    /// Scheme name, e.g. `rk4`, `abm`, `euler`.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Expected state size.
    #[serde(default)]
    pub state_size: Option<usize>,
}

fn default_scheme() -> String {
    IntegrationScheme::default().label().to_string()
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            state_size: None,
        }
    }
}

/// One initial condition: a number or an expression string.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct InitialCondition {
    /// Dotted variable name.
    #[validate(length(min = 1))]
    pub name: String,
    /// Value or expression.
    pub value: BindingValue,
    /// Unit of the value.
    #[serde(default)]
    pub unit: Option<String>,
}

/// Periodic read of variables.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReadConfig {
    /// Period in seconds.
    #[validate(range(exclusive_min = 0.0))]
    pub period: f64,
    /// First firing; defaults to one period.
    #[serde(default)]
    pub offset: Option<f64>,
    /// Variables read.
    #[validate(length(min = 1))]
    pub variables: Vec<String>,
}

/// Scheduled assignment.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AssignmentConfig {
    /// One-shot time in seconds.
    #[serde(default)]
    pub at: Option<f64>,
    /// Period in seconds.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default)]
    pub every: Option<f64>,
    /// Target variable.
    #[validate(length(min = 1))]
    pub variable: String,
    /// Expression assigned.
    #[validate(length(min = 1))]
    pub expression: String,
}

/// Programmatic construction of a sweep file.
#[derive(Debug)]
pub struct SweepConfigBuilder {
    config: SweepConfig,
}

impl SweepConfigBuilder {
    fn new(model: impl Into<String>) -> Self {
        Self {
            config: SweepConfig {
                schema_version: default_schema_version(),
                monte_carlo: MonteCarloConfig::default(),
                slaves: Vec::new(),
                variables: Vec::new(),
                run: RunTemplateConfig {
                    model: model.into(),
                    integrator: IntegratorConfig::default(),
                    dt: default_dt(),
                    terminate_time: 10.0,
                    freeze_frame: None,
                    initial_conditions: Vec::new(),
                    reads: Vec::new(),
                    assignments: Vec::new(),
                    record: None,
                    checkpoint_period: None,
                },
            },
        }
    }

    /// Enable the sweep with `num_runs` runs.
    #[must_use]
    pub const fn runs(mut self, num_runs: usize) -> Self {
        self.config.monte_carlo.enabled = true;
        self.config.monte_carlo.num_runs = num_runs;
        self
    }

    /// Set the master seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.config.monte_carlo.seed = seed;
        self
    }

    /// Add a slave.
    #[must_use]
    pub fn slave(mut self, host: impl Into<String>) -> Self {
        self.config.slaves.push(SlaveConfig {
            host: host.into(),
            connect_timeout: None,
        });
        self
    }

    /// Add a variable generated by `rule`.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, unit: Option<&str>, rule: RuleSpec) -> Self {
        self.config.variables.push(VariableConfig {
            name: name.into(),
            unit: unit.map(str::to_string),
            declared: None,
            rule: Some(rule),
        });
        self
    }

    /// Select the integrator.
    #[must_use]
    pub fn integrator(mut self, scheme: IntegrationScheme, state_size: Option<usize>) -> Self {
        self.config.run.integrator = IntegratorConfig {
            scheme: scheme.label().to_string(),
            state_size,
        };
        self
    }

    /// Set timestep and terminate time.
    #[must_use]
    pub const fn timing(mut self, dt: f64, terminate_time: f64) -> Self {
        self.config.run.dt = dt;
        self.config.run.terminate_time = terminate_time;
        self
    }

    /// Add a literal initial condition.
    #[must_use]
    pub fn initial(mut self, name: impl Into<String>, value: f64, unit: Option<&str>) -> Self {
        self.config.run.initial_conditions.push(InitialCondition {
            name: name.into(),
            value: BindingValue::Literal(value),
            unit: unit.map(str::to_string),
        });
        self
    }

    /// Build and validate.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn build(self) -> SimResult<SweepConfig> {
        self.config.validate()?;
        self.config.validate_semantic()?;
        Ok(self.config)
    }
}
