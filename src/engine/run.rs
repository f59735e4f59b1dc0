//! Run configuration and result types.
//!
//! A `RunConfig` is immutable once dispatched and crosses the slave
//! transport unchanged; a `RunResult` is owned by the scheduler after
//! collection.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::engine::scheduler::{EventAction, ScheduleEvent};
use crate::engine::SimTime;
use crate::integration::IntegrationScheme;
use crate::replay::RunCheckpoint;

/// Dense run identifier in `0..num_runs`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Value bound to a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingValue {
    /// Literal value.
    Literal(f64),
    /// Expression evaluated against the state when applied.
    Expression(String),
}

/// A (variable, value) pair applied at run start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Dotted variable path.
    pub name: String,
    /// Bound value.
    pub value: BindingValue,
    /// Unit of a literal value, converted to the variable's native unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Binding {
    /// Literal binding in native units.
    #[must_use]
    pub fn literal(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: BindingValue::Literal(value),
            unit: None,
        }
    }

    /// Expression binding.
    #[must_use]
    pub fn expression(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: BindingValue::Expression(expression.into()),
            unit: None,
        }
    }

    /// Attach a unit to the bound value.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Periodic sampling of selected variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSpec {
    /// Sampling period in seconds.
    pub period: f64,
    /// Variables sampled each period.
    pub variables: Vec<String>,
}

/// Everything a slave needs to execute one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run identifier.
    pub run_id: RunId,
    /// Model name in the catalog.
    pub model: String,
    /// Integration scheme, fixed for the whole run.
    pub scheme: IntegrationScheme,
    /// Expected state size; checked against the model at setup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_size: Option<usize>,
    /// Nominal timestep in seconds.
    pub dt: f64,
    /// Terminate time in seconds.
    pub terminate_time: f64,
    /// Freeze-frame pacing interval in wall-clock seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze_frame: Option<f64>,
    /// Ordered bindings (declared values, then generated values).
    #[serde(default)]
    pub bindings: Vec<Binding>,
    /// Scheduled events.
    #[serde(default)]
    pub events: Vec<ScheduleEvent>,
    /// Trajectory recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<RecordSpec>,
    /// Checkpoint period in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_period: Option<f64>,
}

impl RunConfig {
    /// Create a configuration with RK4, `dt = 0.01` and `terminate = 10`.
    #[must_use]
    pub fn new(run_id: RunId, model: impl Into<String>) -> Self {
        Self {
            run_id,
            model: model.into(),
            scheme: IntegrationScheme::default(),
            state_size: None,
            dt: 0.01,
            terminate_time: 10.0,
            freeze_frame: None,
            bindings: Vec::new(),
            events: Vec::new(),
            record: None,
            checkpoint_period: None,
        }
    }

    /// Set the integration scheme and expected state size.
    #[must_use]
    pub fn with_integrator(mut self, scheme: IntegrationScheme, state_size: Option<usize>) -> Self {
        self.scheme = scheme;
        self.state_size = state_size;
        self
    }

    /// Set the timestep.
    #[must_use]
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Set the terminate time.
    #[must_use]
    pub fn with_terminate_time(mut self, terminate_time: f64) -> Self {
        self.terminate_time = terminate_time;
        self
    }

    /// Set the freeze-frame interval.
    #[must_use]
    pub fn with_freeze_frame(mut self, freeze_frame: f64) -> Self {
        self.freeze_frame = Some(freeze_frame);
        self
    }

    /// Append a binding.
    #[must_use]
    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Append an event.
    #[must_use]
    pub fn with_event(mut self, event: ScheduleEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Set trajectory recording.
    #[must_use]
    pub fn with_record(mut self, record: RecordSpec) -> Self {
        self.record = Some(record);
        self
    }

    /// Set the checkpoint period.
    #[must_use]
    pub fn with_checkpoint_period(mut self, period: f64) -> Self {
        self.checkpoint_period = Some(period);
        self
    }
}

/// Final status of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Reached terminate time.
    Completed,
    /// Stopped on a numeric fault, a faulting event, or a setup error.
    Failed {
        /// Human-readable cause.
        reason: String,
    },
    /// Never completed because every slave stayed unreachable.
    UnreachableExhausted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::UnreachableExhausted => write!(f, "unreachable-exhausted"),
        }
    }
}

/// One recorded sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Simulated time in seconds.
    pub time: f64,
    /// Value in native units.
    pub value: f64,
}

/// An event that fired during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiredEvent {
    /// Firing time.
    pub time: SimTime,
    /// Action performed.
    pub action: EventAction,
    /// Values read by a `Log` action.
    #[serde(default)]
    pub values: IndexMap<String, f64>,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Run identifier.
    pub run_id: RunId,
    /// Final status.
    #[serde(flatten)]
    pub status: RunStatus,
    /// Simulated time reached.
    pub end_time: SimTime,
    /// Integration steps taken.
    pub steps: u64,
    /// Final value of every declared variable.
    #[serde(default)]
    pub final_values: IndexMap<String, f64>,
    /// Recorded trajectories.
    #[serde(default)]
    pub trajectories: IndexMap<String, Vec<Sample>>,
    /// Events fired, in firing order.
    #[serde(default)]
    pub events: Vec<FiredEvent>,
    /// Checkpoints captured during the run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkpoints: Vec<RunCheckpoint>,
    /// Slave that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slave: Option<String>,
    /// Dispatch attempts, including requeues.
    #[serde(default)]
    pub attempts: u32,
    /// Wall-clock duration in seconds.
    #[serde(default)]
    pub wall_secs: f64,
}

impl RunResult {
    /// Empty result with the given status.
    #[must_use]
    pub fn with_status(run_id: RunId, status: RunStatus) -> Self {
        Self {
            run_id,
            status,
            end_time: SimTime::ZERO,
            steps: 0,
            final_values: IndexMap::new(),
            trajectories: IndexMap::new(),
            events: Vec::new(),
            checkpoints: Vec::new(),
            slave: None,
            attempts: 0,
            wall_secs: 0.0,
        }
    }

    /// Failed result with no data.
    #[must_use]
    pub fn failed(run_id: RunId, reason: impl Into<String>) -> Self {
        Self::with_status(
            run_id,
            RunStatus::Failed {
                reason: reason.into(),
            },
        )
    }

    /// Check if the run reached terminate time.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Final value of a variable, if reported.
    #[must_use]
    pub fn final_value(&self, name: &str) -> Option<f64> {
        self.final_values.get(name).copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::scheduler::Trigger;

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new(RunId(3), "msd")
            .with_integrator(IntegrationScheme::AdamsBashforthMoulton4, Some(2))
            .with_dt(0.1)
            .with_terminate_time(300.0)
            .with_freeze_frame(0.1)
            .with_binding(Binding::literal("msd.x", 1.0))
            .with_binding(Binding::literal("msd.theta", -90.0).with_unit("d"));

        assert_eq!(config.run_id, RunId(3));
        assert_eq!(config.state_size, Some(2));
        assert_eq!(config.bindings.len(), 2);
        assert_eq!(config.bindings[1].unit.as_deref(), Some("d"));
        assert_eq!(config.freeze_frame, Some(0.1));
    }

    #[test]
    fn test_run_config_json_round_trip() {
        let config = RunConfig::new(RunId(1), "baseball")
            .with_binding(Binding::expression("x", "2 * pi"))
            .with_event(ScheduleEvent::new(
                Trigger::every(SimTime::from_secs(55.0)),
                EventAction::Log {
                    variables: vec!["x".to_string()],
                },
            ));
        let json = serde_json::to_string(&config).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_run_result_status_serializes_flat() {
        let result = RunResult::failed(RunId(4), "cancelled");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "cancelled");

        let back: RunResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.status, result.status);
        assert!(!back.is_completed());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RunStatus::Completed.to_string(), "completed");
        assert_eq!(
            RunStatus::UnreachableExhausted.to_string(),
            "unreachable-exhausted"
        );
        assert_eq!(RunId(7).to_string(), "run#7");
    }
}
