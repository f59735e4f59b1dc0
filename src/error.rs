//! Error types for montesim.
//!
//! All fallible operations return `Result<T, SimError>` instead of panicking.
//! Errors are classified by blast radius: local configuration errors surface
//! at bind time, run errors fail a single run, and only capacity exhaustion
//! aborts a whole sweep.

use thiserror::Error;

use crate::engine::SimTime;

/// Result type alias for montesim operations.
pub type SimResult<T> = Result<T, SimError>;

/// Unified error type for all montesim operations.
#[derive(Debug, Error)]
pub enum SimError {
    // ===== Variable Registry =====
    /// Name is not registered in the variable registry.
    #[error("unknown variable '{name}'")]
    UnknownVariable {
        /// The dotted path that failed to resolve.
        name: String,
    },

    /// Unit cannot be converted to the variable's native unit.
    #[error("unit '{from}' is not convertible to '{to}'")]
    UnitMismatch {
        /// Unit supplied with the value.
        from: String,
        /// Native unit of the variable.
        to: String,
    },

    /// Expression failed to parse or evaluate.
    #[error("expression error: {0}")]
    Expression(String),

    // ===== Integration Core =====
    /// Attempt to change integration scheme after the run was set up.
    #[error("cannot switch integration scheme from {from} to {to} mid-run")]
    UnsupportedSchemeSwitch {
        /// Scheme selected at run setup.
        from: String,
        /// Scheme requested afterwards.
        to: String,
    },

    /// State vector length does not match the integrator's size.
    #[error("state vector has {found} components, integrator expects {expected}")]
    StateSizeMismatch {
        /// Size the integrator was built for.
        expected: usize,
        /// Size actually supplied.
        found: usize,
    },

    /// Numeric fault: NaN or Inf in the state.
    #[error("non-finite state at {location} (t = {time})")]
    NonFiniteState {
        /// Variable or component holding the non-finite value.
        location: String,
        /// Simulated time of detection.
        time: SimTime,
    },

    // ===== Monte Carlo Scheduler =====
    /// Slave stopped responding before returning a result.
    #[error("slave '{host}' unreachable: {reason}")]
    SlaveUnreachable {
        /// Slave identity.
        host: String,
        /// Transport-level reason.
        reason: String,
    },

    /// Slave answered but refused the request. Retrying elsewhere would fail
    /// the same way.
    #[error("slave '{host}' rejected the run: {reason}")]
    SlaveRejected {
        /// Slave identity.
        host: String,
        /// Reason reported by the slave.
        reason: String,
    },

    /// Every slave is unreachable and runs are still pending.
    #[error("insufficient capacity: {pending} run(s) pending with no reachable slave for {idle_secs:.3}s")]
    InsufficientCapacity {
        /// Runs that were never completed.
        pending: usize,
        /// Idle timeout that elapsed.
        idle_secs: f64,
    },

    /// Sweep or run aborted by the caller.
    #[error("cancelled")]
    Cancelled,

    // ===== Configuration Errors =====
    /// Invalid configuration parameter.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    // ===== Replay Errors =====
    /// Checkpoint integrity violation.
    #[error("Checkpoint integrity violation: hash mismatch")]
    CheckpointIntegrity,

    // ===== I/O Errors =====
    /// File or socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SimError {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an expression error.
    #[must_use]
    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression(message.into())
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create an unknown-variable error.
    #[must_use]
    pub fn unknown_variable(name: impl Into<String>) -> Self {
        Self::UnknownVariable { name: name.into() }
    }

    /// Create a slave-unreachable error.
    #[must_use]
    pub fn unreachable(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SlaveUnreachable {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Create a slave-rejected error.
    #[must_use]
    pub fn rejected(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SlaveRejected {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Transient errors trigger a requeue rather than a failed run.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SlaveUnreachable { .. })
    }

    /// Errors that abort the whole sweep instead of a single run.
    #[must_use]
    pub const fn is_fatal_to_sweep(&self) -> bool {
        matches!(self, Self::InsufficientCapacity { .. } | Self::Cancelled)
    }

    /// Numeric faults raised by the Jidoka guard.
    #[must_use]
    pub const fn is_numeric_fault(&self) -> bool {
        matches!(self, Self::NonFiniteState { .. })
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
