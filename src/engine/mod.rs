//! Run execution engine.
//!
//! Drives a single simulation run with:
//! - Fixed-point simulation time
//! - Event scheduling with deterministic ordering
//! - Jidoka guards for stop-on-error
//! - Deterministic RNG (PCG with partitioned seeds)

pub mod clock;
pub mod executor;
pub mod jidoka;
pub mod rng;
pub mod run;
pub mod scheduler;
pub mod state;

use serde::{Deserialize, Serialize};

pub use clock::SimClock;
pub use executor::{CancelFlag, ExecutorPhase, RunExecutor};
pub use jidoka::JidokaGuard;
pub use rng::SimRng;
pub use run::{Binding, BindingValue, RecordSpec, RunConfig, RunId, RunResult, RunStatus};
pub use scheduler::{EventAction, EventScheduler, ScheduleEvent, ScheduledEvent, Trigger};
pub use state::SimState;

use crate::error::{SimError, SimResult};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Simulation time representation.
///
/// Uses a fixed-point representation for reproducibility across platforms.
/// Internal representation is in nanoseconds so periodic triggers such as
/// `55 s, 110 s, 165 s` land exactly instead of drifting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct SimTime {
    /// Time in nanoseconds from simulation start.
    nanos: u64,
}

impl SimTime {
    /// Zero time (simulation start).
    pub const ZERO: Self = Self { nanos: 0 };

    /// Create time from seconds, rounded to the nearest nanosecond.
    ///
    /// # Panics
    ///
    /// Panics if seconds is negative or not finite.
    #[must_use]
    pub fn from_secs(secs: f64) -> Self {
        assert!(secs >= 0.0, "SimTime cannot be negative");
        assert!(secs.is_finite(), "SimTime must be finite");
        Self {
            nanos: (secs * NANOS_PER_SEC).round() as u64,
        }
    }

    /// Fallible version of [`SimTime::from_secs`] for values read from
    /// configuration or the wire.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if `secs` is negative or not finite.
    pub fn try_from_secs(secs: f64) -> SimResult<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(SimError::config(format!(
                "time must be finite and non-negative, got {secs}"
            )));
        }
        Ok(Self::from_secs(secs))
    }

    /// Create time from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Get time as seconds (f64).
    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_SEC
    }

    /// Get time as nanoseconds.
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Add duration to time, saturating at `u64::MAX` nanoseconds.
    #[must_use]
    pub const fn add_nanos(self, nanos: u64) -> Self {
        Self {
            nanos: self.nanos.saturating_add(nanos),
        }
    }

    /// Subtract duration from time, saturating at zero.
    #[must_use]
    pub const fn saturating_sub_nanos(self, nanos: u64) -> Self {
        Self {
            nanos: self.nanos.saturating_sub(nanos),
        }
    }
}

impl std::ops::Add for SimTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.add_nanos(rhs.nanos)
    }
}

impl std::ops::Sub for SimTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub_nanos(rhs.nanos)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.9}s", self.as_secs_f64())
    }
}
