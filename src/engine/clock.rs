//! Simulation clock management.
//!
//! Fixed-step time progression. A step may be shortened so that the clock
//! lands exactly on the next event or the terminate time.

use serde::{Deserialize, Serialize};

use crate::engine::SimTime;
use crate::error::{SimError, SimResult};

/// Simulation clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulation time.
    current: SimTime,
    /// Nominal timestep in nanoseconds.
    timestep_nanos: u64,
    /// Number of steps taken.
    step_count: u64,
}

impl SimClock {
    /// Create a new clock with the given timestep in seconds.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if the timestep is not positive, not
    /// finite, or rounds to zero nanoseconds.
    pub fn new(timestep_secs: f64) -> SimResult<Self> {
        if !timestep_secs.is_finite() || timestep_secs <= 0.0 {
            return Err(SimError::config(format!(
                "timestep must be positive and finite, got {timestep_secs}"
            )));
        }
        let timestep_nanos = SimTime::from_secs(timestep_secs).as_nanos();
        if timestep_nanos == 0 {
            return Err(SimError::config(format!(
                "timestep {timestep_secs} is below clock resolution"
            )));
        }
        Ok(Self {
            current: SimTime::ZERO,
            timestep_nanos,
            step_count: 0,
        })
    }

    /// Get current simulation time.
    #[must_use]
    pub const fn current_time(&self) -> SimTime {
        self.current
    }

    /// Get nominal timestep in nanoseconds.
    #[must_use]
    pub const fn timestep_nanos(&self) -> u64 {
        self.timestep_nanos
    }

    /// Get number of steps taken.
    #[must_use]
    pub const fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Length of the next step toward `target`: the nominal timestep, or
    /// less if `target` is closer.
    #[must_use]
    pub fn step_toward(&self, target: SimTime) -> u64 {
        let remaining = target.as_nanos().saturating_sub(self.current.as_nanos());
        remaining.min(self.timestep_nanos)
    }

    /// Advance the clock by `nanos` and count one step.
    #[allow(clippy::missing_const_for_fn)] // Mutable const not stable
    pub fn advance(&mut self, nanos: u64) -> SimTime {
        self.current = self.current.add_nanos(nanos);
        self.step_count += 1;
        self.current
    }

    /// Set time and step count (for checkpoint restore).
    #[allow(clippy::missing_const_for_fn)]
    pub fn restore(&mut self, time: SimTime, step_count: u64) {
        self.current = time;
        self.step_count = step_count;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_creation() {
        let clock = SimClock::new(0.001).unwrap();
        assert_eq!(clock.current_time(), SimTime::ZERO);
        assert_eq!(clock.timestep_nanos(), 1_000_000);
        assert_eq!(clock.step_count(), 0);
    }

    #[test]
    fn test_clock_rejects_bad_timestep() {
        assert!(SimClock::new(0.0).is_err());
        assert!(SimClock::new(-0.1).is_err());
        assert!(SimClock::new(f64::NAN).is_err());
        assert!(SimClock::new(1e-12).is_err());
    }

    #[test]
    fn test_clock_advance() {
        let mut clock = SimClock::new(0.01).unwrap();
        clock.advance(clock.timestep_nanos());
        clock.advance(clock.timestep_nanos());
        assert_eq!(clock.step_count(), 2);
        assert_eq!(clock.current_time(), SimTime::from_secs(0.02));
    }

    #[test]
    fn test_step_toward_shortens_final_step() {
        let mut clock = SimClock::new(0.3).unwrap();
        let target = SimTime::from_secs(1.0);

        let mut steps = Vec::new();
        while clock.current_time() < target {
            let h = clock.step_toward(target);
            steps.push(h);
            clock.advance(h);
        }

        assert_eq!(steps, vec![300_000_000, 300_000_000, 300_000_000, 100_000_000]);
        assert_eq!(clock.current_time(), target);
    }

    #[test]
    fn test_step_toward_past_target_is_zero() {
        let mut clock = SimClock::new(0.1).unwrap();
        clock.advance(500_000_000);
        assert_eq!(clock.step_toward(SimTime::from_secs(0.2)), 0);
    }

    #[test]
    fn test_clock_restore() {
        let mut clock = SimClock::new(0.1).unwrap();
        clock.restore(SimTime::from_secs(5.0), 50);
        assert_eq!(clock.current_time(), SimTime::from_secs(5.0));
        assert_eq!(clock.step_count(), 50);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Falsification: stepping toward a target always lands on it exactly.
        #[test]
        fn prop_lands_exactly_on_target(
            dt in 0.001f64..1.0,
            target in 0.0f64..50.0,
        ) {
            let mut clock = SimClock::new(dt).unwrap();
            let target = SimTime::from_secs(target);
            while clock.current_time() < target {
                let h = clock.step_toward(target);
                prop_assert!(h > 0);
                prop_assert!(h <= clock.timestep_nanos());
                clock.advance(h);
            }
            prop_assert_eq!(clock.current_time(), target);
        }
    }
}
