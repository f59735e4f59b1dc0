//! Simulation state management.
//!
//! A run's state is two flat vectors: the continuous components advanced by
//! the integrator and the model parameters written by bindings and events.
//! The registry maps variable names onto indices in these vectors.

use serde::{Deserialize, Serialize};

use crate::engine::SimTime;
use crate::error::{SimError, SimResult};

/// Storage for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    /// Current simulation time.
    pub time: SimTime,
    /// Integrated state vector.
    continuous: Vec<f64>,
    /// Model parameters (constant between events).
    parameters: Vec<f64>,
}

impl SimState {
    /// Create state with the given continuous and parameter vectors.
    #[must_use]
    pub const fn new(continuous: Vec<f64>, parameters: Vec<f64>) -> Self {
        Self {
            time: SimTime::ZERO,
            continuous,
            parameters,
        }
    }

    /// Integrated state vector.
    #[must_use]
    pub fn continuous(&self) -> &[f64] {
        &self.continuous
    }

    /// Model parameters.
    #[must_use]
    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    /// Number of integrated components.
    #[must_use]
    pub fn state_len(&self) -> usize {
        self.continuous.len()
    }

    /// Replace the integrated state vector after a step.
    ///
    /// # Errors
    ///
    /// Returns `SimError::StateSizeMismatch` if the length changes.
    pub fn set_continuous(&mut self, next: Vec<f64>) -> SimResult<()> {
        if next.len() != self.continuous.len() {
            return Err(SimError::StateSizeMismatch {
                expected: self.continuous.len(),
                found: next.len(),
            });
        }
        self.continuous = next;
        Ok(())
    }

    /// Write one integrated component.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if `index` is out of range.
    pub fn set_state(&mut self, index: usize, value: f64) -> SimResult<()> {
        let slot = self
            .continuous
            .get_mut(index)
            .ok_or_else(|| SimError::config(format!("state index {index} out of range")))?;
        *slot = value;
        Ok(())
    }

    /// Write one parameter.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if `index` is out of range.
    pub fn set_parameter(&mut self, index: usize, value: f64) -> SimResult<()> {
        let slot = self
            .parameters
            .get_mut(index)
            .ok_or_else(|| SimError::config(format!("parameter index {index} out of range")))?;
        *slot = value;
        Ok(())
    }

    /// Check that every stored value is finite.
    #[must_use]
    pub fn all_finite(&self) -> bool {
        self.first_non_finite().is_none()
    }

    /// First storage slot holding NaN or Inf, if any.
    #[must_use]
    pub fn first_non_finite(&self) -> Option<Slot> {
        if let Some(i) = self.continuous.iter().position(|v| !v.is_finite()) {
            return Some(Slot::State(i));
        }
        self.parameters
            .iter()
            .position(|v| !v.is_finite())
            .map(Slot::Parameter)
    }
}

/// Index into one of the two state vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Integrated component.
    State(usize),
    /// Model parameter.
    Parameter(usize),
}
