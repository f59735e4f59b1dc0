//! Jidoka (自働化) - stop the line on numeric faults.
//!
//! The guard runs after every step, event and binding application. When any
//! stored value is NaN or Inf it stops the run and names the offending
//! variable, so the fault is reported where it appeared instead of
//! propagating into later samples.

use crate::engine::state::{SimState, Slot};
use crate::error::{SimError, SimResult};
use crate::registry::VariableRegistry;

/// Non-finite state detector.
#[derive(Debug, Clone, Default)]
pub struct JidokaGuard {
    /// Number of checks performed.
    checks: u64,
}

impl JidokaGuard {
    /// Create a new guard.
    #[must_use]
    pub const fn new() -> Self {
        Self { checks: 0 }
    }

    /// Number of checks performed so far.
    #[must_use]
    pub const fn checks(&self) -> u64 {
        self.checks
    }

    /// Check that every state and parameter value is finite.
    ///
    /// # Errors
    ///
    /// Returns `SimError::NonFiniteState` naming the first offending
    /// variable.
    pub fn check(&mut self, state: &SimState, registry: &VariableRegistry) -> SimResult<()> {
        self.checks += 1;
        match state.first_non_finite() {
            None => Ok(()),
            Some(slot) => Err(SimError::NonFiniteState {
                location: registry
                    .slot_name(slot)
                    .map_or_else(|| describe(slot), str::to_string),
                time: state.time,
            }),
        }
    }
}

fn describe(slot: Slot) -> String {
    match slot {
        Slot::State(i) => format!("state[{i}]"),
        Slot::Parameter(i) => format!("parameter[{i}]"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn registry() -> VariableRegistry {
        let mut registry = VariableRegistry::new();
        registry.declare_vector("ball.pos", 2, Some("m")).unwrap();
        registry.declare_parameter("ball.mass", 1.0, Some("kg")).unwrap();
        registry
    }

    #[test]
    fn test_finite_state_passes() {
        let registry = registry();
        let state = registry.instantiate();
        let mut guard = JidokaGuard::new();
        assert!(guard.check(&state, &registry).is_ok());
        assert_eq!(guard.checks(), 1);
    }

    #[test]
    fn test_nan_state_names_variable() {
        let registry = registry();
        let mut state = registry.instantiate();
        state.set_state(1, f64::NAN).unwrap();

        let err = JidokaGuard::new().check(&state, &registry).unwrap_err();
        match err {
            SimError::NonFiniteState { location, .. } => assert_eq!(location, "ball.pos[1]"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_infinite_parameter_names_variable() {
        let registry = registry();
        let mut state = registry.instantiate();
        state.set_parameter(0, f64::NEG_INFINITY).unwrap();

        let err = JidokaGuard::new().check(&state, &registry).unwrap_err();
        assert!(err.to_string().contains("ball.mass"));
    }

    #[test]
    fn test_unmapped_slot_falls_back_to_index() {
        let registry = VariableRegistry::new();
        let mut state = SimState::new(vec![f64::NAN], vec![]);
        state.time = crate::engine::SimTime::from_secs(2.0);
        let err = JidokaGuard::new().check(&state, &registry).unwrap_err();
        assert!(err.to_string().contains("state[0]"));
    }
}
