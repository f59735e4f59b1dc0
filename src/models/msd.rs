//! Mass-spring-damper: `m a = F - b v - k x`.

use crate::error::SimResult;
use crate::models::Dynamics;
use crate::registry::VariableRegistry;

const M: usize = 0;
const K: usize = 1;
const B: usize = 2;
const F: usize = 3;

/// Single-axis mass-spring-damper.
#[derive(Debug, Clone, Copy, Default)]
pub struct MassSpringDamper;

impl Dynamics for MassSpringDamper {
    fn name(&self) -> &str {
        "msd"
    }

    fn declare(&self, registry: &mut VariableRegistry) -> SimResult<()> {
        registry.declare_state("msd.x", 1.0, Some("m"))?;
        registry.declare_state("msd.v", 0.0, Some("m/s"))?;
        registry.declare_parameter("msd.m", 1.0, Some("kg"))?;
        registry.declare_parameter("msd.k", 100.0, Some("N/m"))?;
        registry.declare_parameter("msd.b", 0.0, Some("N.s/m"))?;
        registry.declare_parameter("msd.F", 0.0, Some("N"))?;
        registry.declare_calculated(
            "msd.a",
            "(msd.F - msd.b * msd.v - msd.k * msd.x) / msd.m",
            Some("m/s2"),
        )?;
        registry.declare_calculated(
            "msd.energy",
            "0.5 * msd.m * msd.v^2 + 0.5 * msd.k * msd.x^2",
            None,
        )?;
        Ok(())
    }

    fn derivatives(&self, _t: f64, state: &[f64], p: &[f64], dydt: &mut [f64]) {
        let (x, v) = (state[0], state[1]);
        dydt[0] = v;
        dydt[1] = (p[F] - p[B] * v - p[K] * x) / p[M];
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_acceleration_matches_calculated() {
        let mut registry = VariableRegistry::new();
        MassSpringDamper.declare(&mut registry).unwrap();
        let state = registry.instantiate();

        let mut dydt = [0.0; 2];
        MassSpringDamper.derivatives(0.0, state.continuous(), state.parameters(), &mut dydt);
        let a = registry
            .read(registry.resolve("msd.a").unwrap(), &state)
            .unwrap();
        assert_eq!(dydt[1], a);
        assert_eq!(a, -100.0);
    }

    #[test]
    fn test_energy_at_rest() {
        let mut registry = VariableRegistry::new();
        MassSpringDamper.declare(&mut registry).unwrap();
        let state = registry.instantiate();
        let e = registry
            .read(registry.resolve("msd.energy").unwrap(), &state)
            .unwrap();
        assert_eq!(e, 50.0);
    }
}
