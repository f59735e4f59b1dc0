//! Planar ball pulled toward a fixed point by a constant-magnitude force.

use crate::error::SimResult;
use crate::models::Dynamics;
use crate::registry::VariableRegistry;

const MASS: usize = 0;
const FORCE: usize = 1;
const ORIGIN_X: usize = 2;
const ORIGIN_Y: usize = 3;

/// Ball on a constant central force.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ball;

impl Dynamics for Ball {
    fn name(&self) -> &str {
        "ball"
    }

    fn declare(&self, registry: &mut VariableRegistry) -> SimResult<()> {
        registry.declare_state("ball.state.position[0]", 5.0, Some("m"))?;
        registry.declare_state("ball.state.position[1]", 5.0, Some("m"))?;
        registry.declare_state("ball.state.velocity[0]", 3.5, Some("m/s"))?;
        registry.declare_state("ball.state.velocity[1]", -0.5, Some("m/s"))?;
        registry.declare_parameter("ball.state.mass", 10.0, Some("kg"))?;
        registry.declare_parameter("ball.force.magnitude", 8.0, Some("N"))?;
        registry.declare_parameter("ball.force.origin[0]", 0.0, Some("m"))?;
        registry.declare_parameter("ball.force.origin[1]", 2.0, Some("m"))?;
        registry.declare_calculated(
            "ball.state.radius",
            "sqrt((ball.state.position[0] - ball.force.origin[0])^2 \
             + (ball.state.position[1] - ball.force.origin[1])^2)",
            Some("m"),
        )?;
        Ok(())
    }

    fn derivatives(&self, _t: f64, state: &[f64], p: &[f64], dydt: &mut [f64]) {
        let dx = p[ORIGIN_X] - state[0];
        let dy = p[ORIGIN_Y] - state[1];
        let r = (dx * dx + dy * dy).sqrt();
        let (ux, uy) = if r > f64::EPSILON { (dx / r, dy / r) } else { (0.0, 0.0) };
        let a = p[FORCE] / p[MASS];

        dydt[0] = state[2];
        dydt[1] = state[3];
        dydt[2] = a * ux;
        dydt[3] = a * uy;
    }
}
