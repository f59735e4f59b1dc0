//! Spinning cannonball with drag, Magnus lift and four timed jets.
//!
//! State is `dyn.baseball.pos[0..3]` then `dyn.baseball.vel[0..3]`, with
//! `z` (index 2) up. Each jet pushes along `+z` for `jet_duration` seconds
//! starting at its `time_to_fire_jet_N`.

use crate::error::SimResult;
use crate::models::Dynamics;
use crate::registry::VariableRegistry;

const MASS: usize = 0;
const RADIUS: usize = 1;
const CD: usize = 2;
const RHO: usize = 3;
const MAGNUS: usize = 4;
const THETA: usize = 5;
const PHI: usize = 6;
const OMEGA0: usize = 7;
const GRAVITY: usize = 8;
const JET_FORCE: usize = 9;
const JET_DURATION: usize = 10;
const FIRST_JET: usize = 11;
const JETS: usize = 4;

/// Cannon "amoeba" baseball.
#[derive(Debug, Clone, Copy, Default)]
pub struct Baseball;

impl Dynamics for Baseball {
    fn name(&self) -> &str {
        "baseball"
    }

    fn declare(&self, registry: &mut VariableRegistry) -> SimResult<()> {
        registry.declare_vector("dyn.baseball.pos", 3, Some("m"))?;
        registry.declare_vector("dyn.baseball.vel", 3, Some("m/s"))?;

        registry.declare_parameter("dyn.baseball.mass", 0.145, Some("kg"))?;
        registry.declare_parameter("dyn.baseball.radius", 0.0366, Some("m"))?;
        registry.declare_parameter("dyn.baseball.cd", 0.35, Some("--"))?;
        registry.declare_parameter("dyn.baseball.rho", 1.29, Some("kg/m3"))?;
        registry.declare_parameter("dyn.baseball.magnus", 1.0, Some("--"))?;
        registry.declare_parameter("dyn.baseball.theta", 0.0, Some("rad"))?;
        registry.declare_parameter("dyn.baseball.phi", 0.0, Some("rad"))?;
        registry.declare_parameter("dyn.baseball.omega0", 0.0, Some("rad/s"))?;
        registry.declare_parameter("dyn.baseball.g", 9.81, Some("m/s2"))?;
        registry.declare_parameter("dyn.baseball.jet_force", 5.0, Some("N"))?;
        registry.declare_parameter("dyn.baseball.jet_duration", 0.1, Some("s"))?;
        for jet in 1..=JETS {
            registry.declare_parameter(
                &format!("dyn.baseball.time_to_fire_jet_{jet}"),
                jet as f64,
                Some("s"),
            )?;
        }

        registry.declare_calculated(
            "dyn.baseball.speed",
            "sqrt(dyn.baseball.vel[0]^2 + dyn.baseball.vel[1]^2 + dyn.baseball.vel[2]^2)",
            Some("m/s"),
        )?;
        registry.declare_calculated(
            "dyn.baseball.range",
            "sqrt(dyn.baseball.pos[0]^2 + dyn.baseball.pos[1]^2)",
            Some("m"),
        )?;
        Ok(())
    }

    fn derivatives(&self, t: f64, state: &[f64], p: &[f64], dydt: &mut [f64]) {
        let vel = [state[3], state[4], state[5]];
        let speed = (vel[0] * vel[0] + vel[1] * vel[1] + vel[2] * vel[2]).sqrt();
        let mass = p[MASS];
        let area = std::f64::consts::PI * p[RADIUS] * p[RADIUS];
        let dynamic = 0.5 * p[RHO] * area / mass;

        // Spin axis from its two angles.
        let axis = [
            p[THETA].sin() * p[PHI].cos(),
            p[THETA].sin() * p[PHI].sin(),
            p[THETA].cos(),
        ];
        // Lift coefficient grows with spin ratio r·ω/|v|.
        let spin_ratio = if speed > f64::EPSILON {
            p[RADIUS] * p[OMEGA0] / speed
        } else {
            0.0
        };
        let lift = dynamic * p[MAGNUS] * spin_ratio * speed;
        let cross = [
            axis[1] * vel[2] - axis[2] * vel[1],
            axis[2] * vel[0] - axis[0] * vel[2],
            axis[0] * vel[1] - axis[1] * vel[0],
        ];

        let firing = (0..JETS)
            .filter(|i| {
                let start = p[FIRST_JET + i];
                t >= start && t < start + p[JET_DURATION]
            })
            .count();
        let thrust = firing as f64 * p[JET_FORCE] / mass;

        for i in 0..3 {
            dydt[i] = vel[i];
            dydt[3 + i] = -dynamic * p[CD] * speed * vel[i] + lift * cross[i];
        }
        dydt[5] += thrust - p[GRAVITY];
    }
}
