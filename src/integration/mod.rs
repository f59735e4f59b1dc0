//! Integration Core.
//!
//! Fixed-step integrators for a flat state vector:
//! - Euler (1st order)
//! - RK2 / Heun (2nd order)
//! - RK4 (4th order, self-starting)
//! - ABM4: Adams-Bashforth-Moulton predictor-corrector (4th order multistep)
//!
//! The scheme is a closed enum chosen once at run setup. Multistep working
//! state lives in [`DerivativeHistory`], owned by the [`Integrator`] of one
//! run and dropped when the run ends.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::engine::SimTime;
use crate::error::{SimError, SimResult};

/// Right-hand side of `dy/dt = f(t, y)`.
pub trait Derivatives {
    /// Write `f(t, y)` into `dydt`.
    fn eval(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

impl<F> Derivatives for F
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    fn eval(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        self(t, y, dydt);
    }
}

/// Integration method tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrationScheme {
    /// Forward Euler.
    Euler,
    /// Heun's method (explicit trapezoid).
    RungeKutta2,
    /// Classical Runge-Kutta.
    #[default]
    RungeKutta4,
    /// Adams-Bashforth-Moulton PECE, 4th order.
    AdamsBashforthMoulton4,
}

impl IntegrationScheme {
    /// Stable label used in logs and configuration.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Euler => "euler",
            Self::RungeKutta2 => "runge-kutta-2",
            Self::RungeKutta4 => "runge-kutta-4",
            Self::AdamsBashforthMoulton4 => "adams-bashforth-moulton-4",
        }
    }

    /// Global error order once fully started.
    #[must_use]
    pub const fn error_order(self) -> u32 {
        match self {
            Self::Euler => 1,
            Self::RungeKutta2 => 2,
            Self::RungeKutta4 | Self::AdamsBashforthMoulton4 => 4,
        }
    }

    /// Check if the scheme keeps derivative history between steps.
    #[must_use]
    pub const fn is_multistep(self) -> bool {
        matches!(self, Self::AdamsBashforthMoulton4)
    }
}

impl std::fmt::Display for IntegrationScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for IntegrationScheme {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('_', "-");
        match key.as_str() {
            "euler" => Ok(Self::Euler),
            "rk2" | "heun" | "runge-kutta-2" => Ok(Self::RungeKutta2),
            "rk4" | "runge-kutta-4" => Ok(Self::RungeKutta4),
            "abm" | "abm4" | "abm-method" | "adams-bashforth-moulton-4" => {
                Ok(Self::AdamsBashforthMoulton4)
            }
            _ => Err(SimError::config(format!("unknown integration scheme '{s}'"))),
        }
    }
}

/// Prior derivative evaluations for multistep schemes.
///
/// Most recent first. Valid only for the step size it was built with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivativeHistory {
    dt: Option<f64>,
    past: VecDeque<Vec<f64>>,
}

impl DerivativeHistory {
    /// Derivatives kept for ABM4 (f_{n-1}, f_{n-2}, f_{n-3}).
    pub const DEPTH: usize = 3;

    /// Number of stored derivatives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.past.len()
    }

    /// Check if the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.past.is_empty()
    }

    /// Drop stored derivatives if they were taken with another step size.
    fn align(&mut self, dt: f64) {
        if self.dt.map(f64::to_bits) != Some(dt.to_bits()) {
            self.past.clear();
            self.dt = Some(dt);
        }
    }

    fn push(&mut self, f: Vec<f64>) {
        self.past.push_front(f);
        self.past.truncate(Self::DEPTH);
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.past.clear();
        self.dt = None;
    }
}

/// One run's integrator: scheme, state size and working state.
#[derive(Debug, Clone)]
pub struct Integrator {
    scheme: IntegrationScheme,
    size: usize,
    history: DerivativeHistory,
    evaluations: u64,
}

impl Integrator {
    /// Create an integrator for a state of `size` components.
    #[must_use]
    pub fn new(scheme: IntegrationScheme, size: usize) -> Self {
        Self {
            scheme,
            size,
            history: DerivativeHistory::default(),
            evaluations: 0,
        }
    }

    /// Selected scheme.
    #[must_use]
    pub const fn scheme(&self) -> IntegrationScheme {
        self.scheme
    }

    /// State size this integrator accepts.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Derivative evaluations performed so far.
    #[must_use]
    pub const fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Request a scheme after construction.
    ///
    /// # Errors
    ///
    /// Returns `SimError::UnsupportedSchemeSwitch` for any scheme other
    /// than the one selected at construction.
    pub fn select(&self, scheme: IntegrationScheme) -> SimResult<()> {
        if scheme == self.scheme {
            Ok(())
        } else {
            Err(SimError::UnsupportedSchemeSwitch {
                from: self.scheme.to_string(),
                to: scheme.to_string(),
            })
        }
    }

    /// Multistep working state.
    #[must_use]
    pub const fn history(&self) -> &DerivativeHistory {
        &self.history
    }

    /// Replace the working state (checkpoint restore).
    pub fn restore_history(&mut self, history: DerivativeHistory) {
        self.history = history;
    }

    /// Advance `y` from `t` to `t + dt`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::StateSizeMismatch` if `y` has the wrong length and
    /// `SimError::NonFiniteState` if the result contains NaN or Inf.
    pub fn step(&mut self, t: f64, dt: f64, y: &[f64], f: &dyn Derivatives) -> SimResult<Vec<f64>> {
        if y.len() != self.size {
            return Err(SimError::StateSizeMismatch {
                expected: self.size,
                found: y.len(),
            });
        }

        let next = match self.scheme {
            IntegrationScheme::Euler => self.euler(t, dt, y, f),
            IntegrationScheme::RungeKutta2 => self.heun(t, dt, y, f),
            IntegrationScheme::RungeKutta4 => self.rk4(t, dt, y, f),
            IntegrationScheme::AdamsBashforthMoulton4 => self.abm4(t, dt, y, f),
        };

        if let Some(i) = next.iter().position(|v| !v.is_finite()) {
            return Err(SimError::NonFiniteState {
                location: format!("state[{i}]"),
                time: SimTime::try_from_secs(t + dt).unwrap_or_default(),
            });
        }
        Ok(next)
    }

    fn derivative(&mut self, f: &dyn Derivatives, t: f64, y: &[f64]) -> Vec<f64> {
        self.evaluations += 1;
        let mut dydt = vec![0.0; y.len()];
        f.eval(t, y, &mut dydt);
        dydt
    }

    /// y_{n+1} = y_n + h * f(t_n, y_n)
    fn euler(&mut self, t: f64, h: f64, y: &[f64], f: &dyn Derivatives) -> Vec<f64> {
        let k1 = self.derivative(f, t, y);
        combine(y, h, &[(1.0, &k1)])
    }

    fn heun(&mut self, t: f64, h: f64, y: &[f64], f: &dyn Derivatives) -> Vec<f64> {
        let k1 = self.derivative(f, t, y);
        let predicted = combine(y, h, &[(1.0, &k1)]);
        let k2 = self.derivative(f, t + h, &predicted);
        combine(y, h / 2.0, &[(1.0, &k1), (1.0, &k2)])
    }

    /// Classical RK4:
    ///
    /// ```text
    /// k1 = f(t, y)
    /// k2 = f(t + h/2, y + h/2 k1)
    /// k3 = f(t + h/2, y + h/2 k2)
    /// k4 = f(t + h,   y + h k3)
    /// y' = y + h/6 (k1 + 2 k2 + 2 k3 + k4)
    /// ```
    fn rk4(&mut self, t: f64, h: f64, y: &[f64], f: &dyn Derivatives) -> Vec<f64> {
        let half = h / 2.0;
        let k1 = self.derivative(f, t, y);
        let k2 = self.derivative(f, t + half, &combine(y, half, &[(1.0, &k1)]));
        let k3 = self.derivative(f, t + half, &combine(y, half, &[(1.0, &k2)]));
        let k4 = self.derivative(f, t + h, &combine(y, h, &[(1.0, &k3)]));
        combine(y, h / 6.0, &[(1.0, &k1), (2.0, &k2), (2.0, &k3), (1.0, &k4)])
    }

    /// Adams-Bashforth predictor, Adams-Moulton corrector (PECE).
    ///
    /// With k stored derivatives the pair has order min(k + 1, 4):
    ///
    /// ```text
    /// k=0  P: y + h f_n                                   C: y + h/2  (f* + f_n)
    /// k=1  P: y + h/2  (3 f_n - f_{n-1})                  C: y + h/12 (5 f* + 8 f_n - f_{n-1})
    /// k=2  P: y + h/12 (23 f_n - 16 f_{n-1} + 5 f_{n-2})  C: y + h/24 (9 f* + 19 f_n - 5 f_{n-1} + f_{n-2})
    /// k=3  P: y + h/24 (55 f_n - 59 f_{n-1} + 37 f_{n-2} - 9 f_{n-3})   C: as k=2
    /// ```
    fn abm4(&mut self, t: f64, h: f64, y: &[f64], f: &dyn Derivatives) -> Vec<f64> {
        self.history.align(h);
        let fn0 = self.derivative(f, t, y);

        let past = &self.history.past;
        let predicted = match (past.front(), past.get(1), past.get(2)) {
            (Some(f1), Some(f2), Some(f3)) => combine(
                y,
                h / 24.0,
                &[(55.0, &fn0), (-59.0, f1), (37.0, f2), (-9.0, f3)],
            ),
            (Some(f1), Some(f2), None) => {
                combine(y, h / 12.0, &[(23.0, &fn0), (-16.0, f1), (5.0, f2)])
            }
            (Some(f1), None, _) => combine(y, h / 2.0, &[(3.0, &fn0), (-1.0, f1)]),
            (None, ..) => combine(y, h, &[(1.0, &fn0)]),
        };

        let f_star = self.derivative(f, t + h, &predicted);

        let past = &self.history.past;
        let corrected = match (past.front(), past.get(1)) {
            (Some(f1), Some(f2)) => combine(
                y,
                h / 24.0,
                &[(9.0, &f_star), (19.0, &fn0), (-5.0, f1), (1.0, f2)],
            ),
            (Some(f1), None) => combine(y, h / 12.0, &[(5.0, &f_star), (8.0, &fn0), (-1.0, f1)]),
            (None, _) => combine(y, h / 2.0, &[(1.0, &f_star), (1.0, &fn0)]),
        };

        self.history.push(fn0);
        corrected
    }
}

/// `y + scale * Σ weight_i * k_i`
fn combine(y: &[f64], scale: f64, terms: &[(f64, &Vec<f64>)]) -> Vec<f64> {
    y.iter()
        .enumerate()
        .map(|(i, yi)| {
            let sum: f64 = terms.iter().map(|(w, k)| w * k[i]).sum();
            yi + scale * sum
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn decay(_t: f64, y: &[f64], dydt: &mut [f64]) {
        dydt[0] = -y[0];
    }

    /// x'' = -x as [x, v].
    fn oscillator(_t: f64, y: &[f64], dydt: &mut [f64]) {
        dydt[0] = y[1];
        dydt[1] = -y[0];
    }

    fn integrate(scheme: IntegrationScheme, h: f64, steps: usize) -> Vec<f64> {
        let mut integrator = Integrator::new(scheme, 2);
        let mut y = vec![1.0, 0.0];
        for n in 0..steps {
            y = integrator.step(n as f64 * h, h, &y, &oscillator).unwrap();
        }
        y
    }

    #[test]
    fn test_rk4_exponential_decay() {
        let mut integrator = Integrator::new(IntegrationScheme::RungeKutta4, 1);
        let mut y = vec![1.0];
        for n in 0..10 {
            y = integrator.step(n as f64 * 0.1, 0.1, &y, &decay).unwrap();
        }
        assert!((y[0] - (-1.0f64).exp()).abs() < 1e-6);
        assert_eq!(integrator.evaluations(), 40);
    }

    #[test]
    fn test_euler_single_step() {
        let mut integrator = Integrator::new(IntegrationScheme::Euler, 1);
        let y = integrator.step(0.0, 0.5, &[2.0], &decay).unwrap();
        assert_eq!(y, vec![1.0]);
    }

    #[test]
    fn test_heun_is_second_order() {
        let coarse = (integrate(IntegrationScheme::RungeKutta2, 0.02, 50)[0] - 1.0f64.cos()).abs();
        let fine = (integrate(IntegrationScheme::RungeKutta2, 0.01, 100)[0] - 1.0f64.cos()).abs();
        let ratio = coarse / fine;
        assert!((3.0..5.0).contains(&ratio), "ratio = {ratio}");
    }

    #[test]
    fn test_abm_beats_euler() {
        let exact = 1.0f64.cos();
        let euler = (integrate(IntegrationScheme::Euler, 0.01, 100)[0] - exact).abs();
        let abm = (integrate(IntegrationScheme::AdamsBashforthMoulton4, 0.01, 100)[0] - exact).abs();
        assert!(euler > 1e-3, "euler error {euler}");
        assert!(abm < 1e-5, "abm error {abm}");
    }

    #[test]
    fn test_abm_uses_two_evaluations_per_step() {
        let mut integrator = Integrator::new(IntegrationScheme::AdamsBashforthMoulton4, 2);
        let mut y = vec![1.0, 0.0];
        for n in 0..5 {
            y = integrator.step(n as f64 * 0.1, 0.1, &y, &oscillator).unwrap();
        }
        assert_eq!(integrator.evaluations(), 10);
        assert_eq!(integrator.history().len(), DerivativeHistory::DEPTH);
    }

    #[test]
    fn test_abm_history_clears_on_step_change() {
        let mut integrator = Integrator::new(IntegrationScheme::AdamsBashforthMoulton4, 2);
        let mut y = vec![1.0, 0.0];
        for n in 0..4 {
            y = integrator.step(n as f64 * 0.1, 0.1, &y, &oscillator).unwrap();
        }
        assert_eq!(integrator.history().len(), 3);

        integrator.step(0.4, 0.05, &y, &oscillator).unwrap();
        assert_eq!(integrator.history().len(), 1);
    }

    #[test]
    fn test_state_size_mismatch() {
        let mut integrator = Integrator::new(IntegrationScheme::RungeKutta4, 6);
        let err = integrator
            .step(0.0, 0.1, &[0.0; 4], &|_t: f64, _y: &[f64], _d: &mut [f64]| {})
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::StateSizeMismatch {
                expected: 6,
                found: 4
            }
        ));
        assert!(integrator
            .step(0.0, 0.1, &[0.0; 6], &|_t: f64, _y: &[f64], _d: &mut [f64]| {})
            .is_ok());
    }

    #[test]
    fn test_scheme_switch_rejected() {
        let integrator = Integrator::new(IntegrationScheme::RungeKutta4, 6);
        assert!(integrator.select(IntegrationScheme::RungeKutta4).is_ok());
        let err = integrator
            .select(IntegrationScheme::AdamsBashforthMoulton4)
            .unwrap_err();
        assert!(matches!(err, SimError::UnsupportedSchemeSwitch { .. }));
    }

    #[test]
    fn test_non_finite_output() {
        let mut integrator = Integrator::new(IntegrationScheme::Euler, 2);
        let blowup = |_t: f64, _y: &[f64], d: &mut [f64]| {
            d[0] = 0.0;
            d[1] = f64::INFINITY;
        };
        let err = integrator.step(0.0, 0.1, &[0.0, 0.0], &blowup).unwrap_err();
        match err {
            SimError::NonFiniteState { location, .. } => assert_eq!(location, "state[1]"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_restore_history_reproduces_steps() {
        let mut a = Integrator::new(IntegrationScheme::AdamsBashforthMoulton4, 2);
        let mut y = vec![1.0, 0.0];
        for n in 0..3 {
            y = a.step(n as f64 * 0.1, 0.1, &y, &oscillator).unwrap();
        }
        let mut b = Integrator::new(IntegrationScheme::AdamsBashforthMoulton4, 2);
        b.restore_history(a.history().clone());

        let ya = a.step(0.3, 0.1, &y, &oscillator).unwrap();
        let yb = b.step(0.3, 0.1, &y, &oscillator).unwrap();
        assert_eq!(ya, yb);
    }

    #[test]
    fn test_scheme_parsing() {
        assert_eq!(
            "Runge_Kutta_4".parse::<IntegrationScheme>().unwrap(),
            IntegrationScheme::RungeKutta4
        );
        assert_eq!(
            "ABM_Method".parse::<IntegrationScheme>().unwrap(),
            IntegrationScheme::AdamsBashforthMoulton4
        );
        assert_eq!("euler".parse::<IntegrationScheme>().unwrap(), IntegrationScheme::Euler);
        assert!("verlet".parse::<IntegrationScheme>().is_err());
        assert_eq!(IntegrationScheme::default().to_string(), "runge-kutta-4");
    }

    #[test]
    fn test_scheme_serde_kebab() {
        let json = serde_json::to_string(&IntegrationScheme::AdamsBashforthMoulton4).unwrap();
        assert_eq!(json, "\"adams-bashforth-moulton-4\"");
    }
}
