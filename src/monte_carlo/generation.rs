//! Value generation for Monte Carlo variables.
//!
//! Each varying variable carries a [`GenerationRule`] that produces its value
//! for one run. Rules draw from the run's own RNG stream, so the value a run
//! receives depends only on the sweep seed and the run id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::engine::rng::SimRng;
use crate::engine::RunId;
use crate::error::{SimError, SimResult};
use crate::registry::{EvalContext, Expr};

/// Inputs available to a rule while generating one run's value.
#[derive(Debug)]
pub struct GenerationContext<'a> {
    /// Run being generated.
    pub run: RunId,
    /// Total runs in the sweep.
    pub num_runs: usize,
    /// The run's RNG stream.
    pub rng: &'a mut SimRng,
}

/// Strategy producing a variable's value per run.
pub trait GenerationRule: Send + Sync + fmt::Debug {
    /// Value for the run described by `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule cannot produce a finite value.
    fn generate(&self, ctx: &mut GenerationContext<'_>) -> SimResult<f64>;
}

/// Same value for every run.
#[derive(Debug, Clone, Copy)]
pub struct Fixed(pub f64);

impl GenerationRule for Fixed {
    fn generate(&self, _ctx: &mut GenerationContext<'_>) -> SimResult<f64> {
        Ok(self.0)
    }
}

/// Uniform draw from `[min, max)`.
#[derive(Debug, Clone, Copy)]
pub struct Uniform {
    min: f64,
    max: f64,
}

impl Uniform {
    /// Create a uniform rule.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` unless `min <= max` and both are finite.
    pub fn new(min: f64, max: f64) -> SimResult<Self> {
        if !(min.is_finite() && max.is_finite() && min <= max) {
            return Err(SimError::config(format!(
                "uniform range [{min}, {max}) is invalid"
            )));
        }
        Ok(Self { min, max })
    }
}

impl GenerationRule for Uniform {
    fn generate(&self, ctx: &mut GenerationContext<'_>) -> SimResult<f64> {
        Ok(ctx.rng.gen_range_f64(self.min, self.max))
    }
}

/// Normal draw, optionally clamped.
#[derive(Debug, Clone, Copy)]
pub struct Gaussian {
    mean: f64,
    std_dev: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Gaussian {
    /// Create an unclamped normal rule.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` for a negative or non-finite deviation.
    pub fn new(mean: f64, std_dev: f64) -> SimResult<Self> {
        if !(mean.is_finite() && std_dev.is_finite() && std_dev >= 0.0) {
            return Err(SimError::config(format!(
                "gaussian N({mean}, {std_dev}) is invalid"
            )));
        }
        Ok(Self {
            mean,
            std_dev,
            min: None,
            max: None,
        })
    }

    /// Clamp samples into `[min, max]`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if `min > max`.
    pub fn clamped(mut self, min: Option<f64>, max: Option<f64>) -> SimResult<Self> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(SimError::config(format!("clamp [{lo}, {hi}] is empty")));
            }
        }
        self.min = min;
        self.max = max;
        Ok(self)
    }
}

impl GenerationRule for Gaussian {
    fn generate(&self, ctx: &mut GenerationContext<'_>) -> SimResult<f64> {
        let mut value = ctx.rng.gen_normal(self.mean, self.std_dev);
        if let Some(lo) = self.min {
            value = value.max(lo);
        }
        if let Some(hi) = self.max {
            value = value.min(hi);
        }
        Ok(value)
    }
}

/// Value looked up by run id, cycling when the table is shorter than the
/// sweep.
#[derive(Debug, Clone)]
pub struct Table(Vec<f64>);

impl Table {
    /// Create a table rule.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` for an empty table.
    pub fn new(values: Vec<f64>) -> SimResult<Self> {
        if values.is_empty() {
            return Err(SimError::config("table rule needs at least one value"));
        }
        Ok(Self(values))
    }
}

impl GenerationRule for Table {
    fn generate(&self, ctx: &mut GenerationContext<'_>) -> SimResult<f64> {
        let index = usize::try_from(ctx.run.0).unwrap_or(usize::MAX) % self.0.len();
        self.0
            .get(index)
            .copied()
            .ok_or_else(|| SimError::config("table index out of range"))
    }
}

const RUN: usize = 0;
const NUM_RUNS: usize = 1;

/// Expression over `run` and `num_runs`, e.g. `1 + 0.5 * run`.
#[derive(Debug, Clone)]
pub struct ExpressionRule(Expr);

impl ExpressionRule {
    /// Parse a rule expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression does not parse or names anything
    /// other than `run`, `num_runs`, `pi` or a function.
    pub fn new(source: &str) -> SimResult<Self> {
        let expr = Expr::parse(source, |name| match name {
            "run" => Ok(RUN),
            "num_runs" => Ok(NUM_RUNS),
            other => Err(SimError::expression(format!(
                "'{other}' is not available to generation rules"
            ))),
        })?;
        Ok(Self(expr))
    }
}

struct RunContext {
    run: f64,
    num_runs: f64,
}

impl EvalContext for RunContext {
    fn var(&self, index: usize) -> SimResult<f64> {
        match index {
            RUN => Ok(self.run),
            NUM_RUNS => Ok(self.num_runs),
            _ => Err(SimError::expression(format!("no run variable #{index}"))),
        }
    }

    fn time(&self) -> f64 {
        0.0
    }
}

impl GenerationRule for ExpressionRule {
    #[allow(clippy::cast_precision_loss)]
    fn generate(&self, ctx: &mut GenerationContext<'_>) -> SimResult<f64> {
        self.0.eval(&RunContext {
            run: ctx.run.0 as f64,
            num_runs: ctx.num_runs as f64,
        })
    }
}

type GenerateFn = dyn Fn(&mut GenerationContext<'_>) -> SimResult<f64> + Send + Sync;

/// Rule backed by a closure.
#[derive(Clone)]
pub struct FnRule {
    label: String,
    f: Arc<GenerateFn>,
}

impl FnRule {
    /// Wrap `f` under a label used in logs.
    pub fn new<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut GenerationContext<'_>) -> SimResult<f64> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            f: Arc::new(f),
        }
    }
}

impl fmt::Debug for FnRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRule").field("label", &self.label).finish()
    }
}

impl GenerationRule for FnRule {
    fn generate(&self, ctx: &mut GenerationContext<'_>) -> SimResult<f64> {
        (self.f)(ctx)
    }
}

/// Serializable description of a rule, as written in a sweep file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum RuleSpec {
    /// [`Fixed`].
    Fixed {
        /// Value for every run.
        value: f64,
    },
    /// [`Uniform`].
    Uniform {
        /// Lower bound.
        min: f64,
        /// Upper bound (exclusive).
        max: f64,
    },
    /// [`Gaussian`].
    Gaussian {
        /// Mean.
        mean: f64,
        /// Standard deviation.
        std_dev: f64,
        /// Lower clamp.
        #[serde(default)]
        min: Option<f64>,
        /// Upper clamp.
        #[serde(default)]
        max: Option<f64>,
    },
    /// [`Table`].
    Table {
        /// Per-run values.
        values: Vec<f64>,
    },
    /// [`ExpressionRule`].
    Expression {
        /// Expression over `run` and `num_runs`.
        expression: String,
    },
}

impl RuleSpec {
    /// Build the rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule's parameters are invalid.
    pub fn build(&self) -> SimResult<Arc<dyn GenerationRule>> {
        Ok(match self {
            Self::Fixed { value } => Arc::new(Fixed(*value)),
            Self::Uniform { min, max } => Arc::new(Uniform::new(*min, *max)?),
            Self::Gaussian {
                mean,
                std_dev,
                min,
                max,
            } => Arc::new(Gaussian::new(*mean, *std_dev)?.clamped(*min, *max)?),
            Self::Table { values } => Arc::new(Table::new(values.clone())?),
            Self::Expression { expression } => Arc::new(ExpressionRule::new(expression)?),
        })
    }
}
