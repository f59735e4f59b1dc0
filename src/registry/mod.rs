//! Variable Registry.
//!
//! Maps dotted variable paths (`dyn.baseball.vel[1]`) to typed storage in a
//! run's [`SimState`]. Names are resolved once, at declaration or bind time,
//! into dense [`VariableHandle`]s; reads and writes never look up strings.
//!
//! Bindings are queued by [`VariableRegistry::bind`] and only touch the
//! simulation state when the executor calls
//! [`VariableRegistry::apply_bindings`] at run start.

pub mod expr;
pub mod units;

use indexmap::IndexMap;

use crate::engine::state::{SimState, Slot};
use crate::engine::BindingValue;
use crate::error::{SimError, SimResult};
pub use expr::{EvalContext, Expr, MAX_EVAL_DEPTH};

/// Names the expression language reserves.
const RESERVED: [&str; 2] = ["t", "pi"];

/// Dense handle to a declared variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableHandle(usize);

impl VariableHandle {
    /// Position in declaration order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Where a variable's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Element of the integrated state vector.
    State(usize),
    /// Model parameter.
    Parameter(usize),
    /// Computed on read from an expression.
    Calculated,
}

#[derive(Debug, Clone)]
enum Calculation {
    Expr { expr: Expr, scale: f64 },
    Fixed(f64),
}

#[derive(Debug, Clone)]
struct Variable {
    unit: Option<String>,
    location: Location,
    calculation: Option<Calculation>,
}

#[derive(Debug, Clone)]
enum PendingValue {
    Literal(f64),
    Expression { expr: Expr, scale: f64 },
}

#[derive(Debug, Clone)]
struct PendingBinding {
    handle: VariableHandle,
    value: PendingValue,
}

/// Registry of named simulation variables for one run.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    vars: IndexMap<String, Variable>,
    state_initial: Vec<f64>,
    state_owner: Vec<usize>,
    parameter_initial: Vec<f64>,
    parameter_owner: Vec<usize>,
    pending: Vec<PendingBinding>,
}

impl VariableRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, name: &str, unit: Option<&str>, location: Location) -> SimResult<VariableHandle> {
        if name.is_empty() || RESERVED.contains(&name) {
            return Err(SimError::config(format!("'{name}' is not a valid variable name")));
        }
        if self.vars.contains_key(name) {
            return Err(SimError::config(format!("variable '{name}' declared twice")));
        }
        if let Some(unit) = unit {
            units::validate(unit)?;
        }
        let (index, _) = self.vars.insert_full(
            name.to_string(),
            Variable {
                unit: unit.map(str::to_string),
                location,
                calculation: None,
            },
        );
        Ok(VariableHandle(index))
    }

    /// Declare a scalar parameter with value 0.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` on a duplicate or reserved name and
    /// `SimError::UnitMismatch` on an unknown unit.
    pub fn declare(&mut self, name: &str, unit: Option<&str>) -> SimResult<VariableHandle> {
        self.declare_parameter(name, 0.0, unit)
    }

    /// Declare a model parameter.
    ///
    /// # Errors
    ///
    /// See [`VariableRegistry::declare`].
    pub fn declare_parameter(
        &mut self,
        name: &str,
        initial: f64,
        unit: Option<&str>,
    ) -> SimResult<VariableHandle> {
        let slot = self.parameter_initial.len();
        let handle = self.insert(name, unit, Location::Parameter(slot))?;
        self.parameter_initial.push(initial);
        self.parameter_owner.push(handle.0);
        Ok(handle)
    }

    /// Declare one component of the integrated state vector.
    ///
    /// # Errors
    ///
    /// See [`VariableRegistry::declare`].
    pub fn declare_state(
        &mut self,
        name: &str,
        initial: f64,
        unit: Option<&str>,
    ) -> SimResult<VariableHandle> {
        let slot = self.state_initial.len();
        let handle = self.insert(name, unit, Location::State(slot))?;
        self.state_initial.push(initial);
        self.state_owner.push(handle.0);
        Ok(handle)
    }

    /// Declare `base[0]`, …, `base[len - 1]` as state components.
    ///
    /// # Errors
    ///
    /// See [`VariableRegistry::declare`].
    pub fn declare_vector(
        &mut self,
        base: &str,
        len: usize,
        unit: Option<&str>,
    ) -> SimResult<Vec<VariableHandle>> {
        (0..len)
            .map(|i| self.declare_state(&format!("{base}[{i}]"), 0.0, unit))
            .collect()
    }

    /// Declare a variable computed from an expression at read time.
    ///
    /// The expression may only reference variables declared before it.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Expression` or `SimError::UnknownVariable` if the
    /// expression does not compile, plus the errors of
    /// [`VariableRegistry::declare`].
    pub fn declare_calculated(
        &mut self,
        name: &str,
        expression: &str,
        unit: Option<&str>,
    ) -> SimResult<VariableHandle> {
        let expr = self.compile(expression)?;
        let handle = self.insert(name, unit, Location::Calculated)?;
        if let Some(var) = self.vars.get_index_mut(handle.0).map(|(_, v)| v) {
            var.calculation = Some(Calculation::Expr { expr, scale: 1.0 });
        }
        Ok(handle)
    }

    /// Compile an expression against the declared names.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Expression` or `SimError::UnknownVariable`.
    pub fn compile(&self, expression: &str) -> SimResult<Expr> {
        Expr::parse(expression, |name| self.resolve(name).map(VariableHandle::index))
    }

    /// Resolve a dotted path to its handle.
    ///
    /// # Errors
    ///
    /// Returns `SimError::UnknownVariable` if the name is not declared.
    pub fn resolve(&self, name: &str) -> SimResult<VariableHandle> {
        self.vars
            .get_index_of(name)
            .map(VariableHandle)
            .ok_or_else(|| SimError::unknown_variable(name))
    }

    fn var(&self, handle: VariableHandle) -> SimResult<(&str, &Variable)> {
        self.vars
            .get_index(handle.0)
            .map(|(n, v)| (n.as_str(), v))
            .ok_or_else(|| SimError::unknown_variable(format!("#{}", handle.0)))
    }

    /// Name of a handle.
    #[must_use]
    pub fn name(&self, handle: VariableHandle) -> Option<&str> {
        self.vars.get_index(handle.0).map(|(n, _)| n.as_str())
    }

    /// Native unit of a handle.
    #[must_use]
    pub fn unit(&self, handle: VariableHandle) -> Option<&str> {
        self.vars
            .get_index(handle.0)
            .and_then(|(_, v)| v.unit.as_deref())
    }

    /// Storage location of a handle.
    #[must_use]
    pub fn location(&self, handle: VariableHandle) -> Option<Location> {
        self.vars.get_index(handle.0).map(|(_, v)| v.location)
    }

    /// Name of the variable stored in a state slot.
    #[must_use]
    pub fn slot_name(&self, slot: Slot) -> Option<&str> {
        let owner = match slot {
            Slot::State(i) => self.state_owner.get(i),
            Slot::Parameter(i) => self.parameter_owner.get(i),
        }?;
        self.name(VariableHandle(*owner))
    }

    /// Declared names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Number of declared variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Length of the integrated state vector.
    #[must_use]
    pub fn state_len(&self) -> usize {
        self.state_initial.len()
    }

    /// Number of queued bindings.
    #[must_use]
    pub fn pending_bindings(&self) -> usize {
        self.pending.len()
    }

    /// Queue a value for a variable.
    ///
    /// Units are checked now; nothing is written until
    /// [`VariableRegistry::apply_bindings`].
    ///
    /// # Errors
    ///
    /// Returns `SimError::UnitMismatch` if `unit` is not convertible to the
    /// variable's native unit, and `SimError::Expression` /
    /// `SimError::UnknownVariable` if an expression does not compile.
    pub fn bind(
        &mut self,
        handle: VariableHandle,
        value: &BindingValue,
        unit: Option<&str>,
    ) -> SimResult<()> {
        let (_, var) = self.var(handle)?;
        let native = var.unit.as_deref();
        let scale = match unit {
            Some(unit) => units::conversion_factor(Some(unit), native)?,
            None => 1.0,
        };
        let value = match value {
            BindingValue::Literal(v) => PendingValue::Literal(v * scale),
            BindingValue::Expression(src) => PendingValue::Expression {
                expr: self.compile(src)?,
                scale,
            },
        };
        self.pending.push(PendingBinding { handle, value });
        Ok(())
    }

    /// Resolve `name` and queue a value for it.
    ///
    /// # Errors
    ///
    /// See [`VariableRegistry::resolve`] and [`VariableRegistry::bind`].
    pub fn bind_name(&mut self, name: &str, value: &BindingValue, unit: Option<&str>) -> SimResult<()> {
        let handle = self.resolve(name)?;
        self.bind(handle, value, unit)
    }

    /// Apply queued bindings to `state` in bind order.
    ///
    /// Expression bindings see the effect of every binding applied before
    /// them. Binding a calculated variable replaces its expression.
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors.
    pub fn apply_bindings(&mut self, state: &mut SimState) -> SimResult<()> {
        let pending = std::mem::take(&mut self.pending);
        for binding in pending {
            let (_, var) = self.var(binding.handle)?;
            if var.location == Location::Calculated {
                let calculation = match binding.value {
                    PendingValue::Literal(v) => Calculation::Fixed(v),
                    PendingValue::Expression { expr, scale } => Calculation::Expr { expr, scale },
                };
                if let Some((_, var)) = self.vars.get_index_mut(binding.handle.0) {
                    var.calculation = Some(calculation);
                }
                continue;
            }
            let value = match &binding.value {
                PendingValue::Literal(v) => *v,
                PendingValue::Expression { expr, scale } => {
                    expr.eval(&StateContext::new(self, state))? * scale
                }
            };
            self.write(binding.handle, value, state)?;
        }
        Ok(())
    }

    /// Fresh state with every declared initial value.
    #[must_use]
    pub fn instantiate(&self) -> SimState {
        SimState::new(self.state_initial.clone(), self.parameter_initial.clone())
    }

    /// Read a variable from `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is invalid or a calculated
    /// expression fails.
    pub fn read(&self, handle: VariableHandle, state: &SimState) -> SimResult<f64> {
        self.read_at(handle, state, 0)
    }

    fn read_at(&self, handle: VariableHandle, state: &SimState, depth: usize) -> SimResult<f64> {
        if depth > MAX_EVAL_DEPTH {
            return Err(SimError::expression(format!(
                "calculated variables nest deeper than {MAX_EVAL_DEPTH}"
            )));
        }
        let (name, var) = self.var(handle)?;
        let missing = || SimError::unknown_variable(name);
        match (&var.location, &var.calculation) {
            (Location::State(i), _) => state.continuous().get(*i).copied().ok_or_else(missing),
            (Location::Parameter(i), _) => state.parameters().get(*i).copied().ok_or_else(missing),
            (Location::Calculated, Some(Calculation::Fixed(v))) => Ok(*v),
            (Location::Calculated, Some(Calculation::Expr { expr, scale })) => {
                let ctx = StateContext {
                    registry: self,
                    state,
                    depth: depth + 1,
                };
                Ok(expr.eval(&ctx)? * scale)
            }
            (Location::Calculated, None) => Err(missing()),
        }
    }

    /// Write a state or parameter variable.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` for calculated variables.
    pub fn write(&self, handle: VariableHandle, value: f64, state: &mut SimState) -> SimResult<()> {
        let (name, var) = self.var(handle)?;
        match var.location {
            Location::State(i) => state.set_state(i, value),
            Location::Parameter(i) => state.set_parameter(i, value),
            Location::Calculated => Err(SimError::config(format!(
                "calculated variable '{name}' cannot be written"
            ))),
        }
    }

    /// Value of every declared variable, in declaration order.
    ///
    /// # Errors
    ///
    /// Propagates calculated-variable evaluation errors.
    pub fn snapshot(&self, state: &SimState) -> SimResult<IndexMap<String, f64>> {
        (0..self.vars.len())
            .map(|i| {
                let handle = VariableHandle(i);
                let name = self.name(handle).unwrap_or_default().to_string();
                self.read(handle, state).map(|v| (name, v))
            })
            .collect()
    }
}

/// Expression context reading from a registry and a state.
pub struct StateContext<'a> {
    registry: &'a VariableRegistry,
    state: &'a SimState,
    depth: usize,
}

impl<'a> StateContext<'a> {
    /// Context at the top of an evaluation.
    #[must_use]
    pub const fn new(registry: &'a VariableRegistry, state: &'a SimState) -> Self {
        Self {
            registry,
            state,
            depth: 0,
        }
    }
}

impl EvalContext for StateContext<'_> {
    fn var(&self, index: usize) -> SimResult<f64> {
        self.registry
            .read_at(VariableHandle(index), self.state, self.depth)
    }

    fn time(&self) -> f64 {
        self.state.time.as_secs_f64()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::SimTime;

    fn ball() -> VariableRegistry {
        let mut registry = VariableRegistry::new();
        registry.declare_vector("dyn.ball.pos", 3, Some("m")).unwrap();
        registry.declare_vector("dyn.ball.vel", 3, Some("m/s")).unwrap();
        registry.declare_parameter("dyn.ball.theta", 0.0, Some("rad")).unwrap();
        registry.declare_parameter("dyn.ball.mass", 0.145, Some("kg")).unwrap();
        registry
            .declare_calculated(
                "dyn.ball.speed",
                "sqrt(dyn.ball.vel[0]^2 + dyn.ball.vel[1]^2 + dyn.ball.vel[2]^2)",
                Some("m/s"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_declare_and_resolve() {
        let registry = ball();
        assert_eq!(registry.len(), 9);
        assert_eq!(registry.state_len(), 6);

        let vel1 = registry.resolve("dyn.ball.vel[1]").unwrap();
        assert_eq!(registry.location(vel1), Some(Location::State(4)));
        assert_eq!(registry.unit(vel1), Some("m/s"));
        assert_eq!(registry.name(vel1), Some("dyn.ball.vel[1]"));
    }

    #[test]
    fn test_resolve_unknown() {
        let err = ball().resolve("dyn.ball.pos[7]").unwrap_err();
        assert!(matches!(err, SimError::UnknownVariable { name } if name == "dyn.ball.pos[7]"));
    }

    #[test]
    fn test_duplicate_and_reserved_names() {
        let mut registry = ball();
        assert!(registry.declare("dyn.ball.mass", None).is_err());
        assert!(registry.declare("t", None).is_err());
        assert!(registry.declare("x", Some("furlong")).is_err());
    }

    #[test]
    fn test_bind_does_not_touch_state_until_applied() {
        let mut registry = ball();
        let mut state = registry.instantiate();
        registry
            .bind_name("dyn.ball.vel[0]", &BindingValue::Literal(43.30), None)
            .unwrap();
        assert_eq!(state.continuous()[3], 0.0);
        assert_eq!(registry.pending_bindings(), 1);

        registry.apply_bindings(&mut state).unwrap();
        assert_eq!(state.continuous()[3], 43.30);
        assert_eq!(registry.pending_bindings(), 0);
    }

    #[test]
    fn test_bind_converts_units() {
        let mut registry = ball();
        let mut state = registry.instantiate();
        registry
            .bind_name("dyn.ball.theta", &BindingValue::Literal(-90.0), Some("d"))
            .unwrap();
        registry.apply_bindings(&mut state).unwrap();
        let theta = registry
            .read(registry.resolve("dyn.ball.theta").unwrap(), &state)
            .unwrap();
        assert!((theta + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_bind_rejects_unit_mismatch() {
        let mut registry = ball();
        let err = registry
            .bind_name("dyn.ball.mass", &BindingValue::Literal(1.0), Some("s"))
            .unwrap_err();
        assert!(matches!(err, SimError::UnitMismatch { .. }));
        assert_eq!(registry.pending_bindings(), 0);
    }

    #[test]
    fn test_expression_binding_sees_earlier_bindings() {
        let mut registry = ball();
        let mut state = registry.instantiate();
        registry
            .bind_name("dyn.ball.vel[0]", &BindingValue::Literal(3.0), None)
            .unwrap();
        registry
            .bind_name(
                "dyn.ball.vel[2]",
                &BindingValue::Expression("dyn.ball.vel[0] + 1".to_string()),
                None,
            )
            .unwrap();
        registry.apply_bindings(&mut state).unwrap();

        let speed = registry
            .read(registry.resolve("dyn.ball.speed").unwrap(), &state)
            .unwrap();
        assert!((speed - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_calculated_reads_live_state() {
        let registry = ball();
        let mut state = registry.instantiate();
        let speed = registry.resolve("dyn.ball.speed").unwrap();
        assert_eq!(registry.read(speed, &state).unwrap(), 0.0);

        state.set_state(4, -2.0).unwrap();
        assert_eq!(registry.read(speed, &state).unwrap(), 2.0);
    }

    #[test]
    fn test_binding_calculated_replaces_expression() {
        let mut registry = ball();
        let mut state = registry.instantiate();
        let speed = registry.resolve("dyn.ball.speed").unwrap();
        registry.bind(speed, &BindingValue::Literal(12.0), None).unwrap();
        registry.apply_bindings(&mut state).unwrap();
        assert_eq!(registry.read(speed, &state).unwrap(), 12.0);
        assert!(registry.write(speed, 1.0, &mut state).is_err());
    }

    #[test]
    fn test_calculated_sees_time() {
        let mut registry = VariableRegistry::new();
        registry.declare_calculated("clock.double", "2 * t", Some("s")).unwrap();
        let mut state = registry.instantiate();
        state.time = SimTime::from_secs(1.25);
        let h = registry.resolve("clock.double").unwrap();
        assert_eq!(registry.read(h, &state).unwrap(), 2.5);
    }

    #[test]
    fn test_self_referential_rebinding_fails_cleanly() {
        let mut registry = VariableRegistry::new();
        let x = registry.declare_calculated("x", "1", None).unwrap();
        let mut state = registry.instantiate();
        registry
            .bind(x, &BindingValue::Expression("x + 1".to_string()), None)
            .unwrap();
        registry.apply_bindings(&mut state).unwrap();
        assert!(matches!(registry.read(x, &state), Err(SimError::Expression(_))));
    }

    #[test]
    fn test_snapshot_in_declaration_order() {
        let registry = ball();
        let state = registry.instantiate();
        let snap = registry.snapshot(&state).unwrap();
        let names: Vec<&str> = snap.keys().map(String::as_str).collect();
        assert_eq!(names.first(), Some(&"dyn.ball.pos[0]"));
        assert_eq!(names.last(), Some(&"dyn.ball.speed"));
        assert_eq!(snap["dyn.ball.mass"], 0.145);
    }

    #[test]
    fn test_slot_name() {
        let registry = ball();
        assert_eq!(registry.slot_name(Slot::State(5)), Some("dyn.ball.vel[2]"));
        assert_eq!(registry.slot_name(Slot::Parameter(1)), Some("dyn.ball.mass"));
        assert_eq!(registry.slot_name(Slot::State(9)), None);
    }
}
