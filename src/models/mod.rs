//! Dynamics models.
//!
//! A model declares its variables into a fresh [`VariableRegistry`] and
//! supplies the right-hand side of its equations of motion. Parameters are
//! declared in a fixed order, so `derivatives` reads them by index.

mod ball;
mod baseball;
mod msd;

use indexmap::IndexMap;
use std::sync::Arc;

pub use ball::Ball;
pub use baseball::Baseball;
pub use msd::MassSpringDamper;

use crate::error::{SimError, SimResult};
use crate::registry::VariableRegistry;

/// Equations of motion of one model.
pub trait Dynamics: Send + Sync + std::fmt::Debug {
    /// Catalog name.
    fn name(&self) -> &str;

    /// Declare state components, parameters and calculated variables.
    ///
    /// # Errors
    ///
    /// Returns a registry error if a declaration is rejected.
    fn declare(&self, registry: &mut VariableRegistry) -> SimResult<()>;

    /// Write `d(state)/dt` into `dydt`.
    fn derivatives(&self, t: f64, state: &[f64], params: &[f64], dydt: &mut [f64]);
}

/// Models available to the executor by name.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: IndexMap<String, Arc<dyn Dynamics>>,
}

impl ModelCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the bundled models.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(Arc::new(Baseball));
        catalog.register(Arc::new(MassSpringDamper));
        catalog.register(Arc::new(Ball));
        catalog
    }

    /// Add or replace a model.
    pub fn register(&mut self, model: Arc<dyn Dynamics>) {
        self.models.insert(model.name().to_string(), model);
    }

    /// Look up a model.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if no model has that name.
    pub fn get(&self, name: &str) -> SimResult<Arc<dyn Dynamics>> {
        self.models.get(name).cloned().ok_or_else(|| {
            SimError::config(format!(
                "unknown model '{name}' (available: {})",
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Registered model names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = ModelCatalog::builtin();
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, vec!["baseball", "msd", "ball"]);
        assert_eq!(catalog.get("msd").unwrap().name(), "msd");
    }

    #[test]
    fn test_unknown_model() {
        let err = ModelCatalog::builtin().get("rocket").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("rocket"));
        assert!(msg.contains("baseball"));
    }

    #[test]
    fn test_every_model_declares_consistently() {
        let catalog = ModelCatalog::builtin();
        for name in ["baseball", "msd", "ball"] {
            let model = catalog.get(name).unwrap();
            let mut registry = VariableRegistry::new();
            model.declare(&mut registry).unwrap();
            let state = registry.instantiate();

            let mut dydt = vec![0.0; state.state_len()];
            model.derivatives(0.0, state.continuous(), state.parameters(), &mut dydt);
            assert!(dydt.iter().all(|v| v.is_finite()), "{name}: {dydt:?}");
            assert!(registry.snapshot(&state).is_ok());
        }
    }
}
