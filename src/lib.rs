//! # montesim
//!
//! Monte Carlo run scheduler for fixed-step dynamics simulations.
//!
//! A master expands one run template into many run configurations, each with
//! its own randomly generated inputs, and dispatches them to slaves that run
//! in-process or on other hosts over TCP. Every run is reproducible from the
//! master seed and its run id.
//!
//! - [`registry`]: named variables, units and calculated values
//! - [`integration`]: Euler, RK2, RK4 and Adams-Bashforth-Moulton steppers
//! - [`engine`]: the run executor, clock and event scheduler
//! - [`monte_carlo`]: generation rules, slaves and the sweep dispatcher
//! - [`config`]: YAML sweep files
//!
//! ## Example
//!
//! ```rust
//! use montesim::prelude::*;
//!
//! let config = SweepConfig::builder("msd")
//!     .runs(3)
//!     .seed(42)
//!     .slave("localhost")
//!     .variable("msd.k", Some("N/m"), RuleSpec::Uniform { min: 50.0, max: 150.0 })
//!     .timing(0.01, 0.5)
//!     .build()
//!     .unwrap();
//!
//! let sweep = config
//!     .into_monte_carlo(std::sync::Arc::new(ModelCatalog::builtin()), false)
//!     .unwrap();
//! let runs = sweep.generate_run_configs().unwrap();
//! assert_eq!(runs.len(), 3);
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops,  // Hand-written RHS terms read like the equations
    clippy::imprecise_flops,
    clippy::too_many_lines,
    clippy::missing_const_for_fn,
    clippy::needless_range_loop,   // Index loops mirror the Butcher tableau
)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod integration;
pub mod models;
pub mod monte_carlo;
pub mod registry;
pub mod replay;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{SweepConfig, SweepConfigBuilder};
    pub use crate::engine::{
        Binding, CancelFlag, RunConfig, RunExecutor, RunId, RunResult, RunStatus, SimRng,
        SimState, SimTime,
    };
    pub use crate::error::{SimError, SimResult};
    pub use crate::integration::{IntegrationScheme, Integrator};
    pub use crate::models::{Dynamics, ModelCatalog};
    pub use crate::monte_carlo::{
        GenerationRule, LocalSlave, MonteCarlo, RemoteSlave, RuleSpec, SlaveConnector,
        SweepSettings, VariableSpec,
    };
    pub use crate::registry::VariableRegistry;
}

/// Re-export for public API
pub use error::{SimError, SimResult};
