//! CLI module for montesim.
//!
//! All command logic lives here so it can be tested; `main.rs` only installs
//! logging and calls [`run_cli`].

mod args;
mod commands;
mod output;

pub use args::{Args, Command, DEFAULT_LISTEN};
pub use commands::{
    execute_sweep, run_cli, run_slave, run_sweep, validate_sweep, RunOptions, EXIT_RUNS_FAILED,
    EXIT_SWEEP_ABORTED,
};
pub use output::{
    print_help, print_sweep_summary, print_version, render_models, render_sweep_summary,
    render_validation, version_line,
};
