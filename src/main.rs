//! montesim CLI - Monte Carlo run scheduler
//!
//! Thin wrapper: installs logging, then hands off to [`montesim::cli::run_cli`].

use std::process::ExitCode;

use montesim::cli::{run_cli, Args};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("montesim=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run_cli(Args::parse())
}
