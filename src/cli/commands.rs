//! CLI command handlers.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::SweepConfig;
use crate::engine::{RunExecutor, RunResult};
use crate::error::{SimError, SimResult};
use crate::models::ModelCatalog;
use crate::monte_carlo::serve_slave;

use super::output::{print_help, print_sweep_summary, print_version, render_models, render_validation};
use super::{Args, Command};

/// Exit code when the sweep finished but some runs did not complete.
pub const EXIT_RUNS_FAILED: u8 = 2;

/// Exit code when the sweep was cut short by capacity exhaustion or abort.
pub const EXIT_SWEEP_ABORTED: u8 = 3;

/// Main CLI entry point.
///
/// Dispatches to the appropriate command handler based on parsed arguments.
#[must_use]
pub fn run_cli(args: Args) -> ExitCode {
    match args.command {
        Command::Run {
            sweep_path,
            seed_override,
            runs_override,
            pace,
            output,
            verbose,
        } => {
            let options = RunOptions {
                seed_override,
                runs_override,
                pace,
                output: output.as_deref(),
                verbose,
            };
            run_sweep(&sweep_path, &options)
        }
        Command::Validate { sweep_path } => validate_sweep(&sweep_path),
        Command::Slave { listen, pace } => run_slave(&listen, pace),
        Command::Models => {
            print!("{}", render_models(&ModelCatalog::builtin()));
            ExitCode::SUCCESS
        }
        Command::Help => {
            print_help();
            ExitCode::SUCCESS
        }
        Command::Version => {
            print_version();
            ExitCode::SUCCESS
        }
    }
}

/// Options of `montesim run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions<'a> {
    /// Replace the sweep seed.
    pub seed_override: Option<u64>,
    /// Enable the sweep with this many runs.
    pub runs_override: Option<usize>,
    /// Honor freeze-frame pacing.
    pub pace: bool,
    /// Write results as JSON here.
    pub output: Option<&'a Path>,
    /// List every run.
    pub verbose: bool,
}

/// Run a sweep file.
#[must_use]
pub fn run_sweep(path: &Path, options: &RunOptions<'_>) -> ExitCode {
    println!("Running sweep: {}\n", path.display());

    match execute_sweep(path, options) {
        Ok(results) => {
            print_sweep_summary(&results, options.verbose);
            if let Some(output) = options.output {
                if let Err(e) = write_results(output, &results) {
                    eprintln!("Error writing {}: {e}", output.display());
                    return ExitCode::from(1);
                }
                println!("Results written to {}", output.display());
            }
            if results.iter().all(RunResult::is_completed) {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_RUNS_FAILED)
            }
        }
        Err(e) if e.is_fatal_to_sweep() => {
            eprintln!("Sweep aborted: {e}");
            ExitCode::from(EXIT_SWEEP_ABORTED)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Load, override and run a sweep file.
///
/// # Errors
///
/// Returns configuration errors and sweep-level failures.
pub fn execute_sweep(path: &Path, options: &RunOptions<'_>) -> SimResult<Vec<RunResult>> {
    let mut config = SweepConfig::load(path)?;
    if let Some(seed) = options.seed_override {
        config.monte_carlo.seed = seed;
    }
    if let Some(runs) = options.runs_override {
        config.monte_carlo.enabled = true;
        config.monte_carlo.num_runs = runs;
        config.validate_semantic()?;
    }

    let mut sweep = config.into_monte_carlo(Arc::new(ModelCatalog::builtin()), options.pace)?;
    runtime()?.block_on(sweep.run())
}

fn write_results(path: &Path, results: &[RunResult]) -> SimResult<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), results)?;
    Ok(())
}

/// Validate a sweep file.
#[must_use]
pub fn validate_sweep(path: &Path) -> ExitCode {
    println!("Validating: {}\n", path.display());

    let checked = SweepConfig::load(path).and_then(|config| {
        let catalog = Arc::new(ModelCatalog::builtin());
        config
            .into_monte_carlo(catalog, false)?
            .generate_run_configs()?;
        Ok(config)
    });

    match checked {
        Ok(config) => {
            print!("{}", render_validation(&config));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ {e}");
            ExitCode::from(1)
        }
    }
}

/// Serve runs on `listen` until the process is stopped.
#[must_use]
pub fn run_slave(listen: &str, pace: bool) -> ExitCode {
    let served = runtime().and_then(|rt| {
        rt.block_on(async {
            let listener = TcpListener::bind(listen).await?;
            info!(%listen, pace, "slave ready");
            let executor = RunExecutor::new(Arc::new(ModelCatalog::builtin())).with_pacing(pace);
            serve_slave(listener, executor).await
        })
    });

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

fn runtime() -> SimResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(SimError::from)
}
