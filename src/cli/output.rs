//! CLI output formatting.
//!
//! Renderers return strings so tests can inspect them; the `print_*`
//! wrappers write to stdout.

use std::fmt::Write as _;

use crate::config::SweepConfig;
use crate::engine::{RunResult, RunStatus};
use crate::integration::IntegrationScheme;
use crate::models::ModelCatalog;
use crate::registry::{Location, VariableRegistry};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Version line, with the git hash when the build captured one.
#[must_use]
pub fn version_line() -> String {
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => {
            format!("montesim {} ({})", env!("CARGO_PKG_VERSION"), &hash[..hash.len().min(12)])
        }
        _ => format!("montesim {}", env!("CARGO_PKG_VERSION")),
    }
}

/// Print version information.
pub fn print_version() {
    println!("{}", version_line());
}

/// Print help message.
pub fn print_help() {
    println!(
        r"montesim - Monte Carlo run scheduler

USAGE:
    montesim <COMMAND> [OPTIONS]

COMMANDS:
    run <sweep.yaml>            Run a sweep
        --seed <N>              Override the sweep seed
        --runs <N>              Enable the sweep with N runs
        --pace                  Honor freeze-frame pacing
        -o, --output <file>     Write results as JSON
        -v, --verbose           Show every run

    validate <sweep.yaml>       Check a sweep file without running it

    slave                       Serve runs to a master over TCP
        -l, --listen <addr>     Listen address (default: 127.0.0.1:7070)
        --pace                  Honor freeze-frame pacing

    models                      List built-in models and their variables

    help                        Show this help message
    version                     Show version information

ENVIRONMENT:
    RUST_LOG                    Log filter (default: montesim=info)

EXAMPLES:
    montesim run sweeps/cannon.yaml --runs 70
    montesim slave --listen 0.0.0.0:7070
"
    );
}

/// Summary of a finished sweep.
#[must_use]
pub fn render_sweep_summary(results: &[RunResult], verbose: bool) -> String {
    let completed = results.iter().filter(|r| r.is_completed()).count();
    let failed = results
        .iter()
        .filter(|r| matches!(r.status, RunStatus::Failed { .. }))
        .count();
    let exhausted = results.len() - completed - failed;
    let requeued = results.iter().filter(|r| r.attempts > 1).count();

    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Runs:       {}", results.len());
    let _ = writeln!(out, "  Completed: {completed}");
    let _ = writeln!(out, "  Failed:    {failed}");
    if exhausted > 0 {
        let _ = writeln!(out, "  Unreachable-exhausted: {exhausted}");
    }
    if requeued > 0 {
        let _ = writeln!(out, "  Requeued:  {requeued}");
    }

    if verbose {
        let _ = writeln!(out);
        for result in results {
            let sym = if result.is_completed() { "✓" } else { "✗" };
            let _ = writeln!(
                out,
                "  {sym} {} t={} steps={} on {} ({})",
                result.run_id,
                result.end_time,
                result.steps,
                result.slave.as_deref().unwrap_or("-"),
                result.status
            );
        }
    } else {
        for result in results.iter().filter(|r| !r.is_completed()) {
            let _ = writeln!(out, "  ✗ {}: {}", result.run_id, result.status);
        }
    }
    let _ = writeln!(out, "{RULE}");
    out
}

/// Print a sweep summary.
pub fn print_sweep_summary(results: &[RunResult], verbose: bool) {
    print!("{}", render_sweep_summary(results, verbose));
}

/// Description of a validated sweep file.
#[must_use]
pub fn render_validation(config: &SweepConfig) -> String {
    let mc = &config.monte_carlo;
    let run = &config.run;
    let mut out = String::new();
    let _ = writeln!(out, "✓ Sweep file is valid");
    let _ = writeln!(out, "  Model:      {}", run.model);
    match run.integrator.scheme.parse::<IntegrationScheme>() {
        Ok(scheme) => {
            let kind = if scheme.is_multistep() { "multistep" } else { "single-step" };
            let _ = writeln!(
                out,
                "  Integrator: {scheme} ({kind}, order {})",
                scheme.error_order()
            );
        }
        Err(_) => {
            let _ = writeln!(out, "  Integrator: {}", run.integrator.scheme);
        }
    }
    let _ = writeln!(out, "  dt:         {} s", run.dt);
    let _ = writeln!(out, "  Terminate:  {} s", run.terminate_time);
    if mc.enabled {
        let _ = writeln!(out, "  Monte Carlo: {} runs, seed {}", mc.num_runs, mc.seed);
    } else {
        let _ = writeln!(out, "  Monte Carlo: disabled (single run)");
    }
    let _ = writeln!(out, "  Slaves:     {}", config.slaves.len());
    for slave in &config.slaves {
        let _ = writeln!(out, "    - {}", slave.host);
    }
    let _ = writeln!(out, "  Variables:  {}", config.variables.len());
    for variable in &config.variables {
        let kind = if variable.rule.is_some() { "calculated" } else { "declared" };
        let _ = writeln!(out, "    - {} ({kind})", variable.name);
    }
    out
}

/// Variables of every model in `catalog`.
#[must_use]
pub fn render_models(catalog: &ModelCatalog) -> String {
    let mut out = String::new();
    for name in catalog.names() {
        let _ = writeln!(out, "{name}");
        let mut registry = VariableRegistry::new();
        let declared = catalog
            .get(name)
            .and_then(|model| model.declare(&mut registry));
        if let Err(e) = declared {
            let _ = writeln!(out, "  ! {e}");
            continue;
        }
        for variable in registry.names() {
            let Ok(handle) = registry.resolve(variable) else {
                continue;
            };
            let kind = match registry.location(handle) {
                Some(Location::State(_)) => "state",
                Some(Location::Parameter(_)) => "parameter",
                _ => "calculated",
            };
            let unit = registry.unit(handle).unwrap_or("--");
            let _ = writeln!(out, "  {variable:<40} {unit:<8} {kind}");
        }
    }
    out
}
