//! CLI argument parsing.
//!
//! Hand-rolled so every command line can be parsed from a plain iterator in
//! tests.

use std::path::PathBuf;

/// Default address for `montesim slave`.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:7070";

/// CLI arguments container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    /// The command to execute.
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a sweep file.
    Run {
        /// Path to the sweep YAML file.
        sweep_path: PathBuf,
        /// Optional seed override.
        seed_override: Option<u64>,
        /// Optional run-count override; enables the sweep.
        runs_override: Option<usize>,
        /// Honor freeze-frame pacing.
        pace: bool,
        /// Write results as JSON to this path.
        output: Option<PathBuf>,
        /// Enable verbose output.
        verbose: bool,
    },
    /// Validate a sweep file without running it.
    Validate {
        /// Path to the sweep YAML file.
        sweep_path: PathBuf,
    },
    /// Serve runs to a master over TCP.
    Slave {
        /// Listen address.
        listen: String,
        /// Honor freeze-frame pacing.
        pace: bool,
    },
    /// List built-in models and their variables.
    Models,
    /// Show help
    Help,
    /// Show version
    Version,
}

impl Args {
    /// Parse command-line arguments from an iterator.
    ///
    /// This method is testable as it accepts any iterator of strings,
    /// not just `std::env::args()`.
    #[must_use]
    pub fn parse_from<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::parse_from_vec(&args)
    }

    /// Parse command-line arguments from the environment.
    #[must_use]
    pub fn parse() -> Self {
        Self::parse_from(std::env::args())
    }

    fn parse_from_vec(args: &[String]) -> Self {
        let Some(name) = args.get(1) else {
            return Self {
                command: Command::Help,
            };
        };

        let command = match name.as_str() {
            "run" => Self::parse_run_command(args),
            "validate" => Self::parse_validate_command(args),
            "slave" => Self::parse_slave_command(args),
            "models" => Command::Models,
            "-h" | "--help" | "help" => Command::Help,
            "-V" | "--version" | "version" => Command::Version,
            unknown => {
                eprintln!("Unknown command: {unknown}");
                Command::Help
            }
        };

        Self { command }
    }

    fn parse_run_command(args: &[String]) -> Command {
        let Some(path) = args.get(2) else {
            eprintln!("Error: 'run' command requires a sweep file");
            return Command::Help;
        };

        let mut seed_override = None;
        let mut runs_override = None;
        let mut pace = false;
        let mut output = None;
        let mut verbose = false;

        let mut i = 3;
        while i < args.len() {
            let value = args.get(i + 1);
            match args[i].as_str() {
                "--seed" => {
                    seed_override = value.and_then(|v| v.parse().ok());
                    i += 2;
                }
                "--runs" => {
                    runs_override = value.and_then(|v| v.parse().ok());
                    i += 2;
                }
                "-o" | "--output" => {
                    output = value.map(PathBuf::from);
                    i += 2;
                }
                "--pace" => {
                    pace = true;
                    i += 1;
                }
                "-v" | "--verbose" => {
                    verbose = true;
                    i += 1;
                }
                other => {
                    eprintln!("Ignoring unknown option: {other}");
                    i += 1;
                }
            }
        }

        Command::Run {
            sweep_path: PathBuf::from(path),
            seed_override,
            runs_override,
            pace,
            output,
            verbose,
        }
    }

    fn parse_validate_command(args: &[String]) -> Command {
        match args.get(2) {
            Some(path) => Command::Validate {
                sweep_path: PathBuf::from(path),
            },
            None => {
                eprintln!("Error: 'validate' command requires a sweep file");
                Command::Help
            }
        }
    }

    fn parse_slave_command(args: &[String]) -> Command {
        let mut listen = DEFAULT_LISTEN.to_string();
        let mut pace = false;

        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--listen" | "-l" => {
                    if let Some(addr) = args.get(i + 1) {
                        listen.clone_from(addr);
                    }
                    i += 2;
                }
                "--pace" => {
                    pace = true;
                    i += 1;
                }
                _ => i += 1,
            }
        }

        Command::Slave { listen, pace }
    }
}
