// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `devloop`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devloop",
    version,
    about = "Run the type-checker, bundler and test server together and keep demo bundles fresh.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Devloop.toml` in the current working directory, falling back
    /// to the built-in topology when that file does not exist.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Project root. Commands run here and artifact paths resolve against it.
    ///
    /// Default: the directory containing the config file.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVLOOP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// How long a process may take to stop before it is killed
    /// (e.g. `500ms`, `5s`, or `none`).
    #[arg(long, value_name = "DURATION")]
    pub grace_period: Option<String>,

    /// Parse + validate, print the topology, but don't start any process.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
