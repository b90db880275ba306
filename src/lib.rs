// src/lib.rs

pub mod artifact;
pub mod cli;
pub mod config;
pub mod detect;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::duration::parse_grace_period;
use crate::config::loader::{default_config_path, load_and_validate, load_or_default};
use crate::config::Topology;
use crate::engine::signals::spawn_signal_listener;
use crate::engine::{Outcome, Supervisor};
use crate::errors::DevloopError;
use crate::exec::Role;
use crate::fs::RealFileSystem;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and topology resolution
/// - the supervisor and its three long-running processes
/// - SIGINT / SIGTERM handling
///
/// Returns `None` for `--dry-run`.
pub async fn run(args: CliArgs) -> Result<Option<Outcome>> {
    let (config_path, explicit) = match args.config {
        Some(ref path) => (PathBuf::from(path), true),
        None => (default_config_path(), false),
    };

    let cfg = if explicit {
        load_and_validate(&config_path)?
    } else {
        load_or_default(&config_path)?
    };

    let root = match args.root {
        Some(ref root) => root.clone(),
        None => config_root_dir(&config_path),
    };
    let root = std::path::absolute(&root)?;

    let topology = Topology::from_config(&cfg, &root, grace_override(args.grace_period.as_deref())?)?;

    if args.dry_run {
        print_dry_run(&topology);
        return Ok(None);
    }

    info!(root = ?topology.routes.root, config = ?config_path, "starting devloop");

    let supervisor = Supervisor::start(&topology, Arc::new(RealFileSystem))?;
    let _signals = spawn_signal_listener(supervisor.shutdown_handle());

    Ok(Some(supervisor.run().await))
}

fn grace_override(flag: Option<&str>) -> Result<Option<Option<Duration>>, DevloopError> {
    flag.map(|s| {
        parse_grace_period(s).map_err(|e| DevloopError::Config(format!("invalid --grace-period: {e}")))
    })
    .transpose()
}

/// Directory containing the config file, or `.`.
fn config_root_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Print the resolved processes and artifact routes.
fn print_dry_run(topology: &Topology) {
    println!("devloop dry-run");
    println!("  root = {}", topology.routes.root.display());
    match topology.grace_period {
        Some(grace) => println!("  grace_period = {grace:?}"),
        None => println!("  grace_period = none"),
    }
    println!();

    println!("processes:");
    for role in Role::LONG_RUNNING.into_iter().chain([Role::Packager]) {
        let spec = topology.spec(role);
        println!("  - {role} [{}]", spec.label);
        println!("      cmd: {}", spec.command_line());
        println!("      stdout: {:?}, stderr: {:?}", spec.stdout, spec.stderr);
    }
    println!();

    let routes = &topology.routes;
    println!("artifacts:");
    println!("  {} -> {}", routes.primary.display(), routes.secondary.display());
    println!("  {} -> {}", routes.derived.display(), routes.tertiary.display());
    println!();

    println!("detect:");
    println!("  bundle_marker = {:?}", topology.detect.bundle_marker);
    println!("  type_error_marker = {:?}", topology.detect.type_error_marker);

    debug!("dry-run complete (no execution)");
}
