// src/errors.rs

//! Crate-wide error types.
//!
//! Structural failures (`SpawnError`, `ManagedProcessExit`) are escalated to
//! the supervisor; recoverable ones (`CopyError`, `BuildError`) stay at the
//! component that produced them and only surface as diagnostics.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::exec::{ExitKind, Role};

#[derive(Error, Debug)]
pub enum DevloopError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A managed process could not be started.
#[derive(Error, Debug)]
#[error("failed to spawn {role} process `{program}`: {source}")]
pub struct SpawnError {
    pub role: Role,
    pub program: String,
    #[source]
    pub source: io::Error,
}

/// Copying an artifact to its consumption location failed.
#[derive(Error, Debug)]
#[error("failed to copy {from:?} to {to:?}: {source}")]
pub struct CopyError {
    pub from: PathBuf,
    pub to: PathBuf,
    #[source]
    pub source: io::Error,
}

/// The one-shot derived build did not produce a usable artifact.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("derived build failed ({exit})")]
    Failed { exit: ExitKind },

    #[error("derived build cancelled by shutdown")]
    Cancelled,
}

/// A long-running managed process terminated while it was still expected to
/// be running.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{role} process exited unexpectedly ({exit})")]
pub struct ManagedProcessExit {
    pub role: Role,
    pub exit: ExitKind,
}

pub type Result<T> = std::result::Result<T, DevloopError>;
