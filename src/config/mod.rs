// src/config/mod.rs

//! Configuration loading and validation for devloop.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).
//! - Resolve everything against the project root into a [`Topology`]
//!   (`topology.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod topology;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default, DEFAULT_CONFIG_FILE};
pub use model::{ArtifactsSection, ConfigFile, DetectSection, ProcessConfig, SupervisorSection};
pub use topology::{ArtifactRoutes, Topology};
pub use validate::validate_config;
