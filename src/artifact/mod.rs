// src/artifact/mod.rs

//! Build artifact handling.
//!
//! - [`gate`] decides whether an announced artifact really changed.
//! - [`propagate`] copies artifacts to the locations that consume them.

pub mod gate;
pub mod propagate;

pub use gate::{ChangeDecision, ChangeGate, ChangeRecord};
pub use propagate::ArtifactPropagator;
