// src/config/validate.rs

use std::path::Path;

use crate::config::duration::parse_grace_period;
use crate::config::model::{ConfigFile, ProcessConfig};
use crate::errors::{DevloopError, Result};

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - every process has a non-empty `program`
/// - artifact paths are non-empty and relative to the project root
/// - no artifact is copied onto itself
/// - detection markers are non-empty
/// - `grace_period` parses
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_process("checker", &cfg.checker)?;
    validate_process("bundler", &cfg.bundler)?;
    validate_process("server", &cfg.server)?;
    validate_process("packager", &cfg.packager)?;
    validate_artifacts(cfg)?;
    validate_detect(cfg)?;

    parse_grace_period(&cfg.supervisor.grace_period)
        .map_err(|e| config_err(format!("invalid [supervisor].grace_period: {e}")))?;

    Ok(())
}

fn config_err(msg: impl Into<String>) -> DevloopError {
    DevloopError::Config(msg.into())
}

fn validate_process(section: &str, process: &ProcessConfig) -> Result<()> {
    if process.program.trim().is_empty() {
        return Err(config_err(format!("[{section}].program must not be empty")));
    }
    if let Some(ref label) = process.label {
        if label.trim().is_empty() {
            return Err(config_err(format!("[{section}].label must not be empty")));
        }
    }
    Ok(())
}

fn validate_artifacts(cfg: &ConfigFile) -> Result<()> {
    let a = &cfg.artifacts;

    for (key, value) in [
        ("primary", &a.primary),
        ("secondary", &a.secondary),
        ("derived", &a.derived),
        ("tertiary", &a.tertiary),
    ] {
        if value.trim().is_empty() {
            return Err(config_err(format!("[artifacts].{key} must not be empty")));
        }
        if Path::new(value).is_absolute() {
            return Err(config_err(format!(
                "[artifacts].{key} must be relative to the project root (got {value:?})"
            )));
        }
    }

    if Path::new(&a.primary) == Path::new(&a.secondary) {
        return Err(config_err(
            "[artifacts].secondary must differ from [artifacts].primary",
        ));
    }
    if Path::new(&a.derived) == Path::new(&a.tertiary) {
        return Err(config_err(
            "[artifacts].tertiary must differ from [artifacts].derived",
        ));
    }

    Ok(())
}

fn validate_detect(cfg: &ConfigFile) -> Result<()> {
    if cfg.detect.bundle_marker.trim().is_empty() {
        return Err(config_err("[detect].bundle_marker must not be empty"));
    }
    if cfg.detect.type_error_marker.trim().is_empty() {
        return Err(config_err("[detect].type_error_marker must not be empty"));
    }
    Ok(())
}
