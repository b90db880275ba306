// src/config/model.rs

use serde::Deserialize;

use crate::exec::StreamMode;

/// Top-level configuration as read from `Devloop.toml`.
///
/// ```toml
/// [supervisor]
/// grace_period = "5s"
///
/// [checker]
/// program = "npx"
/// args = ["tsc", "--noEmit", "--watch"]
///
/// [bundler]
/// program = "npx"
/// args = ["rollup", "-c", "--watch"]
///
/// [server]
/// program = "node"
/// args = ["--watch", "test/server.mjs"]
/// stderr = "inherit"
///
/// [packager]
/// program = "pnpm"
/// args = ["run", "build_js_umd"]
///
/// [artifacts]
/// primary = "dist/module.js"
/// secondary = "docs/demos/dist/module.js"
/// derived = "dist/umd/simple-datatables.js"
/// tertiary = "docs/demos/dist/ksp-table.js"
/// ```
///
/// Every section is optional; the defaults are the values shown above.
/// The topology itself is fixed: there is no way to add or remove processes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default = "default_checker")]
    pub checker: ProcessConfig,

    #[serde(default = "default_bundler")]
    pub bundler: ProcessConfig,

    #[serde(default = "default_server")]
    pub server: ProcessConfig,

    /// One-shot build run after each real change of the primary artifact.
    #[serde(default = "default_packager")]
    pub packager: ProcessConfig,

    #[serde(default)]
    pub artifacts: ArtifactsSection,

    #[serde(default)]
    pub detect: DetectSection,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            supervisor: SupervisorSection::default(),
            checker: default_checker(),
            bundler: default_bundler(),
            server: default_server(),
            packager: default_packager(),
            artifacts: ArtifactsSection::default(),
            detect: DetectSection::default(),
        }
    }
}

/// `[supervisor]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    /// How long a process may take to exit after a termination request
    /// before it is killed, e.g. `"5s"`, `"500ms"`. `"none"` disables the
    /// forced kill entirely.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    /// Create the secondary/tertiary artifact directories at startup.
    #[serde(default = "default_true")]
    pub ensure_dirs: bool,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            ensure_dirs: true,
        }
    }
}

fn default_grace_period() -> String {
    "5s".to_string()
}

fn default_true() -> bool {
    true
}

/// `[checker]`, `[bundler]`, `[server]` and `[packager]` sections.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    /// Executable, looked up on `PATH` (no shell involved).
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub stdout: StreamMode,

    #[serde(default)]
    pub stderr: StreamMode,

    /// Prefix for relayed output; defaults per role (`tsc`, `rollup`, ...).
    #[serde(default)]
    pub label: Option<String>,
}

impl ProcessConfig {
    fn new(program: &str, args: &[&str], label: &str) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            stdout: StreamMode::Piped,
            stderr: StreamMode::Piped,
            label: Some(label.to_string()),
        }
    }
}

fn default_checker() -> ProcessConfig {
    ProcessConfig::new("npx", &["tsc", "--noEmit", "--watch"], "tsc")
}

fn default_bundler() -> ProcessConfig {
    ProcessConfig::new("npx", &["rollup", "-c", "--watch"], "rollup")
}

fn default_server() -> ProcessConfig {
    ProcessConfig {
        stderr: StreamMode::Inherit,
        ..ProcessConfig::new("node", &["--watch", "test/server.mjs"], "server")
    }
}

fn default_packager() -> ProcessConfig {
    ProcessConfig::new("pnpm", &["run", "build_js_umd"], "umd")
}

/// `[artifacts]` section. All paths are relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactsSection {
    /// Written by the bundler; watched for changes.
    #[serde(default = "default_primary")]
    pub primary: String,

    /// Where the primary artifact is copied on every real change.
    #[serde(default = "default_secondary")]
    pub secondary: String,

    /// Written by the packager.
    #[serde(default = "default_derived")]
    pub derived: String,

    /// Where the derived artifact is copied after a successful packager run.
    #[serde(default = "default_tertiary")]
    pub tertiary: String,
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: default_secondary(),
            derived: default_derived(),
            tertiary: default_tertiary(),
        }
    }
}

fn default_primary() -> String {
    "dist/module.js".to_string()
}

fn default_secondary() -> String {
    "docs/demos/dist/module.js".to_string()
}

fn default_derived() -> String {
    "dist/umd/simple-datatables.js".to_string()
}

fn default_tertiary() -> String {
    "docs/demos/dist/ksp-table.js".to_string()
}

/// `[detect]` section: phrases used to recognise events in tool output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectSection {
    /// A bundler line containing this and the primary artifact path means
    /// the artifact was written.
    #[serde(default = "default_bundle_marker")]
    pub bundle_marker: String,

    /// A line containing this is a type error.
    #[serde(default = "default_type_error_marker")]
    pub type_error_marker: String,
}

impl Default for DetectSection {
    fn default() -> Self {
        Self {
            bundle_marker: default_bundle_marker(),
            type_error_marker: default_type_error_marker(),
        }
    }
}

fn default_bundle_marker() -> String {
    "created".to_string()
}

fn default_type_error_marker() -> String {
    "error TS".to_string()
}
