// src/config/topology.rs

//! The resolved, ready-to-run form of a [`ConfigFile`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::duration::parse_grace_period;
use crate::config::model::{ConfigFile, DetectSection, ProcessConfig};
use crate::detect::LinePredicate;
use crate::errors::{DevloopError, Result};
use crate::exec::{ProcessSpec, Role};

/// Where artifacts come from and where they are copied, resolved against the
/// project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRoutes {
    pub root: PathBuf,
    pub primary: PathBuf,
    pub secondary: PathBuf,
    pub derived: PathBuf,
    pub tertiary: PathBuf,
}

impl ArtifactRoutes {
    /// Resolve a path as announced by a tool (usually root-relative).
    pub fn resolve(&self, announced: &Path) -> PathBuf {
        self.root.join(announced)
    }
}

/// The fixed process topology plus artifact routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub checker: ProcessSpec,
    pub bundler: ProcessSpec,
    pub server: ProcessSpec,
    pub packager: ProcessSpec,
    pub routes: ArtifactRoutes,
    /// Relative primary path, as the bundler prints it.
    pub announced_primary: PathBuf,
    pub detect: DetectSection,
    pub grace_period: Option<Duration>,
    pub ensure_dirs: bool,
}

impl Topology {
    /// Resolve `cfg` against `root`.
    ///
    /// `grace_override` replaces `[supervisor].grace_period` when set.
    pub fn from_config(
        cfg: &ConfigFile,
        root: &Path,
        grace_override: Option<Option<Duration>>,
    ) -> Result<Self> {
        let grace_period = match grace_override {
            Some(grace) => grace,
            None => parse_grace_period(&cfg.supervisor.grace_period).map_err(|e| {
                DevloopError::Config(format!("invalid [supervisor].grace_period: {e}"))
            })?,
        };

        let spec = |role: Role, process: &ProcessConfig| {
            let label = process
                .label
                .clone()
                .unwrap_or_else(|| role.as_str().to_string());
            ProcessSpec::new(role, process.program.clone(), process.args.clone())
                .with_label(label)
                .with_cwd(root)
                .with_streams(process.stdout, process.stderr)
                .with_grace_period(grace_period)
        };

        let a = &cfg.artifacts;
        let routes = ArtifactRoutes {
            root: root.to_path_buf(),
            primary: root.join(&a.primary),
            secondary: root.join(&a.secondary),
            derived: root.join(&a.derived),
            tertiary: root.join(&a.tertiary),
        };

        Ok(Self {
            checker: spec(Role::Checker, &cfg.checker),
            bundler: spec(Role::Bundler, &cfg.bundler),
            server: spec(Role::Server, &cfg.server),
            packager: spec(Role::Packager, &cfg.packager),
            routes,
            announced_primary: PathBuf::from(&a.primary),
            detect: cfg.detect.clone(),
            grace_period,
            ensure_dirs: cfg.supervisor.ensure_dirs,
        })
    }

    pub fn spec(&self, role: Role) -> &ProcessSpec {
        match role {
            Role::Checker => &self.checker,
            Role::Bundler => &self.bundler,
            Role::Server => &self.server,
            Role::Packager => &self.packager,
        }
    }

    /// Ordered predicates for classifying output of `role`.
    ///
    /// Only the bundler announces artifacts; every role may report type
    /// errors (the bundler's TypeScript plugin does too).
    pub fn predicates(&self, role: Role) -> Vec<LinePredicate> {
        let mut predicates = Vec::new();
        if role == Role::Bundler {
            predicates.push(LinePredicate::bundle_written(
                self.detect.bundle_marker.clone(),
                &self.announced_primary,
            ));
        }
        if matches!(role, Role::Bundler | Role::Checker) {
            predicates.push(LinePredicate::type_error(
                self.detect.type_error_marker.clone(),
            ));
        }
        predicates
    }
}
