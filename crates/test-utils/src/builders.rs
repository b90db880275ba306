use std::path::Path;

use devloop::config::{validate_config, ConfigFile, ProcessConfig, Topology};
use devloop::exec::StreamMode;

/// Script used for processes a test does not care about.
pub const IDLE: &str = "exec sleep 30";

/// A `sh -c <script>` process with both streams piped.
pub fn sh(script: &str) -> ProcessConfig {
    ProcessConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        stdout: StreamMode::Piped,
        stderr: StreamMode::Piped,
        label: None,
    }
}

/// Builder for `ConfigFile` whose processes are shell one-liners.
///
/// Starts with every long-running process idling, a packager that succeeds
/// without writing anything, a 1s grace period and the default artifact
/// paths.
pub struct ConfigFileBuilder {
    config: ConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = ConfigFile::default();
        config.checker = sh(IDLE);
        config.bundler = sh(IDLE);
        config.server = sh(IDLE);
        config.packager = sh("exit 0");
        config.supervisor.grace_period = "1s".to_string();
        Self { config }
    }

    pub fn checker(mut self, script: &str) -> Self {
        self.config.checker = sh(script);
        self
    }

    pub fn bundler(mut self, script: &str) -> Self {
        self.config.bundler = sh(script);
        self
    }

    pub fn server(mut self, script: &str) -> Self {
        self.config.server = sh(script);
        self
    }

    pub fn packager(mut self, script: &str) -> Self {
        self.config.packager = sh(script);
        self
    }

    /// Replace the bundler with an arbitrary program (e.g. a missing one).
    pub fn bundler_program(mut self, program: &str) -> Self {
        self.config.bundler.program = program.to_string();
        self.config.bundler.args.clear();
        self
    }

    pub fn grace_period(mut self, grace: &str) -> Self {
        self.config.supervisor.grace_period = grace.to_string();
        self
    }

    pub fn ensure_dirs(mut self, val: bool) -> Self {
        self.config.supervisor.ensure_dirs = val;
        self
    }

    pub fn build(self) -> ConfigFile {
        validate_config(&self.config).expect("builder produced an invalid config");
        self.config
    }

    /// Build and resolve against `root`.
    pub fn topology(self, root: &Path) -> Topology {
        Topology::from_config(&self.build(), root, None).expect("failed to resolve topology")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Script for a bundler that writes the primary artifact, announces it
/// `announcements` times on stderr like rollup does, then idles.
pub fn bundler_writing(contents: &str, announcements: usize) -> String {
    let mut script = format!("mkdir -p dist && printf '%s' '{contents}' > dist/module.js");
    for _ in 0..announcements {
        script.push_str(" && echo 'created dist/module.js in 12ms' >&2");
    }
    script.push_str(" && exec sleep 30");
    script
}

/// Script for a packager that writes the derived artifact and exits with
/// `code`, appending a line to `builds.log` every run.
pub fn packager_writing(contents: &str, code: i32) -> String {
    format!(
        "echo run >> builds.log && mkdir -p dist/umd && printf '%s' '{contents}' > dist/umd/simple-datatables.js && exit {code}"
    )
}
