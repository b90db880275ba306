// src/exec/mod.rs

//! Process execution layer.
//!
//! Every child process devloop runs goes through [`ManagedProcess`], which
//! wraps a `tokio::process::Child` and reports back over an mpsc channel:
//!
//! - [`process`] owns spawning, stream pumping, exit detection and the
//!   termination / forced-kill protocol.
//! - [`signal`] delivers POSIX signals to a child (falls back to a plain kill
//!   on platforms without them).

pub mod process;
pub mod signal;

use std::fmt;

use serde::Deserialize;

pub use process::{ManagedProcess, ProcessSpec};
pub use signal::TermSignal;

/// Which slot of the fixed topology a process fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// File-watching type-checker (`tsc --watch`).
    Checker,
    /// Module bundler in watch mode (`rollup --watch`).
    Bundler,
    /// Test server.
    Server,
    /// One-shot secondary packager, spawned on demand.
    Packager,
}

impl Role {
    /// The three long-running roles, in startup order.
    pub const LONG_RUNNING: [Role; 3] = [Role::Server, Role::Checker, Role::Bundler];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Checker => "checker",
            Role::Bundler => "bundler",
            Role::Server => "server",
            Role::Packager => "packager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two output streams of a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// How a child's output stream is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Captured and delivered as [`ProcessEvent::Output`] chunks.
    #[default]
    Piped,
    /// Shared with devloop's own stream; never observed.
    Inherit,
}

/// How a process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Exited on its own with this code.
    Code(i32),
    /// Terminated by a signal (number when known).
    Signaled(Option<i32>),
}

impl ExitKind {
    pub fn success(self) -> bool {
        matches!(self, ExitKind::Code(0))
    }

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitKind::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            ExitKind::Signaled(status.signal())
        }

        #[cfg(not(unix))]
        {
            ExitKind::Signaled(None)
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Code(code) => write!(f, "exit code {code}"),
            ExitKind::Signaled(Some(sig)) => write!(f, "killed by signal {sig}"),
            ExitKind::Signaled(None) => f.write_str("killed by signal"),
        }
    }
}

/// Lifecycle of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Exited(ExitKind),
}

/// Notifications a [`ManagedProcess`] pushes to whoever owns its channel.
///
/// Chunks of one stream arrive in program order. Nothing is guaranteed about
/// the relative order of different processes' events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output {
        role: Role,
        stream: StreamKind,
        chunk: Vec<u8>,
    },
    Exited {
        role: Role,
        exit: ExitKind,
    },
}
