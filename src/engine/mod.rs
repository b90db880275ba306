// src/engine/mod.rs

//! Orchestration engine for devloop.
//!
//! The supervisor reacts to:
//!   - output chunks and exits of the three long-running processes
//!   - completion of derived builds
//!   - operator shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell that
//! owns processes and channels is implemented in [`supervisor`].

use std::fmt;
use std::io::{self, Write};

use tracing::debug;

use crate::errors::{BuildError, ManagedProcessExit};
use crate::exec::{ProcessEvent, TermSignal};

pub mod core;
pub mod derived;
pub mod shutdown;
pub mod signals;
pub mod supervisor;

pub use self::core::SupervisorCore;
pub use derived::{DerivedBuild, DerivedBuildTrigger, DerivedState};
pub use shutdown::ShutdownState;
pub use supervisor::{ShutdownHandle, Supervisor};

/// Which operator signal asked devloop to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Events flowing into the supervisor.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// Output or exit of a long-running process.
    Process(ProcessEvent),
    /// A derived build task ended.
    DerivedBuildFinished(Result<(), BuildError>),
    /// The operator asked devloop to stop.
    ShutdownRequested(ShutdownSignal),
}

/// Command produced by the core, to be executed by the IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Print one line of a child's output under its label.
    Relay { label: String, line: String },
    /// Start one derived build.
    RunDerivedBuild,
    /// Send `signal` to every managed process still alive and cancel any
    /// running derived build.
    TerminateAll(TermSignal),
}

/// Why the supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every long-running process exited on its own with code 0.
    AllExited,
    /// The operator asked for a shutdown.
    Interrupted(ShutdownSignal),
    /// A long-running process died.
    Failed(ManagedProcessExit),
}

impl Outcome {
    /// Exit code for devloop itself.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::AllExited | Outcome::Interrupted(_) => 0,
            Outcome::Failed(_) => 1,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::AllExited => f.write_str("all processes exited"),
            Outcome::Interrupted(signal) => write!(f, "stopped by {signal:?}"),
            Outcome::Failed(exit) => write!(f, "{exit}"),
        }
    }
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Set once the supervisor is done.
    pub outcome: Option<Outcome>,
}

impl CoreStep {
    pub fn keep_running(&self) -> bool {
        self.outcome.is_none()
    }
}

/// Write one relayed child line to stdout. Diagnostics go to stderr.
///
/// A closed stdout (e.g. `devloop | head`) only drops relayed output.
pub(crate) fn relay(label: &str, line: &str) {
    if let Err(e) = write_relayed(&mut std::io::stdout().lock(), label, line) {
        if e.kind() != io::ErrorKind::BrokenPipe {
            debug!(error = %e, "failed to relay output line");
        }
    }
}

fn write_relayed(out: &mut impl Write, label: &str, line: &str) -> io::Result<()> {
    writeln!(out, "[{label}] {line}")
}
