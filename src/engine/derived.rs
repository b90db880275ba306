// src/engine/derived.rs

//! The secondary (derived) build.
//!
//! [`DerivedBuildTrigger`] is the synchronous state machine the supervisor
//! core uses to decide *when* to build; [`DerivedBuild`] is the async part
//! that actually runs the packager and copies its output.
//!
//! ```text
//! Idle --request--> Running { follow_up: false } --finish--> Idle
//!                      |                ^
//!                   request          finish (starts the follow-up)
//!                      v                |
//!                   Running { follow_up: true }
//! ```
//!
//! Success, failure and propagation all happen inside one
//! [`DerivedBuild::run`]; the trigger only sees that the run finished.
//!
//! Requests that arrive while a build runs are coalesced into a single
//! follow-up build, started once the current one finishes.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactPropagator;
use crate::detect::Detector;
use crate::engine::relay;
use crate::errors::BuildError;
use crate::exec::{ManagedProcess, ProcessEvent, ProcessSpec, StreamKind, TermSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedState {
    Idle,
    Running { follow_up: bool },
}

#[derive(Debug)]
pub struct DerivedBuildTrigger {
    state: DerivedState,
    started: u64,
}

impl Default for DerivedBuildTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl DerivedBuildTrigger {
    pub fn new() -> Self {
        Self {
            state: DerivedState::Idle,
            started: 0,
        }
    }

    pub fn state(&self) -> DerivedState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == DerivedState::Idle
    }

    /// Number of builds started so far.
    pub fn started(&self) -> u64 {
        self.started
    }

    /// Ask for a build. Returns `true` when the caller should start one now;
    /// otherwise the request was folded into the pending follow-up.
    pub fn request(&mut self) -> bool {
        match self.state {
            DerivedState::Idle => {
                self.state = DerivedState::Running { follow_up: false };
                self.started += 1;
                true
            }
            DerivedState::Running { follow_up } => {
                if follow_up {
                    debug!("derived build already running with follow-up queued");
                } else {
                    debug!("derived build already running; queued one follow-up");
                }
                self.state = DerivedState::Running { follow_up: true };
                false
            }
        }
    }

    /// The running build finished. Returns `true` when the queued follow-up
    /// should start now (the state stays `Running`).
    pub fn finish(&mut self) -> bool {
        match self.state {
            DerivedState::Running { follow_up: true } => {
                self.state = DerivedState::Running { follow_up: false };
                self.started += 1;
                true
            }
            _ => {
                self.state = DerivedState::Idle;
                false
            }
        }
    }

    /// Forget a queued follow-up (used on shutdown).
    pub fn drop_follow_up(&mut self) {
        if let DerivedState::Running { follow_up: true } = self.state {
            self.state = DerivedState::Running { follow_up: false };
        }
    }
}

/// A runnable derived build: the packager command plus where its artifact
/// goes.
#[derive(Debug, Clone)]
pub struct DerivedBuild {
    spec: ProcessSpec,
    artifact: PathBuf,
    destination: PathBuf,
    propagator: ArtifactPropagator,
}

impl DerivedBuild {
    pub fn new(
        spec: ProcessSpec,
        artifact: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        propagator: ArtifactPropagator,
    ) -> Self {
        Self {
            spec,
            artifact: artifact.into(),
            destination: destination.into(),
            propagator,
        }
    }

    /// Run the packager once, relaying its output, and copy the derived
    /// artifact on success.
    ///
    /// A failed build leaves the previously copied artifact untouched. A copy
    /// failure is logged by the propagator and does not fail the build.
    /// Firing (or dropping) `cancel` terminates the packager.
    pub async fn run(&self, mut cancel: oneshot::Receiver<()>) -> Result<(), BuildError> {
        info!(cmd = %self.spec.command_line(), "building derived artifact");

        let (tx, mut rx) = mpsc::channel::<ProcessEvent>(64);
        let process = ManagedProcess::spawn(&self.spec, tx)?;

        let mut stdout = Detector::new(Vec::new());
        let mut stderr = Detector::new(Vec::new());
        let mut cancelled = false;

        let exit = loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(ProcessEvent::Output { stream, chunk, .. }) => {
                        let detector = match stream {
                            StreamKind::Stdout => &mut stdout,
                            StreamKind::Stderr => &mut stderr,
                        };
                        for line in detector.lines(&chunk) {
                            relay(&self.spec.label, &line);
                        }
                    }
                    Some(ProcessEvent::Exited { exit, .. }) => break exit,
                    None => break process.wait().await,
                },

                _ = &mut cancel, if !cancelled => {
                    info!("cancelling derived build");
                    cancelled = true;
                    process.terminate(TermSignal::Interrupt);
                }
            }
        };

        for line in stdout.finish().into_iter().chain(stderr.finish()) {
            relay(&self.spec.label, &line);
        }

        if cancelled {
            return Err(BuildError::Cancelled);
        }

        if !exit.success() {
            warn!(%exit, "derived build failed; keeping previous {:?}", self.destination);
            return Err(BuildError::Failed { exit });
        }

        info!("derived build succeeded; propagating artifact");
        // The propagator logs copy failures; the next build retries.
        let _ = self.propagator.propagate(&self.artifact, &self.destination);
        Ok(())
    }
}
