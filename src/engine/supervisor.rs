// src/engine/supervisor.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactPropagator;
use crate::config::Topology;
use crate::errors::SpawnError;
use crate::exec::{ManagedProcess, ProcessEvent, Role};
use crate::fs::FileSystem;

use super::core::SupervisorCore;
use super::derived::DerivedBuild;
use super::{relay, CoreCommand, Outcome, ShutdownSignal, SupervisorEvent};

const EVENT_CHANNEL_SIZE: usize = 256;

/// The async shell around [`SupervisorCore`].
///
/// Owns the three long-running processes, the channels their events arrive
/// on and the task of any running derived build. All decisions are made by
/// the core; this only moves events in and executes commands out.
pub struct Supervisor {
    core: SupervisorCore,
    processes: Vec<ManagedProcess>,
    process_rx: mpsc::Receiver<ProcessEvent>,
    event_tx: mpsc::Sender<SupervisorEvent>,
    event_rx: mpsc::Receiver<SupervisorEvent>,
    derived_build: Arc<DerivedBuild>,
    derived_run: Option<DerivedRun>,
}

struct DerivedRun {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("core", &self.core)
            .field("processes", &self.processes)
            .finish_non_exhaustive()
    }
}

/// Cloneable handle for asking a running [`Supervisor`] to shut down.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<SupervisorEvent>,
}

impl ShutdownHandle {
    /// Returns `false` once the supervisor is gone.
    pub async fn request(&self, signal: ShutdownSignal) -> bool {
        self.tx
            .send(SupervisorEvent::ShutdownRequested(signal))
            .await
            .is_ok()
    }
}

impl Supervisor {
    /// Prepare artifact directories and start the long-running processes.
    ///
    /// If any of them fails to spawn, the ones already started are killed
    /// and the error is returned.
    pub fn start(topology: &Topology, fs: Arc<dyn FileSystem>) -> Result<Self, SpawnError> {
        let propagator = ArtifactPropagator::new(Arc::clone(&fs));
        let routes = &topology.routes;

        if topology.ensure_dirs {
            for dest in [&routes.secondary, &routes.tertiary] {
                if let Err(e) = propagator.ensure_destination(dest) {
                    warn!(path = ?dest, error = %e, "could not create artifact directory");
                }
            }
        }

        let (process_tx, process_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let mut processes = Vec::with_capacity(Role::LONG_RUNNING.len());
        for role in Role::LONG_RUNNING {
            // On error `processes` is dropped, which kills what already runs.
            processes.push(ManagedProcess::spawn(topology.spec(role), process_tx.clone())?);
        }
        drop(process_tx);

        info!("development environment started");
        for role in Role::LONG_RUNNING {
            let spec = topology.spec(role);
            info!(role = %role, label = %spec.label, "  {}", spec.command_line());
        }
        info!(from = ?routes.primary, to = ?routes.secondary, "  primary bundle route");
        info!(from = ?routes.derived, to = ?routes.tertiary, "  derived bundle route");

        let derived_build = DerivedBuild::new(
            topology.packager.clone(),
            routes.derived.clone(),
            routes.tertiary.clone(),
            propagator,
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        Ok(Self {
            core: SupervisorCore::new(topology, fs),
            processes,
            process_rx,
            event_tx,
            event_rx,
            derived_build: Arc::new(derived_build),
            derived_run: None,
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.event_tx.clone(),
        }
    }

    /// Process ids of the managed processes, in startup order.
    pub fn pids(&self) -> Vec<(Role, Option<u32>)> {
        self.processes.iter().map(|p| (p.role(), p.pid())).collect()
    }

    /// Main event loop. Returns once shutdown completed.
    pub async fn run(mut self) -> Outcome {
        debug!("supervisor loop started");

        let outcome = loop {
            let event = tokio::select! {
                Some(event) = self.process_rx.recv() => SupervisorEvent::Process(event),
                Some(event) = self.event_rx.recv() => event,
                else => break self.core.cause().unwrap_or(Outcome::AllExited),
            };

            let step = self.core.step(event);
            for command in step.commands {
                self.execute(command);
            }

            if let Some(outcome) = step.outcome {
                break outcome;
            }
        };

        if let Some(run) = self.derived_run.take() {
            let _ = run.handle.await;
        }

        info!(%outcome, "supervisor exiting");
        outcome
    }

    fn execute(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Relay { label, line } => relay(&label, &line),
            CoreCommand::RunDerivedBuild => self.spawn_derived_build(),
            CoreCommand::TerminateAll(signal) => {
                for process in &self.processes {
                    if process.terminate(signal) {
                        debug!(role = %process.role(), ?signal, "termination requested");
                    }
                }
                if let Some(cancel) = self.derived_run.as_mut().and_then(|r| r.cancel.take()) {
                    let _ = cancel.send(());
                }
            }
        }
    }

    fn spawn_derived_build(&mut self) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let build = Arc::clone(&self.derived_build);
        let tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let result = build.run(cancel_rx).await;
            let _ = tx.send(SupervisorEvent::DerivedBuildFinished(result)).await;
        });

        self.derived_run = Some(DerivedRun {
            cancel: Some(cancel_tx),
            handle,
        });
    }
}
