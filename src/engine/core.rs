// src/engine/core.rs

//! Pure core supervisor state machine.
//!
//! [`SupervisorCore`] consumes [`SupervisorEvent`]s one at a time and
//! returns the [`CoreCommand`]s the IO shell should execute. It owns all the
//! mutable coordination state (change gate, derived-build state, shutdown
//! flag, set of live processes), so the single shell loop feeding it is the
//! only place that state is ever touched.
//!
//! It holds no channels or processes; filesystem access goes through the
//! [`FileSystem`] trait, so tests drive it with the in-memory mock.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::artifact::{ArtifactPropagator, ChangeGate};
use crate::config::{ArtifactRoutes, Topology};
use crate::detect::{Detector, LinePredicate, OutputEvent};
use crate::errors::{BuildError, ManagedProcessExit};
use crate::exec::{ExitKind, ProcessEvent, Role, StreamKind, TermSignal};
use crate::fs::FileSystem;

use super::derived::DerivedBuildTrigger;
use super::shutdown::ShutdownState;
use super::{CoreCommand, CoreStep, Outcome, SupervisorEvent};

#[derive(Debug)]
pub struct SupervisorCore {
    routes: ArtifactRoutes,
    labels: HashMap<Role, String>,
    predicates: HashMap<Role, Vec<LinePredicate>>,
    detectors: HashMap<(Role, StreamKind), Detector>,
    gate: ChangeGate,
    propagator: ArtifactPropagator,
    derived: DerivedBuildTrigger,
    shutdown: ShutdownState,
    cause: Option<Outcome>,
    live: BTreeSet<Role>,
}

impl SupervisorCore {
    /// Core for a topology whose three long-running processes have all been
    /// started.
    pub fn new(topology: &Topology, fs: Arc<dyn FileSystem>) -> Self {
        let labels = Role::LONG_RUNNING
            .iter()
            .map(|&role| (role, topology.spec(role).label.clone()))
            .collect();
        let predicates = Role::LONG_RUNNING
            .iter()
            .map(|&role| (role, topology.predicates(role)))
            .collect();

        Self {
            routes: topology.routes.clone(),
            labels,
            predicates,
            detectors: HashMap::new(),
            gate: ChangeGate::new(Arc::clone(&fs)),
            propagator: ArtifactPropagator::new(fs),
            derived: DerivedBuildTrigger::new(),
            shutdown: ShutdownState::new(),
            cause: None,
            live: Role::LONG_RUNNING.into_iter().collect(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_initiated()
    }

    /// Long-running processes that have not exited yet.
    pub fn live(&self) -> impl Iterator<Item = Role> + '_ {
        self.live.iter().copied()
    }

    pub fn derived(&self) -> &DerivedBuildTrigger {
        &self.derived
    }

    pub fn gate(&self) -> &ChangeGate {
        &self.gate
    }

    /// Why the shutdown started, once it has.
    pub fn cause(&self) -> Option<Outcome> {
        self.cause
    }

    /// Handle a single event, updating state and returning the resulting
    /// commands for the IO shell.
    pub fn step(&mut self, event: SupervisorEvent) -> CoreStep {
        let mut commands = Vec::new();

        match event {
            SupervisorEvent::Process(ProcessEvent::Output { role, stream, chunk }) => {
                self.handle_output(role, stream, &chunk, &mut commands);
            }
            SupervisorEvent::Process(ProcessEvent::Exited { role, exit }) => {
                self.handle_exit(role, exit, &mut commands);
            }
            SupervisorEvent::DerivedBuildFinished(result) => {
                self.handle_derived_finished(result, &mut commands);
            }
            SupervisorEvent::ShutdownRequested(signal) => {
                if !self.begin_shutdown(Outcome::Interrupted(signal), &mut commands) {
                    info!(?signal, "shutdown already in progress");
                }
            }
        }

        CoreStep {
            commands,
            outcome: self.finished(),
        }
    }

    fn handle_output(
        &mut self,
        role: Role,
        stream: StreamKind,
        chunk: &[u8],
        commands: &mut Vec<CoreCommand>,
    ) {
        let lines = self.detector(role, stream).lines(chunk);
        for line in lines {
            self.handle_line(role, stream, line, commands);
        }
    }

    fn handle_line(
        &mut self,
        role: Role,
        stream: StreamKind,
        line: String,
        commands: &mut Vec<CoreCommand>,
    ) {
        let event = self.detector(role, stream).classify_line(&line);
        commands.push(CoreCommand::Relay {
            label: self.label(role),
            line,
        });
        self.react(role, event, commands);
    }

    fn react(&mut self, role: Role, event: OutputEvent, commands: &mut Vec<CoreCommand>) {
        match event {
            OutputEvent::BundleWritten(announced) if role == Role::Bundler => {
                if self.is_shutting_down() {
                    debug!(path = ?announced, "ignoring bundle announcement during shutdown");
                    return;
                }
                self.handle_bundle_written(&announced, commands);
            }
            OutputEvent::BundleWritten(announced) => {
                debug!(role = %role, path = ?announced, "bundle announcement from non-bundler ignored");
            }
            OutputEvent::TypeError(message) => {
                warn!(role = %role, "type error: {message}");
            }
            OutputEvent::Generic(_) => {}
        }
    }

    fn handle_bundle_written(&mut self, announced: &Path, commands: &mut Vec<CoreCommand>) {
        let artifact = self.routes.resolve(announced);
        let decision = self.gate.observe(&artifact);
        if !decision.changed {
            return;
        }

        info!(path = ?artifact, "new build detected");
        // A failed copy is logged by the propagator and retried on the next
        // change; the derived build still runs.
        let _ = self.propagator.propagate(&artifact, &self.routes.secondary);

        if self.derived.request() {
            commands.push(CoreCommand::RunDerivedBuild);
        }
    }

    fn handle_exit(&mut self, role: Role, exit: ExitKind, commands: &mut Vec<CoreCommand>) {
        for stream in [StreamKind::Stdout, StreamKind::Stderr] {
            let rest = self
                .detectors
                .get_mut(&(role, stream))
                .and_then(|d| d.finish());
            if let Some(line) = rest {
                self.handle_line(role, stream, line, commands);
            }
        }

        if !self.live.remove(&role) {
            debug!(role = %role, "exit for process that is not live");
            return;
        }

        if self.is_shutting_down() {
            info!(role = %role, %exit, "process stopped");
            return;
        }

        if !exit.success() {
            let failure = ManagedProcessExit { role, exit };
            error!(role = %role, %exit, "{failure}; stopping all processes");
            self.begin_shutdown(Outcome::Failed(failure), commands);
            return;
        }

        info!(role = %role, "process exited cleanly");
        if self.live.is_empty() {
            self.begin_shutdown(Outcome::AllExited, commands);
        }
    }

    fn handle_derived_finished(
        &mut self,
        result: Result<(), BuildError>,
        commands: &mut Vec<CoreCommand>,
    ) {
        match result {
            Ok(()) => info!("derived build completed"),
            Err(BuildError::Cancelled) => info!("derived build cancelled"),
            Err(e) => warn!(error = %e, "derived build failed"),
        }

        if self.derived.finish() {
            info!("changes arrived during derived build; building again");
            commands.push(CoreCommand::RunDerivedBuild);
        }
    }

    /// Start the shutdown protocol. Returns `false` if it already started.
    fn begin_shutdown(&mut self, cause: Outcome, commands: &mut Vec<CoreCommand>) -> bool {
        if !self.shutdown.begin() {
            return false;
        }

        info!(%cause, "stopping all processes");
        self.cause = Some(cause);
        self.derived.drop_follow_up();
        commands.push(CoreCommand::TerminateAll(TermSignal::Interrupt));
        true
    }

    /// Done once shutdown started, every process is gone and no derived
    /// build is still winding down.
    fn finished(&self) -> Option<Outcome> {
        if self.is_shutting_down() && self.live.is_empty() && self.derived.is_idle() {
            self.cause
        } else {
            None
        }
    }

    fn detector(&mut self, role: Role, stream: StreamKind) -> &mut Detector {
        let predicates = &self.predicates;
        self.detectors.entry((role, stream)).or_insert_with(|| {
            Detector::new(predicates.get(&role).cloned().unwrap_or_default())
        })
    }

    fn label(&self, role: Role) -> String {
        self.labels
            .get(&role)
            .cloned()
            .unwrap_or_else(|| role.as_str().to_string())
    }
}
