// src/exec/process.rs

//! Spawning and supervising a single child process.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::errors::SpawnError;
use crate::exec::signal::{self, TermSignal};
use crate::exec::{ExitKind, ProcessEvent, ProcessState, Role, StreamKind, StreamMode};

/// How long the exit notification waits for the stream pumps to flush what
/// the child wrote right before exiting.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

const READ_BUF_SIZE: usize = 8192;

/// Everything needed to launch one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub role: Role,
    /// Prefix used when relaying this process's output.
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; inherits devloop's own when `None`.
    pub cwd: Option<PathBuf>,
    pub stdout: StreamMode,
    pub stderr: StreamMode,
    /// Delay between a graceful termination request and a forced kill.
    /// `None` never escalates.
    pub grace_period: Option<Duration>,
}

impl ProcessSpec {
    pub fn new<I, S>(role: Role, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role,
            label: role.as_str().to_string(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            stdout: StreamMode::Piped,
            stderr: StreamMode::Piped,
            grace_period: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_streams(mut self, stdout: StreamMode, stderr: StreamMode) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Option<Duration>) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// `program arg1 arg2 ...`, for logs and dry-run output.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Handle to a spawned child process.
///
/// The child itself is owned by a background Tokio task, which:
/// - pumps piped stdout/stderr into [`ProcessEvent::Output`] chunks,
/// - waits for exit and sends exactly one [`ProcessEvent::Exited`],
/// - delivers termination requests and escalates to a forced kill once the
///   grace period runs out.
///
/// Nothing here blocks the caller while the child runs.
#[derive(Debug)]
pub struct ManagedProcess {
    role: Role,
    pid: Option<u32>,
    control: mpsc::UnboundedSender<TermSignal>,
    state: watch::Receiver<ProcessState>,
    terminate_requested: AtomicBool,
}

impl ManagedProcess {
    /// Launch `spec` and start pushing its events into `events`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        spec: &ProcessSpec,
        events: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self, SpawnError> {
        let role = spec.role;

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::inherit())
            .stdout(stdio_for(spec.stdout))
            .stderr(stdio_for(spec.stderr))
            .kill_on_drop(true);

        if let Some(ref dir) = spec.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| SpawnError {
            role,
            program: spec.program.clone(),
            source,
        })?;

        let pid = child.id();
        info!(role = %role, pid, cmd = %spec.command_line(), "process started");

        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(spawn_pump(role, StreamKind::Stdout, stdout, events.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(spawn_pump(role, StreamKind::Stderr, stderr, events.clone()));
        }

        let (state_tx, state_rx) = watch::channel(ProcessState::Starting);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        tokio::spawn(supervise_child(
            role,
            child,
            pumps,
            control_rx,
            state_tx,
            events,
            spec.grace_period,
        ));

        Ok(Self {
            role,
            pid,
            control: control_tx,
            state: state_rx,
            terminate_requested: AtomicBool::new(false),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    pub fn has_exited(&self) -> bool {
        matches!(self.state(), ProcessState::Exited(_))
    }

    /// Request termination.
    ///
    /// Returns `true` only when a request was actually sent. Terminating a
    /// process that already exited, or repeating a graceful request, is a
    /// no-op. Forced kills are always forwarded while the process is alive.
    pub fn terminate(&self, signal: TermSignal) -> bool {
        if self.has_exited() {
            return false;
        }
        if !signal.is_forced() && self.terminate_requested.swap(true, Ordering::SeqCst) {
            debug!(role = %self.role, "termination already requested");
            return false;
        }
        self.control.send(signal).is_ok()
    }

    /// Wait until the process has exited.
    pub async fn wait(&self) -> ExitKind {
        let mut rx = self.state.clone();
        let waited = rx
            .wait_for(|s| matches!(s, ProcessState::Exited(_)))
            .await
            .map(|state| *state);
        let current = match waited {
            Ok(state) => state,
            Err(_) => *rx.borrow(),
        };
        match current {
            ProcessState::Exited(exit) => exit,
            _ => ExitKind::Signaled(None),
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            let _ = self.control.send(TermSignal::Kill);
        }
    }
}

fn stdio_for(mode: StreamMode) -> Stdio {
    match mode {
        StreamMode::Piped => Stdio::piped(),
        StreamMode::Inherit => Stdio::inherit(),
    }
}

/// Forward raw chunks of one stream until EOF.
///
/// Keeps draining after the receiver goes away so the child never blocks on
/// a full pipe.
fn spawn_pump<R>(
    role: Role,
    stream: StreamKind,
    mut reader: R,
    events: mpsc::Sender<ProcessEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        let mut forwarding = true;

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if !forwarding {
                        continue;
                    }
                    let event = ProcessEvent::Output {
                        role,
                        stream,
                        chunk: buf[..n].to_vec(),
                    };
                    if events.send(event).await.is_err() {
                        debug!(role = %role, ?stream, "event receiver gone; discarding output");
                        forwarding = false;
                    }
                }
                Err(e) => {
                    warn!(role = %role, ?stream, error = %e, "error reading process output");
                    break;
                }
            }
        }

        debug!(role = %role, ?stream, "output stream closed");
    })
}

async fn supervise_child(
    role: Role,
    mut child: Child,
    pumps: Vec<JoinHandle<()>>,
    mut control_rx: mpsc::UnboundedReceiver<TermSignal>,
    state_tx: watch::Sender<ProcessState>,
    events: mpsc::Sender<ProcessEvent>,
    grace_period: Option<Duration>,
) {
    state_tx.send_replace(ProcessState::Running);

    let mut kill_deadline: Option<Instant> = None;

    let status = loop {
        tokio::select! {
            res = child.wait() => break res,

            Some(request) = control_rx.recv() => {
                debug!(role = %role, ?request, "delivering termination request");
                if let Err(e) = signal::deliver(&mut child, request) {
                    warn!(role = %role, ?request, error = %e, "failed to signal process");
                }
                if !request.is_forced() && kill_deadline.is_none() {
                    kill_deadline = grace_period.and_then(|grace| Instant::now().checked_add(grace));
                    if grace_period.is_some() && kill_deadline.is_none() {
                        warn!(role = %role, "grace period too large; process will not be force-killed");
                    }
                }
            }

            _ = sleep_until(kill_deadline.unwrap_or_else(Instant::now)), if kill_deadline.is_some() => {
                warn!(role = %role, "process still running after grace period; killing");
                kill_deadline = None;
                if let Err(e) = signal::deliver(&mut child, TermSignal::Kill) {
                    warn!(role = %role, error = %e, "failed to kill process");
                }
            }
        }
    };

    let exit = match status {
        Ok(status) => ExitKind::from_status(status),
        Err(e) => {
            warn!(role = %role, error = %e, "failed waiting for process");
            ExitKind::Signaled(None)
        }
    };

    for pump in pumps {
        if timeout(DRAIN_TIMEOUT, pump).await.is_err() {
            debug!(role = %role, "output still open after exit; not waiting for it");
        }
    }

    state_tx.send_replace(ProcessState::Exited(exit));
    info!(role = %role, %exit, "process exited");

    let _ = events.send(ProcessEvent::Exited { role, exit }).await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(role: Role, script: &str) -> ProcessSpec {
        ProcessSpec::new(role, "sh", ["-c", script])
    }

    async fn collect_until_exit(rx: &mut mpsc::Receiver<ProcessEvent>) -> (Vec<u8>, ExitKind) {
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                ProcessEvent::Output { chunk, .. } => out.extend(chunk),
                ProcessEvent::Exited { exit, .. } => return (out, exit),
            }
        }
        panic!("channel closed before exit notification");
    }

    #[tokio::test]
    async fn output_and_exit_code_are_reported() {
        let (tx, mut rx) = mpsc::channel(16);
        let process = ManagedProcess::spawn(&sh(Role::Packager, "echo hi; exit 3"), tx).unwrap();

        let (out, exit) = collect_until_exit(&mut rx).await;
        assert_eq!(String::from_utf8_lossy(&out), "hi\n");
        assert_eq!(exit, ExitKind::Code(3));
        assert_eq!(process.state(), ProcessState::Exited(ExitKind::Code(3)));
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let (tx, _rx) = mpsc::channel(16);
        let spec = ProcessSpec::new(Role::Checker, "devloop-definitely-not-a-binary", Vec::<String>::new());
        let err = ManagedProcess::spawn(&spec, tx).unwrap_err();
        assert_eq!(err.role, Role::Checker);
        assert_eq!(err.program, "devloop-definitely-not-a-binary");
    }

    #[tokio::test]
    async fn terminating_an_exited_process_is_a_noop() {
        let (tx, mut rx) = mpsc::channel(16);
        let process = ManagedProcess::spawn(&sh(Role::Server, "exit 0"), tx).unwrap();
        let _ = collect_until_exit(&mut rx).await;

        assert!(!process.terminate(TermSignal::Interrupt));
        assert!(!process.terminate(TermSignal::Kill));
    }

    #[tokio::test]
    async fn interrupt_is_reported_as_signal_exit() {
        let (tx, mut rx) = mpsc::channel(16);
        let process = ManagedProcess::spawn(&sh(Role::Server, "exec sleep 30"), tx).unwrap();

        assert!(process.terminate(TermSignal::Interrupt));
        assert!(!process.terminate(TermSignal::Interrupt));

        let (_, exit) = collect_until_exit(&mut rx).await;
        assert_eq!(exit, ExitKind::Signaled(Some(2)));
    }

    #[tokio::test]
    async fn wait_returns_exit_kind() {
        let (tx, mut rx) = mpsc::channel(16);
        let process = ManagedProcess::spawn(&sh(Role::Packager, "exit 4"), tx).unwrap();
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

        let exit = timeout(Duration::from_secs(5), process.wait()).await.unwrap();
        assert_eq!(exit, ExitKind::Code(4));
        assert_eq!(process.wait().await, ExitKind::Code(4));
        drain.await.unwrap();
    }

    #[tokio::test]
    async fn huge_grace_period_still_reports_exit() {
        let (tx, mut rx) = mpsc::channel(16);
        let spec = sh(Role::Server, "exec sleep 30").with_grace_period(Some(Duration::MAX));
        let process = ManagedProcess::spawn(&spec, tx).unwrap();

        assert!(process.terminate(TermSignal::Interrupt));

        let (_, exit) = timeout(Duration::from_secs(5), collect_until_exit(&mut rx))
            .await
            .expect("exit must be reported even when no kill deadline fits");
        assert_eq!(exit, ExitKind::Signaled(Some(2)));
    }

    #[tokio::test]
    async fn grace_period_escalates_to_kill() {
        let (tx, mut rx) = mpsc::channel(16);
        let spec = sh(Role::Bundler, "trap '' INT; while true; do sleep 1; done")
            .with_grace_period(Some(Duration::from_millis(200)));
        let process = ManagedProcess::spawn(&spec, tx).unwrap();

        // Give the shell a moment to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(process.terminate(TermSignal::Interrupt));

        let (_, exit) = timeout(Duration::from_secs(5), collect_until_exit(&mut rx))
            .await
            .expect("process should be killed after the grace period");
        assert_eq!(exit, ExitKind::Signaled(Some(9)));
    }
}
