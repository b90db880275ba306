#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use devloop::engine::{Outcome, ShutdownSignal, Supervisor};
use devloop::errors::ManagedProcessExit;
use devloop::exec::{ExitKind, Role};
use devloop::fs::RealFileSystem;
use devloop_test_utils::builders::{bundler_writing, packager_writing, ConfigFileBuilder};
use devloop_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Poll until `path` holds exactly `expected`.
async fn wait_for_contents(path: &Path, expected: &str) {
    loop {
        if fs::read_to_string(path).map(|s| s == expected).unwrap_or(false) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

async fn wait_for_lines(path: &Path, n: usize) {
    loop {
        let count = fs::read_to_string(path).map(|s| s.lines().count()).unwrap_or(0);
        if count >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Shell loop that appends `name` to `signals.log` on SIGINT and exits.
fn trapping(name: &str) -> String {
    format!("trap 'echo {name} >> signals.log; exit 0' INT; while :; do sleep 0.05; done")
}

fn line_count(path: &Path) -> usize {
    fs::read_to_string(path).map(|s| s.lines().count()).unwrap_or(0)
}

#[tokio::test]
async fn bundle_written_copies_and_runs_derived_build() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    let topology = ConfigFileBuilder::new()
        .bundler(&bundler_writing("export {}", 1))
        .packager(&packager_writing("umd bundle", 0))
        .topology(root);

    let supervisor = Supervisor::start(&topology, Arc::new(RealFileSystem))?;
    let shutdown = supervisor.shutdown_handle();
    let run = tokio::spawn(supervisor.run());

    with_timeout(async {
        wait_for_contents(&root.join("docs/demos/dist/module.js"), "export {}").await;
        wait_for_contents(&root.join("docs/demos/dist/ksp-table.js"), "umd bundle").await;
    })
    .await;

    assert!(shutdown.request(ShutdownSignal::Interrupt).await);
    let outcome = with_timeout(run).await?;

    assert_eq!(outcome, Outcome::Interrupted(ShutdownSignal::Interrupt));
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(line_count(&root.join("builds.log")), 1);
    Ok(())
}

#[tokio::test]
async fn cosmetic_reannouncement_is_ignored() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    let topology = ConfigFileBuilder::new()
        .bundler(&bundler_writing("export {}", 3))
        .packager(&packager_writing("umd bundle", 0))
        .topology(root);

    let supervisor = Supervisor::start(&topology, Arc::new(RealFileSystem))?;
    let shutdown = supervisor.shutdown_handle();
    let run = tokio::spawn(supervisor.run());

    with_timeout(wait_for_lines(&root.join("builds.log"), 1)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    shutdown.request(ShutdownSignal::Terminate).await;
    let outcome = with_timeout(run).await?;

    assert_eq!(outcome, Outcome::Interrupted(ShutdownSignal::Terminate));
    assert_eq!(line_count(&root.join("builds.log")), 1);
    Ok(())
}

#[tokio::test]
async fn failed_derived_build_leaves_tertiary_untouched() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    fs::create_dir_all(root.join("docs/demos/dist"))?;
    fs::write(root.join("docs/demos/dist/ksp-table.js"), "previous")?;

    let topology = ConfigFileBuilder::new()
        .bundler(&bundler_writing("export {}", 1))
        .packager(&packager_writing("garbage", 1))
        .topology(root);

    let supervisor = Supervisor::start(&topology, Arc::new(RealFileSystem))?;
    let shutdown = supervisor.shutdown_handle();
    let run = tokio::spawn(supervisor.run());

    with_timeout(wait_for_lines(&root.join("builds.log"), 1)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    shutdown.request(ShutdownSignal::Interrupt).await;
    let outcome = with_timeout(run).await?;

    // A failed derived build is not a supervisor failure.
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(fs::read_to_string(root.join("docs/demos/dist/ksp-table.js"))?, "previous");
    assert_eq!(fs::read_to_string(root.join("docs/demos/dist/module.js"))?, "export {}");
    Ok(())
}

#[tokio::test]
async fn server_failure_stops_everything_with_nonzero_outcome() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    let topology = ConfigFileBuilder::new()
        .checker(&trapping("checker"))
        .bundler(&trapping("bundler"))
        .server("sleep 0.3; exit 1")
        .topology(root);

    let supervisor = Supervisor::start(&topology, Arc::new(RealFileSystem))?;
    let outcome = with_timeout(supervisor.run()).await;

    assert_eq!(
        outcome,
        Outcome::Failed(ManagedProcessExit {
            role: Role::Server,
            exit: ExitKind::Code(1),
        })
    );
    assert_eq!(outcome.exit_code(), 1);

    let log = fs::read_to_string(root.join("signals.log"))?;
    let mut lines: Vec<_> = log.lines().collect();
    lines.sort_unstable();
    assert_eq!(lines, vec!["bundler", "checker"]);
    Ok(())
}

#[tokio::test]
async fn clean_exit_of_every_process_finishes_with_zero() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let topology = ConfigFileBuilder::new()
        .checker("echo 'Found 0 errors'")
        .bundler("exit 0")
        .server("echo listening")
        .topology(dir.path());

    let supervisor = Supervisor::start(&topology, Arc::new(RealFileSystem))?;
    let outcome = with_timeout(supervisor.run()).await;

    assert_eq!(outcome, Outcome::AllExited);
    assert_eq!(outcome.exit_code(), 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_shutdown_requests_signal_each_process_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    let topology = ConfigFileBuilder::new()
        .checker(&trapping("checker"))
        .bundler(&trapping("bundler"))
        .server(&trapping("server"))
        .topology(root);

    let supervisor = Supervisor::start(&topology, Arc::new(RealFileSystem))?;
    let shutdown = supervisor.shutdown_handle();
    let run = tokio::spawn(supervisor.run());

    // Let the shells install their traps.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (a, b, c) = tokio::join!(
        shutdown.request(ShutdownSignal::Interrupt),
        shutdown.request(ShutdownSignal::Interrupt),
        shutdown.request(ShutdownSignal::Terminate),
    );
    assert!(a && b && c);

    let outcome = with_timeout(run).await?;
    assert!(matches!(outcome, Outcome::Interrupted(_)));

    let log = fs::read_to_string(root.join("signals.log"))?;
    let mut lines: Vec<_> = log.lines().collect();
    lines.sort_unstable();
    assert_eq!(lines, vec!["bundler", "checker", "server"]);
    Ok(())
}

#[tokio::test]
async fn spawn_failure_aborts_startup() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let topology = ConfigFileBuilder::new()
        .bundler_program("/nonexistent/devloop-missing-bundler")
        .topology(dir.path());

    let err = Supervisor::start(&topology, Arc::new(RealFileSystem))
        .expect_err("missing bundler must fail startup");

    assert_eq!(err.role, Role::Bundler);
    assert_eq!(err.program, "/nonexistent/devloop-missing-bundler");
    Ok(())
}

#[tokio::test]
async fn startup_creates_artifact_directories() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    let topology = ConfigFileBuilder::new()
        .checker("exit 0")
        .bundler("exit 0")
        .server("exit 0")
        .topology(root);

    let supervisor = Supervisor::start(&topology, Arc::new(RealFileSystem))?;
    assert!(root.join("docs/demos/dist").is_dir());

    let outcome = with_timeout(supervisor.run()).await;
    assert_eq!(outcome, Outcome::AllExited);
    Ok(())
}

#[tokio::test]
async fn startup_leaves_directories_alone_when_disabled() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    let topology = ConfigFileBuilder::new()
        .checker("exit 0")
        .bundler("exit 0")
        .server("exit 0")
        .ensure_dirs(false)
        .topology(root);

    let supervisor = Supervisor::start(&topology, Arc::new(RealFileSystem))?;
    assert!(!root.join("docs").exists());

    let outcome = with_timeout(supervisor.run()).await;
    assert_eq!(outcome, Outcome::AllExited);
    Ok(())
}

#[tokio::test]
async fn process_ignoring_interrupt_is_killed_after_grace_period() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let topology = ConfigFileBuilder::new()
        .server("trap '' INT; while :; do sleep 0.05; done")
        .grace_period("200ms")
        .topology(dir.path());

    let supervisor = Supervisor::start(&topology, Arc::new(RealFileSystem))?;
    let shutdown = supervisor.shutdown_handle();
    let run = tokio::spawn(supervisor.run());

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.request(ShutdownSignal::Interrupt).await;

    let outcome = with_timeout(run).await?;
    assert_eq!(outcome, Outcome::Interrupted(ShutdownSignal::Interrupt));
    Ok(())
}
