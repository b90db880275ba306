// src/engine/signals.rs

//! Operator signals → [`ShutdownHandle::request`].

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::supervisor::ShutdownHandle;
use super::ShutdownSignal;

#[cfg(unix)]
type TermStream = tokio::signal::unix::Signal;
#[cfg(not(unix))]
type TermStream = ();

/// Forward every SIGINT (and SIGTERM on Unix) to the supervisor until it is
/// gone.
pub fn spawn_signal_listener(handle: ShutdownHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigterm = terminate_stream();

        loop {
            let signal = tokio::select! {
                res = tokio::signal::ctrl_c() => match res {
                    Ok(()) => ShutdownSignal::Interrupt,
                    Err(e) => {
                        warn!(error = %e, "failed to listen for Ctrl+C");
                        return;
                    }
                },
                Some(()) = recv_terminate(&mut sigterm) => ShutdownSignal::Terminate,
            };

            debug!(?signal, "received operator signal");
            if !handle.request(signal).await {
                return;
            }
        }
    })
}

#[cfg(unix)]
fn terminate_stream() -> Option<TermStream> {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(error = %e, "failed to listen for SIGTERM");
            None
        }
    }
}

#[cfg(not(unix))]
fn terminate_stream() -> Option<TermStream> {
    None
}

async fn recv_terminate(stream: &mut Option<TermStream>) -> Option<()> {
    match stream {
        #[cfg(unix)]
        Some(s) => s.recv().await,
        _ => std::future::pending().await,
    }
}
