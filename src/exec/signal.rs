// src/exec/signal.rs

use std::io;

use tokio::process::Child;

/// Termination request sent to a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    /// `SIGINT`, what an interactive Ctrl+C would deliver.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
    /// Forced kill; cannot be ignored by the child.
    Kill,
}

impl TermSignal {
    pub fn is_forced(self) -> bool {
        matches!(self, TermSignal::Kill)
    }
}

/// Deliver `signal` to `child`.
///
/// A child that has already been reaped (or vanished between the check and
/// the send) is not an error.
pub fn deliver(child: &mut Child, signal: TermSignal) -> io::Result<()> {
    if signal.is_forced() {
        return match child.start_kill() {
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        };
    }

    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = child.id() else {
            return Ok(());
        };

        let sig = match signal {
            TermSignal::Interrupt => Signal::SIGINT,
            _ => Signal::SIGTERM,
        };

        match signal::kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from_raw_os_error(errno as i32)),
        }
    }

    #[cfg(not(unix))]
    {
        match child.start_kill() {
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}
