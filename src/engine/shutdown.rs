// src/engine/shutdown.rs

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide "shutdown has started" flag.
///
/// Set exactly once: of any number of racing triggers (signals, process
/// exits), only the first `begin` call wins.
#[derive(Debug, Default)]
pub struct ShutdownState {
    initiated: AtomicBool,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for the single caller that starts the shutdown.
    pub fn begin(&self) -> bool {
        self.initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }
}
