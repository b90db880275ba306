// src/artifact/gate.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info};

use crate::fs::FileSystem;

/// What the gate remembers about one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Newest modification time seen so far. Never decreases.
    pub last_modified: SystemTime,
    /// How many real changes have been reported.
    pub changes: u64,
}

/// Result of [`ChangeGate::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeDecision {
    pub changed: bool,
    /// Modification time read from disk, if the artifact exists.
    pub timestamp: Option<SystemTime>,
}

impl ChangeDecision {
    fn unchanged(timestamp: Option<SystemTime>) -> Self {
        Self {
            changed: false,
            timestamp,
        }
    }
}

/// Filters "artifact written" announcements down to real changes.
///
/// Watch tools re-announce output on cosmetic recompiles and can announce
/// the same write several times; only a strictly newer modification time
/// counts. Equal timestamps never fire, so each physical write is reported
/// at most once.
///
/// The gate takes `&mut self`; whoever owns it serialises observations.
#[derive(Debug)]
pub struct ChangeGate {
    fs: Arc<dyn FileSystem>,
    records: HashMap<PathBuf, ChangeRecord>,
}

impl ChangeGate {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            records: HashMap::new(),
        }
    }

    /// Check `path` against the last timestamp seen for it.
    ///
    /// A missing artifact (first build not finished yet) is simply "no
    /// change".
    pub fn observe(&mut self, path: &Path) -> ChangeDecision {
        let current = match self.fs.modified(path) {
            Ok(t) => t,
            Err(e) => {
                debug!(path = ?path, error = %e, "artifact not readable yet; treating as unchanged");
                return ChangeDecision::unchanged(None);
            }
        };

        match self.records.get_mut(path) {
            Some(record) if current <= record.last_modified => {
                debug!(path = ?path, "artifact timestamp not newer; ignoring announcement");
                ChangeDecision::unchanged(Some(current))
            }
            Some(record) => {
                record.last_modified = current;
                record.changes += 1;
                info!(path = ?path, changes = record.changes, "artifact changed");
                ChangeDecision {
                    changed: true,
                    timestamp: Some(current),
                }
            }
            None => {
                self.records.insert(
                    path.to_path_buf(),
                    ChangeRecord {
                        last_modified: current,
                        changes: 1,
                    },
                );
                info!(path = ?path, changes = 1, "artifact changed");
                ChangeDecision {
                    changed: true,
                    timestamp: Some(current),
                }
            }
        }
    }

    pub fn record(&self, path: &Path) -> Option<ChangeRecord> {
        self.records.get(path).copied()
    }
}
