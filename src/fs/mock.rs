// src/fs/mock.rs

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::FileSystem;

#[derive(Debug, Clone)]
struct MockFile {
    contents: Vec<u8>,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, MockFile>,
    dirs: HashSet<PathBuf>,
    read_only_dirs: HashSet<PathBuf>,
    copies: Vec<(PathBuf, PathBuf)>,
}

/// In-memory filesystem with explicit modification times.
///
/// Clones share state, so a test can keep one handle while the code under
/// test owns another. Copies only succeed into directories that exist.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write a file whose modification time is `secs` after the epoch.
    /// Parent directories are created implicitly.
    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>, secs: u64) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.lock();
        add_ancestors(&mut state.dirs, &path);
        state.files.insert(
            path,
            MockFile {
                contents: contents.into(),
                modified: UNIX_EPOCH + Duration::from_secs(secs),
            },
        );
    }

    /// Change only the modification time of an existing file.
    pub fn touch(&self, path: impl AsRef<Path>, secs: u64) {
        let mut state = self.lock();
        if let Some(file) = state.files.get_mut(path.as_ref()) {
            file.modified = UNIX_EPOCH + Duration::from_secs(secs);
        }
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.lock().files.remove(path.as_ref());
    }

    /// Make `create_dir_all` and copies under `dir` fail with permission denied.
    pub fn deny_writes_under(&self, dir: impl AsRef<Path>) {
        self.lock().read_only_dirs.insert(dir.as_ref().to_path_buf());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().files.get(path.as_ref()).map(|f| f.contents.clone())
    }

    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        self.lock().dirs.contains(path.as_ref())
    }

    /// Every successful copy so far, in order.
    pub fn copies(&self) -> Vec<(PathBuf, PathBuf)> {
        self.lock().copies.clone()
    }

    /// Number of successful copies that wrote `to`.
    pub fn copies_to(&self, to: impl AsRef<Path>) -> usize {
        let to = to.as_ref();
        self.lock().copies.iter().filter(|(_, dst)| dst == to).count()
    }
}

fn add_ancestors(dirs: &mut HashSet<PathBuf>, path: &Path) {
    for ancestor in path.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        dirs.insert(ancestor.to_path_buf());
    }
}

fn denied(state: &MockState, path: &Path) -> bool {
    state.read_only_dirs.iter().any(|dir| path.starts_with(dir))
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path:?}"))
}

impl FileSystem for MockFileSystem {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.lock()
            .files
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| not_found(path))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.lock();
        if denied(&state, path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("read-only: {path:?}"),
            ));
        }
        add_ancestors(&mut state.dirs, path);
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let mut state = self.lock();

        if denied(&state, to) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("read-only: {to:?}"),
            ));
        }

        let source = state.files.get(from).cloned().ok_or_else(|| not_found(from))?;

        if let Some(parent) = to.parent() {
            if !parent.as_os_str().is_empty() && !state.dirs.contains(parent) {
                return Err(not_found(parent));
            }
        }

        let len = source.contents.len() as u64;
        state.files.insert(
            to.to_path_buf(),
            MockFile {
                contents: source.contents,
                modified: SystemTime::now(),
            },
        );
        state.copies.push((from.to_path_buf(), to.to_path_buf()));
        Ok(len)
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.lock();
        state.files.contains_key(path) || state.dirs.contains(path)
    }
}
