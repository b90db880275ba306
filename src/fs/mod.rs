// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

pub mod mock;

pub use mock::MockFileSystem;

/// The filesystem operations artifact handling needs.
///
/// Returns raw `io::Error`s so callers can wrap them in their own error types.
pub trait FileSystem: Send + Sync + Debug {
    /// Last modification time of a regular file.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Copy `from` to `to`, overwriting, returning the number of bytes copied.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn exists(&self, path: &Path) -> bool;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
