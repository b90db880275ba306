// src/artifact/propagate.rs

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::CopyError;
use crate::fs::FileSystem;

/// Copies produced artifacts to where they are consumed.
///
/// Failures are returned as [`CopyError`] and logged; they never take the
/// orchestrator down. The next qualifying event simply tries again.
#[derive(Debug, Clone)]
pub struct ArtifactPropagator {
    fs: Arc<dyn FileSystem>,
}

impl ArtifactPropagator {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Copy `from` to `to`, creating `to`'s directory first if needed.
    pub fn propagate(&self, from: &Path, to: &Path) -> Result<u64, CopyError> {
        let result = self.copy(from, to);
        match &result {
            Ok(bytes) => info!(from = ?from, to = ?to, bytes, "copied artifact"),
            Err(e) => warn!(from = ?from, to = ?to, error = %e.source, "artifact copy failed"),
        }
        result
    }

    /// Create the destination directory of `to` up front.
    pub fn ensure_destination(&self, to: &Path) -> io::Result<()> {
        let Some(dir) = to.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return Ok(());
        };
        if self.fs.exists(dir) {
            return Ok(());
        }
        self.fs.create_dir_all(dir)?;
        info!(dir = ?dir, "created artifact directory");
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<u64, CopyError> {
        self.ensure_destination(to)
            .and_then(|()| self.fs.copy(from, to))
            .map_err(|source| CopyError {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{MockFileSystem, RealFileSystem};

    #[test]
    fn creates_missing_destination_directory() {
        let fs = MockFileSystem::new();
        fs.write_file("dist/module.js", "export {}", 1);
        let propagator = ArtifactPropagator::new(Arc::new(fs.clone()));

        let bytes = propagator
            .propagate(Path::new("dist/module.js"), Path::new("docs/demos/dist/module.js"))
            .unwrap();

        assert_eq!(bytes, 9);
        assert!(fs.is_dir("docs/demos/dist"));
        assert_eq!(fs.contents("docs/demos/dist/module.js").as_deref(), Some(&b"export {}"[..]));
    }

    #[test]
    fn missing_source_is_reported_not_fatal() {
        let fs = MockFileSystem::new();
        let propagator = ArtifactPropagator::new(Arc::new(fs.clone()));

        let err = propagator
            .propagate(Path::new("dist/module.js"), Path::new("out/module.js"))
            .unwrap_err();

        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
        assert_eq!(err.from, Path::new("dist/module.js"));
        assert!(fs.copies().is_empty());
    }

    #[test]
    fn permission_failure_carries_cause() {
        let fs = MockFileSystem::new();
        fs.write_file("dist/module.js", "x", 1);
        fs.deny_writes_under("locked");
        let propagator = ArtifactPropagator::new(Arc::new(fs.clone()));

        let err = propagator
            .propagate(Path::new("dist/module.js"), Path::new("locked/dist/module.js"))
            .unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn retry_after_failure_succeeds() {
        let fs = MockFileSystem::new();
        let propagator = ArtifactPropagator::new(Arc::new(fs.clone()));
        let (from, to) = (Path::new("dist/module.js"), Path::new("docs/module.js"));

        assert!(propagator.propagate(from, to).is_err());
        fs.write_file(from, "v2", 2);
        assert!(propagator.propagate(from, to).is_ok());
        assert_eq!(fs.copies_to(to), 1);
    }

    #[test]
    fn real_filesystem_copy_into_new_tree() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("dist/module.js");
        let to = dir.path().join("docs/demos/dist/module.js");
        std::fs::create_dir_all(from.parent().unwrap()).unwrap();
        std::fs::write(&from, "export const x = 1;").unwrap();

        let propagator = ArtifactPropagator::new(Arc::new(RealFileSystem));
        propagator.propagate(&from, &to).unwrap();

        assert_eq!(std::fs::read_to_string(&to).unwrap(), "export const x = 1;");
    }
}
