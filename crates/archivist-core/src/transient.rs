use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Scoped ownership of a transient on-disk file.
///
/// Bundles only live locally for the span of a single upload or extraction;
/// this guard removes the file when it goes out of scope, on success and
/// error paths alike. A file that is already gone is not an error.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed transient file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "transient file already gone");
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove transient file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.tgz");
        std::fs::write(&path, b"data").unwrap();
        {
            let _guard = TransientFile::new(&path);
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_on_drop_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.tgz");
        let guard = TransientFile::new(&path);
        drop(guard); // must not panic
    }
}
