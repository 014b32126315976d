use std::path::{Path, PathBuf};

use crate::error::{ArchivistError, Result};

/// Settings shared by the archive and extract runs.
///
/// Built once from the command line and passed explicitly into
/// [`crate::commands`] entry points; there is no ambient global state.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory being archived / restored into.
    pub directory: PathBuf,
    /// File name of the manifest inside `directory`. Also used as the
    /// manifest's object key in the remote store.
    pub manifest_name: String,
}

impl RunConfig {
    pub fn new(directory: impl Into<PathBuf>, manifest_name: impl Into<String>) -> Result<Self> {
        let manifest_name = manifest_name.into();
        if manifest_name.is_empty() {
            return Err(ArchivistError::Config(
                "manifest file name must not be empty".into(),
            ));
        }
        if manifest_name.contains('/') || manifest_name.contains('\\') {
            return Err(ArchivistError::Config(format!(
                "manifest file name must not contain path separators: '{manifest_name}'"
            )));
        }
        Ok(Self {
            directory: directory.into(),
            manifest_name,
        })
    }

    /// Local path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.directory.join(&self.manifest_name)
    }

    /// Local path a bundle occupies while it exists on disk.
    pub fn bundle_path(&self, bundle_name: &str) -> PathBuf {
        self.directory.join(bundle_name)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Settings specific to an archive run.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub run: RunConfig,
    /// Base name for produced bundles.
    pub name_prefix: String,
    /// Soft upper bound on cumulative member size per bundle, in bytes.
    /// A single oversized file may push one bundle past this target.
    pub max_bundle_bytes: u64,
}
