use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ArchivistError, Result};

/// One archived file: which bundle owns the file at `relative_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub relative_path: String,
    pub bundle_name: String,
}

/// Durable record mapping each archived relative path to its bundle.
///
/// Persisted as a pretty-printed JSON array so the file diffs cleanly.
/// The manifest is exclusively owned by one run: it is read once at
/// startup and fully rewritten on every persist.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Load the manifest from `path`. A missing file is normal startup
    /// state and yields an empty manifest; unparsable content is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no manifest yet, starting empty");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<ManifestEntry> =
            serde_json::from_slice(&data).map_err(|source| ArchivistError::ManifestCorrupt {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { entries })
    }

    /// Merge new entries into the manifest.
    ///
    /// An entry whose exact `{relative_path, bundle_name}` pair is already
    /// recorded is dropped, so replaying the same pack run is idempotent.
    /// An entry whose path is recorded under a *different* bundle replaces
    /// the prior entry (latest bundle wins), keeping each relative path
    /// unique within the manifest.
    pub fn merge(&mut self, new_entries: impl IntoIterator<Item = ManifestEntry>) {
        for entry in new_entries {
            match self
                .entries
                .iter_mut()
                .find(|e| e.relative_path == entry.relative_path)
            {
                Some(existing) if *existing == entry => {
                    debug!(path = %entry.relative_path, "manifest entry already present");
                }
                Some(existing) => {
                    debug!(
                        path = %entry.relative_path,
                        old = %existing.bundle_name,
                        new = %entry.bundle_name,
                        "replacing manifest entry"
                    );
                    existing.bundle_name = entry.bundle_name;
                }
                None => self.entries.push(entry),
            }
        }
    }

    /// Rewrite the manifest file in full, atomically.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| ArchivistError::Other(format!("failed to encode manifest: {e}")))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!(path = %path.display(), entries = self.entries.len(), "manifest persisted");
        Ok(())
    }

    /// The set of relative paths currently recorded.
    pub fn paths(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .map(|e| e.relative_path.as_str())
            .collect()
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, bundle: &str) -> ManifestEntry {
        ManifestEntry {
            relative_path: path.to_string(),
            bundle_name: bundle.to_string(),
        }
    }

    #[test]
    fn missing_manifest_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(&dir.path().join("nope.state")).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn corrupt_manifest_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.state");
        std::fs::write(&path, b"{not json]").unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, ArchivistError::ManifestCorrupt { .. }));
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archived_files.state");

        let mut manifest = Manifest::default();
        manifest.merge([entry("a.txt", "x-0.tgz"), entry("b.txt", "x-0.tgz")]);
        manifest.persist(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded.entries(), manifest.entries());

        // Pretty-printed JSON array on disk.
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with('['));
        assert!(text.contains("\"relative_path\": \"a.txt\""));
    }

    #[test]
    fn merge_is_idempotent_for_exact_pairs() {
        let mut manifest = Manifest::default();
        manifest.merge([entry("a.txt", "x-0.tgz")]);
        manifest.merge([entry("a.txt", "x-0.tgz")]);
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn merge_replaces_entry_when_path_repacked_into_new_bundle() {
        let mut manifest = Manifest::default();
        manifest.merge([entry("a.txt", "x-0.tgz")]);
        manifest.merge([entry("a.txt", "y-0.tgz")]);
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.entries()[0].bundle_name, "y-0.tgz");
    }

    #[test]
    fn paths_deduplicates() {
        let mut manifest = Manifest::default();
        manifest.merge([entry("a.txt", "x-0.tgz"), entry("b.txt", "x-1.tgz")]);
        let paths = manifest.paths();
        assert_eq!(
            paths.into_iter().collect::<Vec<_>>(),
            vec!["a.txt", "b.txt"]
        );
    }
}
