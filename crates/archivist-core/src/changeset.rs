use std::collections::BTreeSet;
use std::path::Path;

use ignore::WalkBuilder;
use tracing::warn;

use crate::error::{ArchivistError, Result};
use crate::manifest::Manifest;

/// Returns `true` for I/O errors safe to skip during the walk.
fn is_soft_io_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::NotFound
    )
}

fn is_soft_walk_error(e: &ignore::Error) -> bool {
    e.io_error().is_some_and(is_soft_io_error)
}

/// The new/missing file sets computed by diffing the live directory
/// against the manifest. Recomputed per run, never persisted.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// On disk but not in the manifest.
    pub new: BTreeSet<String>,
    /// In the manifest but not on disk.
    pub missing: BTreeSet<String>,
}

impl ChangeSet {
    /// Diff the directory tree under `root` against the manifest.
    ///
    /// Both sides are treated as sets before differencing, so duplicate
    /// directory entries or duplicate manifest rows can never produce
    /// duplicate results, and no path ends up in both `new` and `missing`.
    /// The manifest's own file is excluded by relative-path comparison.
    pub fn detect(root: &Path, manifest_name: &str, manifest: &Manifest) -> Result<Self> {
        let on_disk = walk_relative_paths(root, manifest_name)?;
        let archived: BTreeSet<String> = manifest
            .paths()
            .into_iter()
            .map(str::to_string)
            .collect();

        let new = on_disk.difference(&archived).cloned().collect();
        let missing = archived.difference(&on_disk).cloned().collect();
        Ok(Self { new, missing })
    }
}

/// Recursively collect the relative paths of all regular files under `root`,
/// as `/`-separated strings, excluding the manifest file itself.
fn walk_relative_paths(root: &Path, manifest_name: &str) -> Result<BTreeSet<String>> {
    let mut walker = WalkBuilder::new(root);
    walker
        .follow_links(false)
        .hidden(false)
        .ignore(false)
        .git_global(false)
        .git_ignore(false)
        .git_exclude(false)
        .require_git(false)
        .sort_by_file_name(std::ffi::OsStr::cmp);

    let mut paths = BTreeSet::new();
    for entry_result in walker.build() {
        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                if is_soft_walk_error(&e) {
                    warn!(error = %e, "skipping entry (walk error)");
                    continue;
                }
                return Err(ArchivistError::Other(format!("walk error: {e}")));
            }
        };

        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if key == manifest_name {
            continue;
        }
        paths.insert(key);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;

    const MANIFEST_NAME: &str = "archived_files.state";

    fn manifest_with(paths: &[&str]) -> Manifest {
        let mut m = Manifest::default();
        m.merge(paths.iter().map(|p| ManifestEntry {
            relative_path: p.to_string(),
            bundle_name: "b-0.tgz".to_string(),
        }));
        m
    }

    #[test]
    fn fresh_directory_is_all_new() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"bb").unwrap();

        let cs = ChangeSet::detect(dir.path(), MANIFEST_NAME, &Manifest::default()).unwrap();
        assert_eq!(
            cs.new.iter().cloned().collect::<Vec<_>>(),
            vec!["a.txt", "sub/b.txt"]
        );
        assert!(cs.missing.is_empty());
    }

    #[test]
    fn manifest_file_is_excluded_from_detection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_NAME), b"[]").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let cs = ChangeSet::detect(dir.path(), MANIFEST_NAME, &Manifest::default()).unwrap();
        assert_eq!(cs.new.iter().cloned().collect::<Vec<_>>(), vec!["a.txt"]);
    }

    #[test]
    fn deleted_archived_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let manifest = manifest_with(&["a.txt", "c.txt"]);
        let cs = ChangeSet::detect(dir.path(), MANIFEST_NAME, &manifest).unwrap();
        assert!(cs.new.is_empty());
        assert_eq!(cs.missing.iter().cloned().collect::<Vec<_>>(), vec!["c.txt"]);
    }

    #[test]
    fn no_path_appears_in_both_sets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();

        let manifest = manifest_with(&["b.txt", "gone.txt"]);
        let cs = ChangeSet::detect(dir.path(), MANIFEST_NAME, &manifest).unwrap();
        let overlap: Vec<_> = cs.new.intersection(&cs.missing).collect();
        assert!(overlap.is_empty());
        assert_eq!(cs.new.iter().cloned().collect::<Vec<_>>(), vec!["a.txt"]);
        assert_eq!(
            cs.missing.iter().cloned().collect::<Vec<_>>(),
            vec!["gone.txt"]
        );
    }

    #[test]
    fn detection_is_idempotent_without_filesystem_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("logs")).unwrap();
        std::fs::write(dir.path().join("logs/x.log"), b"x").unwrap();

        let manifest = manifest_with(&["logs/x.log", "gone.txt"]);
        let first = ChangeSet::detect(dir.path(), MANIFEST_NAME, &manifest).unwrap();
        let second = ChangeSet::detect(dir.path(), MANIFEST_NAME, &manifest).unwrap();
        assert_eq!(first, second);
    }
}
