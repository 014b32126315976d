use std::collections::{BTreeMap, BTreeSet};

use archivist_storage::StorageBackend;
use tracing::{info, warn};

use crate::bundle;
use crate::changeset::ChangeSet;
use crate::config::RunConfig;
use crate::error::Result;
use crate::manifest::Manifest;
use crate::transient::TransientFile;

#[derive(Debug, Default)]
pub struct ExtractStats {
    pub files_restored: usize,
    pub bundles_opened: usize,
    /// Bundles the manifest references that the store no longer has.
    pub bundles_absent: usize,
}

/// Run a restore pass: resolve files missing locally to the minimal set of
/// bundles that own them, fetch each bundle, and extract only the required
/// members. The manifest is left untouched.
pub fn run(run: &RunConfig, store: &dyn StorageBackend) -> Result<ExtractStats> {
    super::ensure_manifest_local(run, store)?;

    let manifest = Manifest::load(&run.manifest_path())?;
    let changes = ChangeSet::detect(run.directory(), &run.manifest_name, &manifest)?;

    let mut stats = ExtractStats::default();
    if changes.missing.is_empty() {
        info!("no missing files, nothing to restore");
        return Ok(stats);
    }
    info!(missing = changes.missing.len(), "detected missing files");

    for (bundle_name, wanted) in group_by_bundle(&manifest, &changes.missing) {
        let local_path = run.bundle_path(&bundle_name);
        if !local_path.is_file() {
            let fetched = archivist_storage::download_file(store, &bundle_name, &local_path)?;
            if !fetched {
                // Absent remote object: nothing to restore from that
                // source yet, not a hard error.
                warn!(bundle = %bundle_name, "bundle not in store, skipping");
                stats.bundles_absent += 1;
                continue;
            }
        }

        // Delete the local copy when done, extraction failure included.
        let guard = TransientFile::new(&local_path);
        let extracted = bundle::extract_members(guard.path(), &wanted, run.directory())?;
        info!(
            bundle = %bundle_name,
            files = extracted.len(),
            "restored members"
        );
        stats.files_restored += extracted.len();
        stats.bundles_opened += 1;
    }

    Ok(stats)
}

/// Map each owning bundle to the ordered set of missing paths it must
/// yield. Manifest rows whose path isn't missing are ignored.
fn group_by_bundle(
    manifest: &Manifest,
    missing: &BTreeSet<String>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for entry in manifest.entries() {
        if missing.contains(&entry.relative_path) {
            groups
                .entry(entry.bundle_name.clone())
                .or_default()
                .insert(entry.relative_path.clone());
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;

    fn manifest_of(pairs: &[(&str, &str)]) -> Manifest {
        let mut m = Manifest::default();
        m.merge(pairs.iter().map(|(p, b)| ManifestEntry {
            relative_path: p.to_string(),
            bundle_name: b.to_string(),
        }));
        m
    }

    #[test]
    fn grouping_partitions_missing_paths_by_owner() {
        let manifest = manifest_of(&[
            ("a.txt", "b-0.tgz"),
            ("b.txt", "b-0.tgz"),
            ("c.txt", "b-1.tgz"),
            ("present.txt", "b-1.tgz"),
        ]);
        let missing: BTreeSet<String> =
            ["a.txt", "b.txt", "c.txt"].iter().map(|s| s.to_string()).collect();

        let groups = group_by_bundle(&manifest, &missing);
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups["b-0.tgz"].iter().cloned().collect::<Vec<_>>(),
            vec!["a.txt", "b.txt"]
        );
        assert_eq!(
            groups["b-1.tgz"].iter().cloned().collect::<Vec<_>>(),
            vec!["c.txt"]
        );
    }

    #[test]
    fn grouping_with_nothing_missing_is_empty() {
        let manifest = manifest_of(&[("a.txt", "b-0.tgz")]);
        let groups = group_by_bundle(&manifest, &BTreeSet::new());
        assert!(groups.is_empty());
    }

    mod roundtrip {
        use super::super::*;
        use crate::commands::archive;
        use crate::config::ArchiveConfig;
        use crate::testutil::MemoryBackend;

        fn archived_dir(store: &MemoryBackend) -> (tempfile::TempDir, RunConfig) {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
            std::fs::create_dir(dir.path().join("sub")).unwrap();
            std::fs::write(dir.path().join("sub/b.txt"), b"beta").unwrap();

            let run_cfg = RunConfig::new(dir.path(), "archived_files.state").unwrap();
            let cfg = ArchiveConfig {
                run: run_cfg.clone(),
                name_prefix: "backup".to_string(),
                max_bundle_bytes: 1 << 20,
            };
            archive::run(&cfg, store).unwrap();
            (dir, run_cfg)
        }

        #[test]
        fn restores_deleted_files_byte_for_byte() {
            let store = MemoryBackend::new();
            let (dir, run_cfg) = archived_dir(&store);

            std::fs::remove_file(dir.path().join("a.txt")).unwrap();
            std::fs::remove_file(dir.path().join("sub/b.txt")).unwrap();

            let stats = run(&run_cfg, &store).unwrap();
            assert_eq!(stats.files_restored, 2);
            assert_eq!(stats.bundles_opened, 1);
            assert_eq!(stats.bundles_absent, 0);
            assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"alpha");
            assert_eq!(std::fs::read(dir.path().join("sub/b.txt")).unwrap(), b"beta");

            // The fetched bundle must not survive the restore.
            let leftovers: Vec<_> = std::fs::read_dir(dir.path())
                .unwrap()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().ends_with(".tgz"))
                .collect();
            assert!(leftovers.is_empty());
        }

        #[test]
        fn extracts_only_the_missing_members() {
            let store = MemoryBackend::new();
            let (dir, run_cfg) = archived_dir(&store);

            std::fs::write(dir.path().join("a.txt"), b"edited locally").unwrap();
            std::fs::remove_file(dir.path().join("sub/b.txt")).unwrap();

            let stats = run(&run_cfg, &store).unwrap();
            assert_eq!(stats.files_restored, 1);
            // The present (though modified) file is left alone.
            assert_eq!(
                std::fs::read(dir.path().join("a.txt")).unwrap(),
                b"edited locally"
            );
        }

        #[test]
        fn nothing_missing_means_no_store_traffic() {
            let store = MemoryBackend::new();
            let (_dir, run_cfg) = archived_dir(&store);

            let stats = run(&run_cfg, &store).unwrap();
            assert_eq!(stats.files_restored, 0);
            assert_eq!(stats.bundles_opened, 0);
        }

        #[test]
        fn absent_bundle_is_skipped_not_fatal() {
            let store = MemoryBackend::new();
            let (dir, run_cfg) = archived_dir(&store);

            std::fs::remove_file(dir.path().join("a.txt")).unwrap();
            for key in store.keys() {
                if key.ends_with(".tgz") {
                    store.delete(&key).unwrap();
                }
            }

            let stats = run(&run_cfg, &store).unwrap();
            assert_eq!(stats.files_restored, 0);
            assert_eq!(stats.bundles_absent, 1);
            assert!(!dir.path().join("a.txt").exists());
        }
    }
}
