use archivist_storage::StorageBackend;
use chrono::Utc;
use tracing::info;

use crate::bundle;
use crate::changeset::ChangeSet;
use crate::config::ArchiveConfig;
use crate::error::Result;
use crate::manifest::Manifest;
use crate::transient::TransientFile;

#[derive(Debug, Default)]
pub struct ArchiveStats {
    pub files_packed: usize,
    pub bundles_uploaded: usize,
}

/// Run an archive pass: detect new files, pack them into size-bounded
/// bundles, upload the bundles, then record and upload the manifest.
///
/// Bundles are transient: each local copy is removed once its upload
/// finishes, and on error paths too. The manifest is only extended after
/// every bundle of the run made it to the store, so a failed upload leaves
/// at worst orphaned remote bundles (re-packed next run), never manifest
/// entries pointing at bundles that don't exist.
pub fn run(cfg: &ArchiveConfig, store: &dyn StorageBackend) -> Result<ArchiveStats> {
    super::ensure_manifest_local(&cfg.run, store)?;

    let manifest_path = cfg.run.manifest_path();
    let mut manifest = Manifest::load(&manifest_path)?;
    let changes = ChangeSet::detect(cfg.run.directory(), &cfg.run.manifest_name, &manifest)?;

    if changes.new.is_empty() {
        info!("no new files to archive");
        return Ok(ArchiveStats::default());
    }
    info!(new = changes.new.len(), "detected new files");

    let timestamp = bundle::run_timestamp(Utc::now());
    let outcome = bundle::pack(
        &changes.new,
        cfg.max_bundle_bytes,
        cfg.run.directory(),
        &cfg.name_prefix,
        &timestamp,
    )?;

    // Guards first: every bundle is deleted locally whether or not its
    // upload succeeds.
    let guards: Vec<TransientFile> = outcome
        .bundles
        .iter()
        .map(|b| TransientFile::new(&b.path))
        .collect();

    let mut stats = ArchiveStats {
        files_packed: outcome.entries.len(),
        bundles_uploaded: 0,
    };
    for bundle in &outcome.bundles {
        archivist_storage::upload_file(store, &bundle.path, &bundle.name)?;
        stats.bundles_uploaded += 1;
    }
    drop(guards);

    manifest.merge(outcome.entries);
    manifest.persist(&manifest_path)?;
    archivist_storage::upload_file(store, &manifest_path, &cfg.run.manifest_name)?;

    info!(
        bundles = stats.bundles_uploaded,
        files = stats.files_packed,
        "archive run complete"
    );
    Ok(stats)
}
