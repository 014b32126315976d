use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use crate::error::{ArchivistError, Result};
use crate::manifest::ManifestEntry;

/// Fixed extension for compressed tar bundles.
pub const BUNDLE_SUFFIX: &str = ".tgz";

/// Format the run timestamp: ISO-8601 UTC at second precision with the
/// colons stripped so it is safe in file names and object keys.
pub fn run_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H%M%S").to_string()
}

/// Deterministic bundle name: `{prefix}-{timestamp}-{seq}.tgz`.
pub fn bundle_name(prefix: &str, timestamp: &str, seq: u32) -> String {
    format!("{prefix}-{timestamp}-{seq}{BUNDLE_SUFFIX}")
}

/// A bundle written to local disk, awaiting upload.
#[derive(Debug)]
pub struct PackedBundle {
    pub name: String,
    pub path: PathBuf,
    /// Relative paths of the members, in the order they were packed.
    pub members: Vec<String>,
}

/// Result of one packing run.
#[derive(Debug, Default)]
pub struct PackOutcome {
    pub bundles: Vec<PackedBundle>,
    pub entries: Vec<ManifestEntry>,
}

/// Greedily partition `new_files` into size-bounded bundles and write each
/// as a normalized tar.gz under `root`.
///
/// The bound is a soft target: the file that trips it is always packed into
/// the bundle being flushed rather than deferred, so a bundle may exceed
/// `max_bundle_bytes` by at most one file's size and no file is ever
/// stranded. Manifest entries for a bundle are only emitted after its
/// archive write succeeded.
pub fn pack(
    new_files: &BTreeSet<String>,
    max_bundle_bytes: u64,
    root: &Path,
    name_prefix: &str,
    timestamp: &str,
) -> Result<PackOutcome> {
    let mut outcome = PackOutcome::default();
    if new_files.is_empty() {
        return Ok(outcome);
    }

    match pack_inner(&mut outcome, new_files, max_bundle_bytes, root, name_prefix, timestamp) {
        Ok(()) => Ok(outcome),
        Err(e) => {
            // Bundles flushed before the failure are transient local files
            // that will never be uploaded; don't leave them behind.
            for bundle in &outcome.bundles {
                let _ = std::fs::remove_file(&bundle.path);
            }
            Err(e)
        }
    }
}

fn pack_inner(
    outcome: &mut PackOutcome,
    new_files: &BTreeSet<String>,
    max_bundle_bytes: u64,
    root: &Path,
    name_prefix: &str,
    timestamp: &str,
) -> Result<()> {
    let mut pending: Vec<String> = Vec::new();
    let mut running_total: u64 = 0;
    let mut seq: u32 = 0;

    for target in new_files {
        let file_size = std::fs::metadata(root.join(target))?.len();
        if running_total + file_size <= max_bundle_bytes {
            pending.push(target.clone());
            running_total += file_size;
        } else {
            // The overflow file rides along in the bundle being flushed.
            pending.push(target.clone());
            flush(outcome, &mut pending, root, name_prefix, timestamp, seq)?;
            running_total = 0;
            seq += 1;
        }
    }

    if !pending.is_empty() {
        flush(outcome, &mut pending, root, name_prefix, timestamp, seq)?;
    }

    Ok(())
}

fn flush(
    outcome: &mut PackOutcome,
    pending: &mut Vec<String>,
    root: &Path,
    name_prefix: &str,
    timestamp: &str,
    seq: u32,
) -> Result<()> {
    let name = bundle_name(name_prefix, timestamp, seq);
    let path = root.join(&name);
    let members = std::mem::take(pending);

    if let Err(e) = write_bundle(root, &path, &members) {
        // Don't leave a partial archive behind on a failed write.
        let _ = std::fs::remove_file(&path);
        return Err(e);
    }

    info!(bundle = %name, files = members.len(), "bundle written");
    outcome
        .entries
        .extend(members.iter().map(|m| ManifestEntry {
            relative_path: m.clone(),
            bundle_name: name.clone(),
        }));
    outcome.bundles.push(PackedBundle {
        name,
        path,
        members,
    });
    Ok(())
}

/// Write `members` (paths relative to `root`) into a gzip-compressed tar at
/// `bundle_path`, in order. Member ownership is normalized to uid/gid 0 and
/// "root" so archives are reproducible and don't leak host identity.
fn write_bundle(root: &Path, bundle_path: &Path, members: &[String]) -> Result<()> {
    let file = File::create(bundle_path)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for member in members {
        let source = root.join(member);
        let meta = std::fs::metadata(&source)?;
        let mut header = tar::Header::new_gnu();
        header.set_metadata(&meta);
        header.set_uid(0);
        header.set_gid(0);
        header
            .set_username("root")
            .map_err(|e| ArchivistError::Other(format!("tar header username: {e}")))?;
        header
            .set_groupname("root")
            .map_err(|e| ArchivistError::Other(format!("tar header groupname: {e}")))?;

        let reader = BufReader::new(File::open(&source)?);
        builder.append_data(&mut header, member, reader)?;
        debug!(path = %source.display(), bundle = %bundle_path.display(), "added member");
    }

    // Finish the tar stream, then the gzip stream, then flush the writer.
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Extract only the members named in `wanted` from the bundle at
/// `bundle_path` into `dest`. Unrelated members are never written to disk.
/// Returns the relative paths actually extracted.
pub fn extract_members(
    bundle_path: &Path,
    wanted: &BTreeSet<String>,
    dest: &Path,
) -> Result<Vec<String>> {
    let file = File::open(bundle_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut extracted = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let member_name = {
            let raw = entry.path()?;
            raw.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        };
        if !wanted.contains(&member_name) {
            continue;
        }

        let rel = sanitize_member_path(&member_name)?;
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
        debug!(member = %member_name, dest = %target.display(), "extracted member");
        extracted.push(member_name);
    }
    Ok(extracted)
}

/// Reject member paths that would escape the destination directory.
fn sanitize_member_path(raw: &str) -> Result<PathBuf> {
    let path = Path::new(raw);
    if path.is_absolute() {
        return Err(ArchivistError::UnsafePath(raw.to_string()));
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchivistError::UnsafePath(raw.to_string()));
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(ArchivistError::UnsafePath(raw.to_string()));
    }
    Ok(out)
}
