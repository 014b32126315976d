//! Age-based file pruning, independent of the archiving engine.
//!
//! A stateless filesystem sweep: glob for files under configured roots
//! and delete those whose mtime is older than a threshold. No manifest,
//! no remote store.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{ArchivistError, Result};

/// Parse an age string like "30d", "12h", "90s", "2w", "6M".
///
/// Units: s(econds), m(inutes), h(ours), d(ays), w(eeks), M(onths, 30d).
/// A bare number is rejected; the unit is mandatory.
pub fn parse_age(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ArchivistError::Config("empty age string".into()));
    }

    let split_at = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ArchivistError::Config(format!("age '{s}' is missing a unit")))?;
    let (num_str, suffix) = s.split_at(split_at);
    let n: u64 = num_str
        .parse()
        .map_err(|_| ArchivistError::Config(format!("invalid age number: '{num_str}'")))?;

    let unit_secs = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        "w" => 604_800,
        "M" => 2_628_000,
        _ => {
            return Err(ArchivistError::Config(format!(
                "unknown age unit: '{suffix}'"
            )))
        }
    };
    let secs = n
        .checked_mul(unit_secs)
        .ok_or_else(|| ArchivistError::Config(format!("age '{s}' is out of range")))?;
    Ok(Duration::from_secs(secs))
}

/// One sweepable location: a root path and a file-name pattern applied
/// recursively beneath it.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepTarget {
    pub path: String,
    pub file_pattern: String,
}

/// Sweep configuration: system name → target.
pub type SweepConfig = BTreeMap<String, SweepTarget>;

/// Load the JSON sweep configuration.
pub fn load_config(path: &Path) -> Result<SweepConfig> {
    let data = std::fs::read(path)?;
    serde_json::from_slice(&data).map_err(|source| ArchivistError::ManifestCorrupt {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default)]
pub struct SweepStats {
    pub examined: usize,
    pub deleted: usize,
}

/// Delete files older than `max_age` for the named system, or for every
/// configured system when `system` is "all" (case-insensitive).
pub fn run(config: &SweepConfig, system: &str, max_age: Duration) -> Result<SweepStats> {
    let mut stats = SweepStats::default();
    if system.eq_ignore_ascii_case("all") {
        for (name, target) in config {
            sweep_target(name, target, max_age, &mut stats)?;
        }
    } else {
        let target = config.get(system).ok_or_else(|| {
            ArchivistError::Config(format!("no sweep target configured for system '{system}'"))
        })?;
        sweep_target(system, target, max_age, &mut stats)?;
    }
    Ok(stats)
}

fn sweep_target(
    name: &str,
    target: &SweepTarget,
    max_age: Duration,
    stats: &mut SweepStats,
) -> Result<()> {
    let pattern = format!("{}/**/{}", target.path, target.file_pattern);
    let paths = glob::glob(&pattern)
        .map_err(|e| ArchivistError::Config(format!("invalid sweep pattern '{pattern}': {e}")))?;

    let now = SystemTime::now();
    let mut deleted_here = 0usize;

    for entry in paths {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!(system = name, error = %e, "skipping unreadable glob entry");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        stats.examined += 1;

        let age = match file_age(&path, now) {
            Ok(age) => age,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        if age <= max_age {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(system = name, path = %path.display(), ?age, "deleted file");
                stats.deleted += 1;
                deleted_here += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!(system = name, path = %path.display(), "cannot delete file: permission denied");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if deleted_here > 0 {
        info!(system = name, deleted = deleted_here, "sweep complete");
    } else {
        debug!(system = name, "no files deleted");
    }
    Ok(())
}

/// Time since the file was last modified.
fn file_age(path: &Path, now: SystemTime) -> std::io::Result<Duration> {
    let mtime = std::fs::metadata(path)?.modified()?;
    Ok(now.duration_since(mtime).unwrap_or(Duration::ZERO))
}
