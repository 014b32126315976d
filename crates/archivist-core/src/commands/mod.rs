pub mod archive;
pub mod extract;

use archivist_storage::StorageBackend;
use tracing::debug;

use crate::config::RunConfig;
use crate::error::Result;

/// Make sure the manifest exists locally, downloading it from the store if
/// it doesn't. A manifest that exists nowhere yet is normal first-run state.
/// Returns `true` if a local manifest file is present afterwards.
fn ensure_manifest_local(run: &RunConfig, store: &dyn StorageBackend) -> Result<bool> {
    let path = run.manifest_path();
    if path.is_file() {
        return Ok(true);
    }
    let fetched = archivist_storage::download_file(store, &run.manifest_name, &path)?;
    if !fetched {
        debug!(key = %run.manifest_name, "no remote manifest either, starting fresh");
    }
    Ok(fetched)
}
