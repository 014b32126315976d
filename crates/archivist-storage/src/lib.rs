//! Object-store backends for archivist.
//!
//! The core crate talks to remote storage exclusively through the
//! [`StorageBackend`] trait. `get` returns `Ok(None)` when the object does
//! not exist — callers treat that as "nothing there yet", never as a hard
//! error. Everything else that goes wrong is a [`StorageError`].

mod local_backend;
mod retry;
mod s3_backend;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local_backend::LocalBackend;
pub use s3_backend::S3Backend;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage configuration error: {0}")]
    Config(String),

    #[error("unsafe storage key: {0}")]
    UnsafeKey(String),

    #[error("{backend} {op}: {message}")]
    Transfer {
        backend: &'static str,
        op: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    fn transfer(backend: &'static str, op: impl Into<String>, message: impl ToString) -> Self {
        StorageError::Transfer {
            backend,
            op: op.into(),
            message: message.to_string(),
        }
    }
}

/// Retry settings for remote backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            retry_max_delay_ms: 10_000,
        }
    }
}

/// Connection parameters for the remote store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Prefix (root path) prepended to all keys within the bucket.
    pub root: String,
    /// Accept plain-`http` endpoints. Off by default: credentials and data
    /// travel unencrypted, which is only sane against localhost stores.
    pub allow_insecure_http: bool,
    pub retry: RetryConfig,
}

/// Blocking object-store interface.
pub trait StorageBackend: Send + Sync {
    /// Fetch an object. `Ok(None)` means the object does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store an object, overwriting any previous version.
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Whether an object exists.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Remove an object. Removing a missing object is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Build an [`S3Backend`] from a [`StoreConfig`].
pub fn backend_from_config(cfg: &StoreConfig) -> Result<Box<dyn StorageBackend>> {
    Ok(Box::new(S3Backend::new(cfg)?))
}

/// Upload a local file as `key`.
pub fn upload_file(backend: &dyn StorageBackend, local_path: &Path, key: &str) -> Result<()> {
    let data = std::fs::read(local_path)?;
    backend.put(key, &data)?;
    tracing::info!(
        path = %local_path.display(),
        key,
        bytes = data.len(),
        "uploaded object"
    );
    Ok(())
}

/// Download `key` into `local_path`, written via a temp file so readers never
/// observe a partial download. Returns `false` if the object does not exist.
pub fn download_file(backend: &dyn StorageBackend, key: &str, local_path: &Path) -> Result<bool> {
    use std::io::Write;

    let Some(data) = backend.get(key)? else {
        tracing::debug!(key, "remote object does not exist");
        return Ok(false);
    };
    let dir = local_path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&data)?;
    tmp.persist(local_path).map_err(|e| e.error)?;
    tracing::info!(
        key,
        path = %local_path.display(),
        bytes = data.len(),
        "downloaded object"
    );
    Ok(true)
}
