use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchivistError>;

#[derive(Debug, Error)]
pub enum ArchivistError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("manifest '{path}' is corrupt: {source}")]
    ManifestCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("refusing unsafe archive member path: {0}")]
    UnsafePath(String),

    #[error(transparent)]
    Storage(#[from] archivist_storage::StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
