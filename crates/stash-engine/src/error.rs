//! Error types for stash-engine

use stash_core::BlobId;
use stash_storage::StorageError;
use thiserror::Error;

use crate::session::SessionState;

/// Misuse of an edit session. Disk failures never show up here; they are
/// logged by the blob store.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Edit session is already {0}")]
    Closed(SessionState),

    #[error("Image index {index} out of range ({len} images)")]
    InvalidIndex { index: usize, len: usize },
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("An {0} is already running")]
    Busy(&'static str),

    #[error("Export cancelled")]
    Cancelled,

    #[error("Archive has no general space record")]
    MissingGeneralSpace,

    #[error("Archive is missing image {0}")]
    MissingBlob(BlobId),

    #[error("Archive refers to image {0} outside the archive")]
    InvalidBlobId(BlobId),

    #[error("Cannot decode {file}: {source}")]
    Decode {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cannot format archive timestamp: {0}")]
    Timestamp(#[from] time::error::Format),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, MigrationError>;
