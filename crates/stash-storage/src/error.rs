//! Error types for stash-storage

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Blob already exists: {0}")]
    BlobExists(String),

    #[error("Blob store worker has stopped")]
    WorkerStopped,

    #[error(transparent)]
    Core(#[from] stash_core::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
