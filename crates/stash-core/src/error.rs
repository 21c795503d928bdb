use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Wrong box code format: {0}")]
    InvalidBoxCode(String),

    #[error("Box number {0} does not fit an eight digit code")]
    BoxCodeOutOfRange(i64),

    #[error("Box code already in use: {0}")]
    BoxCodeInUse(String),

    #[error("Location not found: {0}")]
    LocationNotFound(i64),

    #[error("Box not found: {0}")]
    BoxNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, Error>;
