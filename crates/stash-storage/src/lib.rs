//! Storage layer for stash
//!
//! This crate provides:
//! - SQLite database operations for locations, boxes and items
//! - The blob store holding item and box photos as JPEG files
//! - Image normalization before blobs are written

pub mod blob;
pub mod db;
pub mod error;
pub mod imaging;
pub mod models;
pub mod queries;

pub use blob::BlobStore;
pub use db::Storage;
pub use error::{Result, StorageError};
pub use imaging::ImageOptions;
