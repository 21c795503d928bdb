//! Core domain models and logic for stash
//!
//! This crate contains:
//! - Domain models (Location, StorageBox, Item)
//! - Blob identifiers and the comma-joined id list codec
//! - Box code formatting and parsing
//! - Archive record types shared by export and import

pub mod archive;
pub mod blob_id;
pub mod box_code;
pub mod error;
pub mod model;

pub use archive::{BoxRecord, ItemRecord, LocationRecord};
pub use blob_id::{BlobId, decode_blob_ids, encode_blob_ids};
pub use box_code::{MAX_BOX_CODE, check_box_code, format_box_code, parse_box_code};
pub use error::{Error, Result};
pub use model::{Item, Location, NewBox, NewItem, StorageBox};
