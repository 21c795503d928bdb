//! Blob identifiers
//!
//! A blob id is a hyphenated UUID rendered as a 36 character string. Records
//! store lists of ids as a single comma-joined string; decoding drops any
//! token that is not a hyphenated UUID.

use serde::{Deserialize, Serialize};
use std::fmt;

/// File extension of every blob on disk
pub const BLOB_EXTENSION: &str = "jpg";

/// Separator used when a list of ids is stored as one string
pub const ID_LIST_SEPARATOR: char = ',';

/// Opaque identifier of an image blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    /// Length of a well-formed id
    pub const LEN: usize = 36;

    /// Generate a random id. Uniqueness against disk is the blob store's job.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().hyphenated().to_string().to_uppercase())
    }

    /// Accept `raw` only if it is a hyphenated UUID. Ids read from records or
    /// archives go through here before they are used as file names.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() != Self::LEN || uuid::Uuid::try_parse(raw).is_err() {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    /// Whether this id could have come from [`BlobId::parse`]
    pub fn is_well_formed(&self) -> bool {
        Self::parse(&self.0).is_some()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the file holding this blob, e.g. `<id>.jpg`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, BLOB_EXTENSION)
    }

    /// Recover an id from a blob file name. Returns `None` for anything that
    /// is not `<id>.jpg`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(BLOB_EXTENSION)?.strip_suffix('.')?;
        Self::parse(stem)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for BlobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for BlobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Join ids into the stored string form
pub fn encode_blob_ids(ids: &[BlobId]) -> String {
    ids.iter()
        .map(BlobId::as_str)
        .collect::<Vec<_>>()
        .join(&ID_LIST_SEPARATOR.to_string())
}

/// Split the stored string form back into ids, dropping malformed tokens
pub fn decode_blob_ids(raw: &str) -> Vec<BlobId> {
    raw.split(ID_LIST_SEPARATOR)
        .filter_map(BlobId::parse)
        .collect()
}
