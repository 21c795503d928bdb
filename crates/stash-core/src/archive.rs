//! Archive record types
//!
//! An export archive holds `general_location.json` (array of item records for
//! items without a box), one `location_<n>.json` per location and one
//! `<id>.jpg` per blob. Field names are part of the archive format.

use serde::{Deserialize, Deserializer, Serialize};

use crate::blob_id::{BlobId, decode_blob_ids, encode_blob_ids};
use crate::model::{Item, NewBox, NewItem, StorageBox};

/// File holding the general-space items
pub const GENERAL_SPACE_FILE: &str = "general_location.json";

/// Prefix of per-location files
pub const LOCATION_FILE_PREFIX: &str = "location_";

/// File name of the location record at `index`
pub fn location_file_name(index: usize) -> String {
    format!("{}{}.json", LOCATION_FILE_PREFIX, index)
}

/// Whether a file name inside an archive is a location record
pub fn is_location_file(name: &str) -> bool {
    name.starts_with(LOCATION_FILE_PREFIX) && name.ends_with(".json")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(
        rename = "imageUUIDs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub image_uuids: Option<String>,
}

impl ItemRecord {
    pub fn image_ids(&self) -> Vec<BlobId> {
        self.image_uuids
            .as_deref()
            .map(decode_blob_ids)
            .unwrap_or_default()
    }

    pub fn set_image_ids(&mut self, ids: &[BlobId]) {
        self.image_uuids = Some(encode_blob_ids(ids));
    }

    /// Rewrite every image id through `map`
    pub fn map_image_ids(&mut self, mut map: impl FnMut(&BlobId) -> BlobId) {
        let mapped: Vec<BlobId> = self.image_ids().iter().map(&mut map).collect();
        self.set_image_ids(&mapped);
    }

    pub fn to_new_item(&self, box_id: Option<i64>) -> NewItem {
        NewItem {
            box_id,
            name: self.name.clone(),
            comment: self.comment.clone(),
            keywords: self.keywords.clone(),
            barcode: self.barcode.clone(),
            image_ids: self.image_ids(),
        }
    }
}

impl From<&Item> for ItemRecord {
    fn from(item: &Item) -> Self {
        Self {
            name: item.name.clone(),
            comment: item.comment.clone(),
            keywords: item.keywords.clone(),
            barcode: item.barcode.clone(),
            image_uuids: Some(encode_blob_ids(&item.image_ids)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub name: String,
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(
        rename = "imageUUID",
        default,
        deserialize_with = "well_formed_blob_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_uuid: Option<BlobId>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
}

impl BoxRecord {
    pub fn new(storage_box: &StorageBox, items: &[Item]) -> Self {
        Self {
            name: storage_box.name.clone(),
            code: storage_box.code,
            comment: storage_box.comment.clone(),
            image_uuid: storage_box.image_id.clone(),
            items: items.iter().map(ItemRecord::from).collect(),
        }
    }

    pub fn to_new_box(&self, location_id: i64) -> NewBox {
        NewBox {
            location_id,
            name: self.name.clone(),
            code: self.code,
            comment: self.comment.clone(),
            image_id: self.image_uuid.clone(),
        }
    }
}

/// A malformed box image id is dropped, like a malformed token in an item's
/// id list
fn well_formed_blob_id<'de, D>(deserializer: D) -> Result<Option<BlobId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(BlobId::parse))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub name: String,
    #[serde(default)]
    pub boxes: Vec<BoxRecord>,
}

impl LocationRecord {
    /// Every blob id referenced by this location, boxes first, in record order
    pub fn blob_ids(&self) -> Vec<BlobId> {
        let mut ids = Vec::new();
        for record in &self.boxes {
            ids.extend(record.image_uuid.iter().cloned());
            for item in &record.items {
                ids.extend(item.image_ids());
            }
        }
        ids
    }
}
