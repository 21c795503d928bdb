use serde::{Deserialize, Serialize};

use crate::BlobId;
use crate::box_code::format_box_code;

/// A named place holding boxes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
}

/// A labelled box inside a location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBox {
    pub id: i64,
    pub location_id: i64,
    pub name: String,
    pub code: i64,
    pub comment: Option<String>,
    pub image_id: Option<BlobId>,
}

impl StorageBox {
    /// Printed form of the box number
    pub fn display_code(&self) -> String {
        format_box_code(self.code)
    }
}

/// An item, either inside a box or in the general space (`box_id == None`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub box_id: Option<i64>,
    pub name: String,
    pub comment: Option<String>,
    pub keywords: Option<String>,
    pub barcode: Option<String>,
    #[serde(default)]
    pub image_ids: Vec<BlobId>,
}

/// Fields needed to create or update a box
#[derive(Debug, Clone, Default)]
pub struct NewBox {
    pub location_id: i64,
    pub name: String,
    pub code: i64,
    pub comment: Option<String>,
    pub image_id: Option<BlobId>,
}

/// Fields needed to create or update an item
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub box_id: Option<i64>,
    pub name: String,
    pub comment: Option<String>,
    pub keywords: Option<String>,
    pub barcode: Option<String>,
    pub image_ids: Vec<BlobId>,
}

impl NewItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn in_box(mut self, box_id: i64) -> Self {
        self.box_id = Some(box_id);
        self
    }

    pub fn with_images(mut self, image_ids: Vec<BlobId>) -> Self {
        self.image_ids = image_ids;
        self
    }
}
