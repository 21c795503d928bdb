use stash_core::{BlobId, Item, Location, StorageBox, decode_blob_ids};

/// Row of the `locations` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LocationRow {
    pub id: i64,
    pub name: String,
}

/// Row of the `boxes` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BoxRow {
    pub id: i64,
    pub location_id: i64,
    pub name: String,
    pub code: i64,
    pub comment: Option<String>,
    pub image_id: Option<String>,
}

/// Row of the `items` table. `image_ids` holds the comma-joined id list.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub id: i64,
    pub box_id: Option<i64>,
    pub name: String,
    pub comment: Option<String>,
    pub keywords: Option<String>,
    pub barcode: Option<String>,
    pub image_ids: Option<String>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
        }
    }
}

impl From<BoxRow> for StorageBox {
    fn from(row: BoxRow) -> Self {
        Self {
            id: row.id,
            location_id: row.location_id,
            name: row.name,
            code: row.code,
            comment: row.comment,
            image_id: row.image_id.map(BlobId::from),
        }
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            box_id: row.box_id,
            name: row.name,
            comment: row.comment,
            keywords: row.keywords,
            barcode: row.barcode,
            image_ids: row
                .image_ids
                .as_deref()
                .map(decode_blob_ids)
                .unwrap_or_default(),
        }
    }
}
