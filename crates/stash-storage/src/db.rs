//! Database operations

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use stash_core::{
    BlobId, Error as CoreError, Item, Location, NewBox, NewItem, StorageBox, check_box_code,
};
use tracing::debug;

use crate::Result;
use crate::models::{BoxRow, ItemRow, LocationRow};
use crate::queries::{self, LAST_BOX_CODE_KEY, SCHEMA_SQL};

/// Relational storage of locations, boxes and items
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (creating if missing) the database at `path` and apply the schema
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        debug!(path = %path.display(), "Opened inventory database");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction; statements from [`queries`] run against `&mut *tx`
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ------------------------------------------------------------------
    // Locations
    // ------------------------------------------------------------------

    pub async fn create_location(&self, name: &str) -> Result<Location> {
        let mut conn = self.pool.acquire().await?;
        let id = queries::insert_location(&mut conn, name).await?;
        Ok(Location {
            id,
            name: name.to_string(),
        })
    }

    pub async fn list_locations(&self) -> Result<Vec<Location>> {
        let rows = sqlx::query_as::<_, LocationRow>("SELECT * FROM locations ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Location::from).collect())
    }

    pub async fn get_location(&self, id: i64) -> Result<Location> {
        let row = sqlx::query_as::<_, LocationRow>("SELECT * FROM locations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::LocationNotFound(id))?;
        Ok(row.into())
    }

    pub async fn rename_location(&self, id: i64, name: &str) -> Result<Location> {
        let result = sqlx::query("UPDATE locations SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::LocationNotFound(id).into());
        }
        Ok(Location {
            id,
            name: name.to_string(),
        })
    }

    /// Delete a location with all its boxes and their items. Returns the blob
    /// ids they referenced; deleting those blobs is up to the caller.
    pub async fn delete_location(&self, id: i64) -> Result<Vec<BlobId>> {
        let mut tx = self.pool.begin().await?;

        let mut blob_ids = Vec::new();
        for row in queries::boxes_in_location(&mut tx, id).await? {
            blob_ids.extend(queries::box_blob_ids(&mut tx, row.id).await?);
            sqlx::query("DELETE FROM items WHERE box_id = ?")
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM boxes WHERE location_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM locations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::LocationNotFound(id).into());
        }

        tx.commit().await?;
        Ok(blob_ids)
    }

    // ------------------------------------------------------------------
    // Boxes
    // ------------------------------------------------------------------

    /// Create a box and remember its code as the last used box number
    pub async fn create_box(&self, new_box: &NewBox) -> Result<StorageBox> {
        check_box_code(new_box.code)?;
        let mut tx = self.pool.begin().await?;
        let id = queries::insert_box(&mut tx, new_box).await?;
        queries::set_last_box_code(&mut tx, new_box.code).await?;
        tx.commit().await?;

        Ok(StorageBox {
            id,
            location_id: new_box.location_id,
            name: new_box.name.clone(),
            code: new_box.code,
            comment: new_box.comment.clone(),
            image_id: new_box.image_id.clone(),
        })
    }

    pub async fn get_box(&self, id: i64) -> Result<StorageBox> {
        let row = sqlx::query_as::<_, BoxRow>("SELECT * FROM boxes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::BoxNotFound(id.to_string()))?;
        Ok(row.into())
    }

    pub async fn get_box_by_code(&self, code: i64) -> Result<Option<StorageBox>> {
        let row = sqlx::query_as::<_, BoxRow>("SELECT * FROM boxes WHERE code = ? LIMIT 1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(StorageBox::from))
    }

    pub async fn has_box_with_code(&self, code: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM boxes WHERE code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn list_boxes(&self, location_id: i64) -> Result<Vec<StorageBox>> {
        let mut conn = self.pool.acquire().await?;
        let rows = queries::boxes_in_location(&mut conn, location_id).await?;
        Ok(rows.into_iter().map(StorageBox::from).collect())
    }

    pub async fn update_box(&self, id: i64, fields: &NewBox) -> Result<StorageBox> {
        let result = sqlx::query(
            "UPDATE boxes SET location_id = ?, name = ?, code = ?, comment = ?, image_id = ? \
             WHERE id = ?",
        )
        .bind(fields.location_id)
        .bind(&fields.name)
        .bind(fields.code)
        .bind(&fields.comment)
        .bind(fields.image_id.as_ref().map(BlobId::as_str))
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::BoxNotFound(id.to_string()).into());
        }
        self.get_box(id).await
    }

    /// Delete a box. With `keep_items` its items move to the general space,
    /// otherwise they are deleted too. Returns the blob ids that are no longer
    /// referenced.
    pub async fn delete_box(&self, id: i64, keep_items: bool) -> Result<Vec<BlobId>> {
        let mut tx = self.pool.begin().await?;

        let storage_box: StorageBox = sqlx::query_as::<_, BoxRow>("SELECT * FROM boxes WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::BoxNotFound(id.to_string()))?
            .into();

        let blob_ids = if keep_items {
            sqlx::query("UPDATE items SET box_id = NULL WHERE box_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            storage_box.image_id.into_iter().collect()
        } else {
            let ids = queries::box_blob_ids(&mut tx, id).await?;
            sqlx::query("DELETE FROM items WHERE box_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            ids
        };

        sqlx::query("DELETE FROM boxes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(blob_ids)
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    pub async fn create_item(&self, item: &NewItem) -> Result<Item> {
        let mut conn = self.pool.acquire().await?;
        let id = queries::insert_item(&mut conn, item).await?;
        Ok(Item {
            id,
            box_id: item.box_id,
            name: item.name.clone(),
            comment: item.comment.clone(),
            keywords: item.keywords.clone(),
            barcode: item.barcode.clone(),
            image_ids: item.image_ids.clone(),
        })
    }

    pub async fn get_item(&self, id: i64) -> Result<Item> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::ItemNotFound(id))?;
        Ok(row.into())
    }

    /// Items not attached to any box
    pub async fn list_general_items(&self) -> Result<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE box_id IS NULL ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    pub async fn list_items(&self, box_id: i64) -> Result<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE box_id = ? ORDER BY id")
            .bind(box_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    pub async fn update_item(&self, id: i64, fields: &NewItem) -> Result<Item> {
        let result = sqlx::query(
            "UPDATE items SET box_id = ?, name = ?, comment = ?, keywords = ?, barcode = ?, \
             image_ids = ? WHERE id = ?",
        )
        .bind(fields.box_id)
        .bind(&fields.name)
        .bind(&fields.comment)
        .bind(&fields.keywords)
        .bind(&fields.barcode)
        .bind(stash_core::encode_blob_ids(&fields.image_ids))
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::ItemNotFound(id).into());
        }
        self.get_item(id).await
    }

    /// Delete an item, returning the blob ids it referenced
    pub async fn delete_item(&self, id: i64) -> Result<Vec<BlobId>> {
        let item = self.get_item(id).await?;
        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(item.image_ids)
    }

    // ------------------------------------------------------------------
    // Blob references and box numbering
    // ------------------------------------------------------------------

    /// Every blob id referenced by any box or item
    pub async fn current_blob_ids_in_use(&self) -> Result<HashSet<BlobId>> {
        let mut ids = HashSet::new();

        let box_images: Vec<String> =
            sqlx::query_scalar("SELECT image_id FROM boxes WHERE image_id IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;
        ids.extend(box_images.into_iter().map(BlobId::from));

        let item_images: Vec<String> =
            sqlx::query_scalar("SELECT image_ids FROM items WHERE image_ids IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;
        for raw in item_images {
            ids.extend(stash_core::decode_blob_ids(&raw));
        }

        Ok(ids)
    }

    /// Last box number handed out, 0 when none
    pub async fn last_box_code(&self) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        let value = queries::get_setting(&mut conn, LAST_BOX_CODE_KEY).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    pub async fn set_last_box_code(&self, code: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        queries::set_last_box_code(&mut conn, code).await
    }

    /// Suggested number for the next box
    /// Fails once the last code used is the largest printable one
    pub async fn next_box_code(&self) -> Result<i64> {
        let last = self.last_box_code().await?;
        Ok(check_box_code(last.saturating_add(1))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;
    use stash_core::MAX_BOX_CODE;

    async fn storage(dir: &Path) -> Storage {
        Storage::open(&dir.join("inventory.db"), 1).await.unwrap()
    }

    fn new_box(location_id: i64, code: i64, image: Option<BlobId>) -> NewBox {
        NewBox {
            location_id,
            name: format!("Box {}", code),
            code,
            comment: None,
            image_id: image,
        }
    }

    #[tokio::test]
    async fn test_location_box_item_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let garage = storage.create_location("Garage").await.unwrap();
        let storage_box = storage.create_box(&new_box(garage.id, 3, None)).await.unwrap();
        let image = BlobId::random();
        let item = storage
            .create_item(&NewItem::new("Hammer").in_box(storage_box.id).with_images(vec![image.clone()]))
            .await
            .unwrap();

        assert_eq!(storage.list_locations().await.unwrap(), vec![garage.clone()]);
        assert_eq!(storage.list_boxes(garage.id).await.unwrap(), vec![storage_box.clone()]);
        assert_eq!(storage.list_items(storage_box.id).await.unwrap(), vec![item.clone()]);
        assert_eq!(storage.get_item(item.id).await.unwrap().image_ids, vec![image]);
        assert!(storage.list_general_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_box_tracks_last_code() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let location = storage.create_location("Attic").await.unwrap();

        assert_eq!(storage.next_box_code().await.unwrap(), 1);
        storage.create_box(&new_box(location.id, 41, None)).await.unwrap();

        assert_eq!(storage.last_box_code().await.unwrap(), 41);
        assert_eq!(storage.next_box_code().await.unwrap(), 42);
        assert!(storage.has_box_with_code(41).await.unwrap());
        assert!(!storage.has_box_with_code(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_box_codes_must_be_printable() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let location = storage.create_location("Attic").await.unwrap();

        assert!(matches!(
            storage.create_box(&new_box(location.id, -1, None)).await,
            Err(StorageError::Core(CoreError::BoxCodeOutOfRange(-1)))
        ));
        storage.create_box(&new_box(location.id, MAX_BOX_CODE, None)).await.unwrap();
        assert!(matches!(
            storage.next_box_code().await,
            Err(StorageError::Core(CoreError::BoxCodeOutOfRange(_)))
        ));
    }

    #[tokio::test]
    async fn test_delete_box_returns_blob_ids() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let location = storage.create_location("Cellar").await.unwrap();

        let box_image = BlobId::random();
        let item_image = BlobId::random();
        let storage_box = storage
            .create_box(&new_box(location.id, 1, Some(box_image.clone())))
            .await
            .unwrap();
        storage
            .create_item(&NewItem::new("Jar").in_box(storage_box.id).with_images(vec![item_image.clone()]))
            .await
            .unwrap();

        let freed = storage.delete_box(storage_box.id, false).await.unwrap();

        assert_eq!(freed, vec![box_image, item_image]);
        assert!(storage.current_blob_ids_in_use().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_box_keeping_items() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let location = storage.create_location("Cellar").await.unwrap();
        let storage_box = storage.create_box(&new_box(location.id, 1, None)).await.unwrap();
        let item = storage
            .create_item(&NewItem::new("Jar").in_box(storage_box.id))
            .await
            .unwrap();

        let freed = storage.delete_box(storage_box.id, true).await.unwrap();

        assert!(freed.is_empty());
        let general = storage.list_general_items().await.unwrap();
        assert_eq!(general.len(), 1);
        assert_eq!(general[0].id, item.id);
    }

    #[tokio::test]
    async fn test_blob_ids_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let location = storage.create_location("Office").await.unwrap();

        let a = BlobId::random();
        let b = BlobId::random();
        let c = BlobId::random();
        storage.create_box(&new_box(location.id, 1, Some(a.clone()))).await.unwrap();
        storage
            .create_item(&NewItem::new("Stapler").with_images(vec![b.clone(), c.clone()]))
            .await
            .unwrap();

        let in_use = storage.current_blob_ids_in_use().await.unwrap();
        assert_eq!(in_use, HashSet::from([a, b, c]));
    }

    #[tokio::test]
    async fn test_transaction_rollback_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;

        {
            let mut tx = storage.begin().await.unwrap();
            queries::insert_location(&mut tx, "Ghost").await.unwrap();
            // dropped without commit
        }

        assert!(storage.list_locations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_rows_report_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path()).await;

        assert!(storage.get_location(99).await.is_err());
        assert!(storage.get_item(99).await.is_err());
        assert!(storage.delete_box(99, false).await.is_err());
        assert!(storage.get_box_by_code(99).await.unwrap().is_none());
    }
}
