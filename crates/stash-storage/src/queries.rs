//! Row-level statements shared by the pool-backed `Storage` methods and by
//! callers running inside their own transaction.

use sqlx::SqliteConnection;
use stash_core::{BlobId, NewBox, NewItem, encode_blob_ids};

use crate::Result;
use crate::models::{BoxRow, ItemRow};

/// Settings key of the last used box number
pub const LAST_BOX_CODE_KEY: &str = "last_box_code";

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS boxes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    location_id INTEGER NOT NULL REFERENCES locations(id),
    name TEXT NOT NULL,
    code INTEGER NOT NULL,
    comment TEXT,
    image_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_boxes_location ON boxes(location_id);
CREATE INDEX IF NOT EXISTS idx_boxes_code ON boxes(code);

CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    box_id INTEGER REFERENCES boxes(id),
    name TEXT NOT NULL,
    comment TEXT,
    keywords TEXT,
    barcode TEXT,
    image_ids TEXT
);

CREATE INDEX IF NOT EXISTS idx_items_box ON items(box_id);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub async fn insert_location(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO locations (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_box(conn: &mut SqliteConnection, new_box: &NewBox) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO boxes (location_id, name, code, comment, image_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new_box.location_id)
    .bind(&new_box.name)
    .bind(new_box.code)
    .bind(&new_box.comment)
    .bind(new_box.image_id.as_ref().map(BlobId::as_str))
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_item(conn: &mut SqliteConnection, item: &NewItem) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO items (box_id, name, comment, keywords, barcode, image_ids) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(item.box_id)
    .bind(&item.name)
    .bind(&item.comment)
    .bind(&item.keywords)
    .bind(&item.barcode)
    .bind(encode_blob_ids(&item.image_ids))
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Highest box number in use, if any box exists
pub async fn max_box_code(conn: &mut SqliteConnection) -> Result<Option<i64>> {
    let code: Option<i64> = sqlx::query_scalar("SELECT MAX(code) FROM boxes")
        .fetch_one(&mut *conn)
        .await?;
    Ok(code)
}

pub async fn get_setting(conn: &mut SqliteConnection, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(value)
}

pub async fn set_setting(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn set_last_box_code(conn: &mut SqliteConnection, code: i64) -> Result<()> {
    set_setting(conn, LAST_BOX_CODE_KEY, &code.to_string()).await
}

/// Blob ids referenced by a box and by every item inside it
pub async fn box_blob_ids(conn: &mut SqliteConnection, box_id: i64) -> Result<Vec<BlobId>> {
    let mut ids = Vec::new();

    let image: Option<Option<String>> =
        sqlx::query_scalar("SELECT image_id FROM boxes WHERE id = ?")
            .bind(box_id)
            .fetch_optional(&mut *conn)
            .await?;
    ids.extend(image.flatten().map(BlobId::from));

    let items = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE box_id = ?")
        .bind(box_id)
        .fetch_all(&mut *conn)
        .await?;
    for row in items {
        let item: stash_core::Item = row.into();
        ids.extend(item.image_ids);
    }

    Ok(ids)
}

pub async fn boxes_in_location(
    conn: &mut SqliteConnection,
    location_id: i64,
) -> Result<Vec<BoxRow>> {
    let rows = sqlx::query_as::<_, BoxRow>("SELECT * FROM boxes WHERE location_id = ? ORDER BY id")
        .bind(location_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}
