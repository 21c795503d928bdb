//! Import: unpack an archive, give every image a fresh id and rebuild the
//! records inside one transaction.
//!
//! Rows are inserted first, then blobs are copied, and the transaction only
//! commits once every copy succeeded. On failure the transaction rolls back,
//! copied blobs are deleted and unused id reservations are released.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use stash_core::archive::{GENERAL_SPACE_FILE, LOCATION_FILE_PREFIX, is_location_file};
use stash_core::{BlobId, ItemRecord, LocationRecord};
use stash_storage::{BlobStore, Storage, queries};
use tracing::{info, warn};
use zip::ZipArchive;

use super::remap::RemapTable;
use super::{ImportSummary, MigrationPaths, remove_dir_if_exists};
use crate::error::{MigrationError, Result};

pub(crate) async fn run(
    storage: &Storage,
    store: &BlobStore,
    paths: &MigrationPaths,
    archive: &Path,
) -> Result<ImportSummary> {
    let staging = &paths.import_dir;
    remove_dir_if_exists(staging).await?;
    tokio::fs::create_dir_all(staging).await?;

    let mut table = RemapTable::new();
    let mut copied = Vec::new();
    let result = import_staged(storage, store, archive, staging, &mut table, &mut copied).await;

    if result.is_err() {
        store.delete(copied).await;
        store.release(table.destinations());
    }
    if let Err(err) = remove_dir_if_exists(staging).await {
        warn!(error = %err, "Cannot remove import staging directory");
    }

    if let Ok(summary) = &result {
        info!(
            locations = summary.locations,
            boxes = summary.boxes,
            items = summary.items,
            images = summary.images,
            "Import finished"
        );
    }
    result
}

async fn import_staged(
    storage: &Storage,
    store: &BlobStore,
    archive: &Path,
    staging: &Path,
    table: &mut RemapTable,
    copied: &mut Vec<BlobId>,
) -> Result<ImportSummary> {
    unpack(archive, staging).await?;
    let (mut general, mut locations) = read_records(staging).await?;

    // One table for all groups so an id shared across records maps once
    let general_ids: Vec<BlobId> = general.iter().flat_map(ItemRecord::image_ids).collect();
    table.extend(store, &general_ids).await?;
    for location in &locations {
        table.extend(store, &location.blob_ids()).await?;
    }

    for item in &mut general {
        table.rewrite_item(item);
    }
    for location in &mut locations {
        table.rewrite_location(location);
    }

    let mut sources = Vec::with_capacity(table.len());
    for (source, dest) in table.iter() {
        let path = staged_blob_path(staging, source)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(MigrationError::MissingBlob(source.clone()));
        }
        sources.push((path, dest));
    }

    let mut summary = ImportSummary::default();
    let mut tx = storage.begin().await?;

    for item in &general {
        queries::insert_item(&mut tx, &item.to_new_item(None)).await?;
        summary.items += 1;
    }
    for location in &locations {
        let location_id = queries::insert_location(&mut tx, &location.name).await?;
        summary.locations += 1;

        for record in &location.boxes {
            let box_id = queries::insert_box(&mut tx, &record.to_new_box(location_id)).await?;
            summary.boxes += 1;

            for item in &record.items {
                queries::insert_item(&mut tx, &item.to_new_item(Some(box_id))).await?;
                summary.items += 1;
            }
        }
    }

    for (path, dest) in sources {
        store.import_file(&path, dest).await?;
        copied.push(dest.clone());
    }
    summary.images = copied.len();

    if let Some(max) = queries::max_box_code(&mut tx).await? {
        queries::set_last_box_code(&mut tx, max).await?;
        summary.last_box_code = Some(max);
    }

    tx.commit().await?;
    Ok(summary)
}

/// Path of an archive blob inside `staging`. Only well-formed ids are
/// accepted, so the path never leaves the staging directory.
fn staged_blob_path(staging: &Path, id: &BlobId) -> Result<PathBuf> {
    let path = staging.join(id.file_name());
    if !id.is_well_formed() || path.parent() != Some(staging) {
        return Err(MigrationError::InvalidBlobId(id.clone()));
    }
    Ok(path)
}

async fn unpack(archive: &Path, staging: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let staging = staging.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut zip = ZipArchive::new(File::open(&archive)?)?;
        zip.extract(&staging)?;
        Ok(())
    })
    .await?
}

/// Decode the general-space record and every location record, the latter in
/// numeric file order
async fn read_records(dir: &Path) -> Result<(Vec<ItemRecord>, Vec<LocationRecord>)> {
    let general_path = dir.join(GENERAL_SPACE_FILE);
    if !tokio::fs::try_exists(&general_path).await? {
        return Err(MigrationError::MissingGeneralSpace);
    }
    let general = read_json(&general_path).await?;

    let mut files: Vec<(usize, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(location_file_index) {
            files.push((index, entry.path()));
        }
    }
    files.sort();

    let mut locations = Vec::with_capacity(files.len());
    for (_, path) in files {
        locations.push(read_json(&path).await?);
    }
    Ok((general, locations))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|source| MigrationError::Decode {
        file: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        source,
    })
}

fn location_file_index(name: &str) -> Option<usize> {
    if !is_location_file(name) {
        return None;
    }
    name.strip_prefix(LOCATION_FILE_PREFIX)?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_file_index() {
        assert_eq!(location_file_index("location_0.json"), Some(0));
        assert_eq!(location_file_index("location_12.json"), Some(12));
        assert_eq!(location_file_index("location_x.json"), None);
        assert_eq!(location_file_index("general_location.json"), None);
        assert_eq!(location_file_index("location_3.jpg"), None);
    }

    #[test]
    fn test_staged_blob_path_stays_in_staging() {
        let staging = Path::new("/data/import");
        let id = BlobId::random();
        assert_eq!(
            staged_blob_path(staging, &id).unwrap(),
            staging.join(id.file_name())
        );

        let escaping = BlobId::from("../outside");
        assert!(matches!(
            staged_blob_path(staging, &escaping),
            Err(MigrationError::InvalidBlobId(_))
        ));
    }

    #[tokio::test]
    async fn test_locations_read_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GENERAL_SPACE_FILE), b"[]").unwrap();
        for (index, name) in [(10, "Ten"), (2, "Two"), (0, "Zero")] {
            let body = format!(r#"{{"name":"{}","boxes":[]}}"#, name);
            std::fs::write(dir.path().join(format!("location_{}.json", index)), body).unwrap();
        }

        let (general, locations) = read_records(dir.path()).await.unwrap();

        assert!(general.is_empty());
        let names: Vec<&str> = locations.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Zero", "Two", "Ten"]);
    }

    #[tokio::test]
    async fn test_missing_general_space_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_records(dir.path()).await;
        assert!(matches!(result, Err(MigrationError::MissingGeneralSpace)));
    }

    #[tokio::test]
    async fn test_malformed_record_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GENERAL_SPACE_FILE), b"[]").unwrap();
        std::fs::write(dir.path().join("location_0.json"), b"{\"boxes\": 3}").unwrap();

        let result = read_records(dir.path()).await;
        assert!(matches!(result, Err(MigrationError::Decode { ref file, .. }) if file == "location_0.json"));
    }
}
