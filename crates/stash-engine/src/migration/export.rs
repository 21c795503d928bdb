//! Export: stage every blob plus one JSON record per location, then pack the
//! staging directory into a single zip archive.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use stash_core::archive::{GENERAL_SPACE_FILE, location_file_name};
use stash_core::{BoxRecord, ItemRecord, LocationRecord};
use stash_storage::{BlobStore, Storage};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::{MigrationPaths, remove_dir_if_exists};
use crate::error::{MigrationError, Result};

const ARCHIVE_PREFIX: &str = "export_";
const ARCHIVE_SUFFIX: &str = ".zip";
const PARTIAL_SUFFIX: &str = ".partial";

/// Run a full export and return the archive path
pub(crate) async fn run(
    storage: &Storage,
    store: &BlobStore,
    paths: &MigrationPaths,
    cancel: Arc<AtomicBool>,
) -> Result<PathBuf> {
    discard_artifacts(paths).await?;
    check_cancelled(&cancel)?;

    let staging = paths.export_dir.clone();
    tokio::fs::create_dir_all(&staging).await?;

    let blobs = store.copy_all_to(&staging).await?;
    debug!(blobs, "Copied images to export staging");
    check_cancelled(&cancel)?;

    let locations = write_records(storage, &staging).await?;
    check_cancelled(&cancel)?;

    let archive = paths.archives_dir.join(archive_file_name(OffsetDateTime::now_utc())?);
    let target = archive.clone();
    let source = staging.clone();
    tokio::task::spawn_blocking(move || write_archive(&source, &target, &cancel)).await??;

    remove_dir_if_exists(&staging).await?;
    info!(archive = %archive.display(), locations, blobs, "Export finished");
    Ok(archive)
}

/// Remove the export staging directory and every archive or partial archive
/// left by earlier exports. Returns how many archives were removed.
pub(crate) async fn discard_artifacts(paths: &MigrationPaths) -> Result<usize> {
    remove_dir_if_exists(&paths.export_dir).await?;

    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(&paths.archives_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if is_export_artifact(name) && entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn check_cancelled(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::SeqCst) {
        Err(MigrationError::Cancelled)
    } else {
        Ok(())
    }
}

fn archive_file_name(now: OffsetDateTime) -> Result<String> {
    let stamp = now.format(format_description!(
        "[year]-[month]-[day]_[hour]-[minute]-[second]"
    ))?;
    Ok(format!("{}{}{}", ARCHIVE_PREFIX, stamp, ARCHIVE_SUFFIX))
}

fn is_export_artifact(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(ARCHIVE_PREFIX) else {
        return false;
    };
    let rest = rest.strip_suffix(PARTIAL_SUFFIX).unwrap_or(rest);
    rest.ends_with(ARCHIVE_SUFFIX)
}

/// Write the general-space record and one record per location. Returns the
/// number of locations written.
async fn write_records(storage: &Storage, dir: &Path) -> Result<usize> {
    let general: Vec<ItemRecord> = storage
        .list_general_items()
        .await?
        .iter()
        .map(ItemRecord::from)
        .collect();
    write_json(&dir.join(GENERAL_SPACE_FILE), &general).await?;

    let locations = storage.list_locations().await?;
    for (index, location) in locations.iter().enumerate() {
        let mut boxes = Vec::new();
        for storage_box in storage.list_boxes(location.id).await? {
            let items = storage.list_items(storage_box.id).await?;
            boxes.push(BoxRecord::new(&storage_box, &items));
        }

        let record = LocationRecord {
            name: location.name.clone(),
            boxes,
        };
        write_json(&dir.join(location_file_name(index)), &record).await?;
    }

    Ok(locations.len())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Zip the top level files of `source` into `destination`. The archive is
/// written under a `.partial` name and only renamed once complete.
fn write_archive(source: &Path, destination: &Path, cancel: &AtomicBool) -> Result<()> {
    let mut partial = destination.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let result = zip_directory(source, &partial, cancel).and_then(|()| {
        std::fs::rename(&partial, destination).map_err(MigrationError::from)
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result
}

fn zip_directory(source: &Path, destination: &Path, cancel: &AtomicBool) -> Result<()> {
    let file = File::create(destination)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let walker = WalkDir::new(source)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        check_cancelled(cancel)?;

        let name = entry.file_name().to_string_lossy().into_owned();
        zip.start_file(name, options)?;
        let mut input = File::open(entry.path())?;
        io::copy(&mut input, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}
