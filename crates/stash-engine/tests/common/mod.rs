#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Cursor;

use stash_core::BlobId;
use stash_engine::{MigrationPaths, Migrator};
use stash_storage::{BlobStore, ImageOptions, Storage};
use tempfile::TempDir;

/// A data directory with its database and blob store
pub struct Fixture {
    pub dir: TempDir,
    pub storage: Storage,
    pub store: BlobStore,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("inventory.db"), 1)
            .await
            .unwrap();
        let store = BlobStore::open(dir.path().join("images"), ImageOptions::default()).unwrap();
        Self { dir, storage, store }
    }

    pub fn paths(&self) -> MigrationPaths {
        MigrationPaths {
            export_dir: self.dir.path().join("export"),
            import_dir: self.dir.path().join("import"),
            archives_dir: self.dir.path().to_path_buf(),
        }
    }

    pub fn migrator(&self) -> Migrator {
        Migrator::new(self.storage.clone(), self.store.clone(), self.paths())
    }

    pub async fn save_image(&self, seed: u8) -> BlobId {
        self.store.save(png(seed)).await.unwrap()
    }

    pub async fn blobs_on_disk(&self) -> HashSet<BlobId> {
        self.store.list_existing_ids().await.unwrap()
    }
}

/// A small PNG, distinct per seed
pub fn png(seed: u8) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(8, 6, image::Rgb([seed, 255 - seed, 128]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn set(ids: &[BlobId]) -> HashSet<BlobId> {
    ids.iter().cloned().collect()
}
