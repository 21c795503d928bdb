pub mod item;
pub mod location;
pub mod migrate;
pub mod storage_box;

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use stash_config::Config;
use stash_core::{BlobId, Error as CoreError, StorageBox, format_box_code, parse_box_code};
use stash_engine::{EditSession, MigrationPaths, Migrator, reconcile_orphans};
use stash_storage::{BlobStore, ImageOptions, Storage};
use tracing::warn;

/// Everything a command needs, opened once per run
pub struct App {
    pub storage: Storage,
    pub store: BlobStore,
    pub migrator: Migrator,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let paths = config.data_paths();

        let storage = Storage::open(&paths.database(), config.storage.max_connections)
            .await
            .with_context(|| format!("Cannot open database in {}", paths.root.display()))?;
        let store = BlobStore::open(
            paths.images_dir(),
            ImageOptions {
                max_dimension: config.images.max_dimension,
                jpeg_quality: config.images.jpeg_quality,
            },
        )?;
        let migrator = Migrator::new(
            storage.clone(),
            store.clone(),
            MigrationPaths {
                export_dir: paths.export_dir(),
                import_dir: paths.import_dir(),
                archives_dir: paths.archives_dir(),
            },
        );

        Ok(Self {
            storage,
            store,
            migrator,
        })
    }

    /// Startup cleanup of unreferenced images. Failures only warn.
    pub async fn drop_orphans(&self) {
        if let Err(e) = reconcile_orphans(&self.storage, &self.store).await {
            warn!(error = %e, "Orphan image cleanup failed");
        }
    }

    /// Look up a box by its printed code
    pub async fn find_box(&self, code: &str) -> Result<StorageBox> {
        let number = parse_box_code(code.trim())?;
        match self.storage.get_box_by_code(number).await? {
            Some(storage_box) => Ok(storage_box),
            None => Err(CoreError::BoxNotFound(format_box_code(number)).into()),
        }
    }
}

/// Image changes requested on the command line
#[derive(Debug, Default)]
pub struct ImageEdits {
    pub add: Vec<PathBuf>,
    /// Swap an attached image for a new file; the old one stays if the new
    /// one cannot be stored
    pub replace: Option<(BlobId, PathBuf)>,
    pub remove: Vec<BlobId>,
    pub reorder: Option<(usize, usize)>,
}

/// Apply `edits` through an edit session over `baseline`, the way an edit
/// screen does. `persist` stores the final list on the record; the session
/// commits only if that succeeds and aborts otherwise.
pub async fn edit_images<F, Fut>(
    store: &BlobStore,
    baseline: Vec<BlobId>,
    edits: ImageEdits,
    persist: F,
) -> Result<Vec<BlobId>>
where
    F: FnOnce(Vec<BlobId>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let session = EditSession::open(store.clone(), baseline);

    if let Err(e) = apply_edits(&session, edits).await {
        session.abort().await?;
        return Err(e);
    }
    if let Err(e) = persist(session.current()).await {
        session.abort().await?;
        return Err(e);
    }

    Ok(session.commit().await?)
}

async fn apply_edits(session: &EditSession, edits: ImageEdits) -> Result<()> {
    // Adds run first so a failed save never follows a removal
    for path in &edits.add {
        match session.add(read_image(path).await?).await? {
            Some(id) => println!("  + {}", id),
            None => warn!(path = %path.display(), "Image could not be stored, skipped"),
        }
    }

    if let Some((old, path)) = &edits.replace {
        if !session.current().contains(old) {
            bail!("Image {} is not attached", old);
        }
        match session.replace(old, read_image(path).await?).await? {
            Some(id) => println!("  + {}", id),
            None => warn!(path = %path.display(), "Image could not be stored, kept {}", old),
        }
    }

    for id in &edits.remove {
        if !session.remove(id)? {
            bail!("Image {} is not attached", id);
        }
    }

    if let Some((from, to)) = edits.reorder {
        session.reorder(&[from], to)?;
    }
    Ok(())
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))
}

pub async fn reconcile(app: &App) -> Result<()> {
    let deleted = reconcile_orphans(&app.storage, &app.store).await?;

    if deleted.is_empty() {
        println!("No orphan images.");
        return Ok(());
    }

    println!("✓ Deleted {} orphan image(s)", deleted.len());
    for id in deleted {
        println!("  {}", id);
    }
    Ok(())
}

pub fn print_images(images: &[BlobId], store: &BlobStore) {
    if images.is_empty() {
        println!("  Images: none");
        return;
    }
    println!("  Images:");
    for (index, id) in images.iter().enumerate() {
        println!("    [{}] {} ({})", index, id, store.path_for(id).display());
    }
}
