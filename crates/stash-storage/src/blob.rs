//! Image blob storage
//!
//! One directory, one `<id>.jpg` file per blob. Every write, delete and id
//! mint runs on a single worker thread, so minting and materializing ids can
//! never race each other within one store.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stash_core::BlobId;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::imaging::{self, ImageOptions};
use crate::{Result, StorageError};

/// Work queued for the store worker
enum Command {
    Save {
        image: Vec<u8>,
        reply: oneshot::Sender<Option<BlobId>>,
    },
    Delete {
        ids: Vec<BlobId>,
        reply: Option<oneshot::Sender<()>>,
    },
    Mint {
        count: usize,
        reply: oneshot::Sender<Result<Vec<BlobId>>>,
    },
    Release {
        ids: Vec<BlobId>,
    },
    Import {
        source: PathBuf,
        id: BlobId,
        reply: oneshot::Sender<Result<()>>,
    },
    CopyAll {
        destination: PathBuf,
        reply: oneshot::Sender<Result<usize>>,
    },
    DeleteAll {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to a blob store. Cheap to clone; all clones share one worker.
#[derive(Clone)]
pub struct BlobStore {
    root: Arc<PathBuf>,
    commands: mpsc::UnboundedSender<Command>,
}

impl BlobStore {
    /// Open (and create if needed) the store directory and start its worker
    pub fn open(root: impl Into<PathBuf>, options: ImageOptions) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = Worker {
            root: root.clone(),
            options,
            reserved: HashSet::new(),
        };
        std::thread::Builder::new()
            .name("stash-blob-store".to_string())
            .spawn(move || worker.run(receiver))?;

        Ok(Self {
            root: Arc::new(root),
            commands,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Final path of a blob
    pub fn path_for(&self, id: &BlobId) -> PathBuf {
        self.root.join(id.file_name())
    }

    /// Probe the disk for a blob
    pub fn exists(&self, id: &BlobId) -> Result<bool> {
        Ok(self.path_for(id).try_exists()?)
    }

    /// Mint one unused id. The id stays reserved until written or released.
    pub async fn mint_id(&self) -> Result<BlobId> {
        self.mint_ids(1)
            .await?
            .pop()
            .ok_or(StorageError::WorkerStopped)
    }

    /// Mint `count` pairwise-distinct ids, none of which exists on disk or is
    /// already reserved. They stay reserved until written or released.
    pub async fn mint_ids(&self, count: usize) -> Result<Vec<BlobId>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Mint { count, reply })?;
        rx.await.map_err(|_| StorageError::WorkerStopped)?
    }

    /// Drop reservations for ids that will never be written
    pub fn release(&self, ids: Vec<BlobId>) {
        if ids.is_empty() {
            return;
        }
        if self.send(Command::Release { ids }).is_err() {
            debug!("Blob store worker gone, nothing to release");
        }
    }

    /// Normalize and store an image. `None` means no blob was produced; the
    /// reason has already been logged.
    pub async fn save(&self, image: Vec<u8>) -> Option<BlobId> {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Save { image, reply }).is_err() {
            error!("Cannot save image: blob store worker has stopped");
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Delete blobs and wait until the worker is done, including any delete
    /// queued earlier. Missing blobs are fine.
    pub async fn delete(&self, ids: Vec<BlobId>) {
        let (reply, rx) = oneshot::channel();
        if self
            .send(Command::Delete {
                ids,
                reply: Some(reply),
            })
            .is_err()
        {
            error!("Cannot delete blobs: blob store worker has stopped");
            return;
        }
        let _ = rx.await;
    }

    /// Queue a delete without waiting for it
    pub fn delete_in_background(&self, ids: Vec<BlobId>) {
        if ids.is_empty() {
            return;
        }
        if self.send(Command::Delete { ids, reply: None }).is_err() {
            error!("Cannot delete blobs: blob store worker has stopped");
        }
    }

    /// Copy an external file in under a previously minted id
    pub async fn import_file(&self, source: &Path, id: &BlobId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Import {
            source: source.to_path_buf(),
            id: id.clone(),
            reply,
        })?;
        rx.await.map_err(|_| StorageError::WorkerStopped)?
    }

    /// Copy every blob file into `destination`, returning how many were copied
    pub async fn copy_all_to(&self, destination: &Path) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::CopyAll {
            destination: destination.to_path_buf(),
            reply,
        })?;
        rx.await.map_err(|_| StorageError::WorkerStopped)?
    }

    /// Remove every blob
    pub async fn delete_all(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::DeleteAll { reply })?;
        rx.await.map_err(|_| StorageError::WorkerStopped)?
    }

    /// All blob ids currently on disk
    pub async fn list_existing_ids(&self) -> Result<HashSet<BlobId>> {
        let mut ids = HashSet::new();
        let mut entries = tokio::fs::read_dir(self.root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(BlobId::from_file_name) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| StorageError::WorkerStopped)
    }
}

struct Worker {
    root: PathBuf,
    options: ImageOptions,
    /// Minted ids with no file yet
    reserved: HashSet<BlobId>,
}

impl Worker {
    fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.blocking_recv() {
            match command {
                Command::Save { image, reply } => {
                    let _ = reply.send(self.save(&image));
                }
                Command::Delete { ids, reply } => {
                    self.delete(&ids);
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                }
                Command::Mint { count, reply } => {
                    let _ = reply.send(self.mint(count));
                }
                Command::Release { ids } => {
                    for id in &ids {
                        self.reserved.remove(id);
                    }
                }
                Command::Import { source, id, reply } => {
                    let _ = reply.send(self.import(&source, &id));
                }
                Command::CopyAll { destination, reply } => {
                    let _ = reply.send(self.copy_all(&destination));
                }
                Command::DeleteAll { reply } => {
                    let _ = reply.send(self.delete_all());
                }
            }
        }
        debug!(root = %self.root.display(), "Blob store worker stopped");
    }

    fn path_for(&self, id: &BlobId) -> PathBuf {
        self.root.join(id.file_name())
    }

    fn mint(&mut self, count: usize) -> Result<Vec<BlobId>> {
        let mut ids = Vec::with_capacity(count);
        while ids.len() < count {
            let id = BlobId::random();
            if self.reserved.contains(&id) || self.path_for(&id).try_exists()? {
                continue;
            }
            self.reserved.insert(id.clone());
            ids.push(id);
        }
        Ok(ids)
    }

    fn save(&mut self, image: &[u8]) -> Option<BlobId> {
        let encoded = match imaging::normalize(image, &self.options) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(error = %e, "Cannot convert image to JPEG");
                return None;
            }
        };

        let id = match self.mint(1) {
            Ok(mut ids) => ids.pop()?,
            Err(e) => {
                error!(error = %e, "Cannot mint blob id");
                return None;
            }
        };

        let path = self.path_for(&id);
        let written = persist_atomically(&path, |file| file.write_all(&encoded));
        self.reserved.remove(&id);

        match written {
            Ok(()) => {
                debug!(blob_id = %id, bytes = encoded.len(), "Saved blob");
                Some(id)
            }
            Err(e) => {
                error!(blob_id = %id, error = %e, "Cannot save blob");
                None
            }
        }
    }

    fn delete(&self, ids: &[BlobId]) {
        for id in ids {
            match fs::remove_file(self.path_for(id)) {
                Ok(()) => debug!(blob_id = %id, "Deleted blob"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(blob_id = %id, "Blob already gone")
                }
                Err(e) => error!(blob_id = %id, error = %e, "Cannot delete blob"),
            }
        }
    }

    fn import(&mut self, source: &Path, id: &BlobId) -> Result<()> {
        let destination = self.path_for(id);
        if destination.try_exists()? {
            return Err(StorageError::BlobExists(id.to_string()));
        }
        if !source.is_file() {
            return Err(StorageError::BlobNotFound(source.display().to_string()));
        }

        persist_atomically(&destination, |file| {
            let mut input = fs::File::open(source)?;
            io::copy(&mut input, file).map(|_| ())
        })?;
        self.reserved.remove(id);

        debug!(blob_id = %id, source = %source.display(), "Imported blob");
        Ok(())
    }

    fn copy_all(&self, destination: &Path) -> Result<usize> {
        fs::create_dir_all(destination)?;

        let mut copied = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            // Skip in-progress temporary files
            if name.to_str().and_then(BlobId::from_file_name).is_none() {
                continue;
            }
            fs::copy(entry.path(), destination.join(&name))?;
            copied += 1;
        }
        Ok(copied)
    }

    fn delete_all(&mut self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        self.reserved.clear();
        info!(root = %self.root.display(), "Deleted all blobs");
        Ok(())
    }
}

/// Write through a hidden temporary file in the same directory, then rename
/// it into place. A crash never leaves a partial file under the final name.
fn persist_atomically(
    destination: &Path,
    fill: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> io::Result<()> {
    let dir = destination.parent().unwrap_or(Path::new("."));
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.tmp", name));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        fill(&mut file)?;
        file.flush()?;
        file.sync_all()?;
        fs::rename(&tmp, destination)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
