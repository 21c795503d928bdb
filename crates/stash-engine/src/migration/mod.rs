//! Export and import of the whole inventory
//!
//! [`Migrator`] runs each operation as one background task. At most one
//! export and one import run at a time, since each works in a staging
//! directory with a fixed name. Progress is published through watch channels
//! so a UI can render it.

mod export;
mod import;
pub mod remap;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use stash_storage::{BlobStore, Storage};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{MigrationError, Result};

pub use remap::RemapTable;

/// Directories used by export and import
#[derive(Debug, Clone)]
pub struct MigrationPaths {
    /// Staging directory filled before zipping
    pub export_dir: PathBuf,
    /// Staging directory an archive is unpacked into
    pub import_dir: PathBuf,
    /// Where finished `export_<timestamp>.zip` files are written
    pub archives_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExportStatus {
    #[default]
    Idle,
    Running,
    Finished(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImportStatus {
    #[default]
    Idle,
    Running,
    Succeeded(ImportSummary),
    Failed(String),
}

/// What an import created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub locations: usize,
    pub boxes: usize,
    pub items: usize,
    pub images: usize,
    /// Highest box code after the import, if any box exists
    pub last_box_code: Option<i64>,
}

#[derive(Clone)]
pub struct Migrator {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Storage,
    store: BlobStore,
    paths: MigrationPaths,
    export_status: watch::Sender<ExportStatus>,
    import_status: watch::Sender<ImportStatus>,
    export_task: Mutex<Option<RunningExport>>,
}

struct RunningExport {
    handle: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
}

impl Migrator {
    pub fn new(storage: Storage, store: BlobStore, paths: MigrationPaths) -> Self {
        let (export_status, _) = watch::channel(ExportStatus::Idle);
        let (import_status, _) = watch::channel(ImportStatus::Idle);

        Self {
            inner: Arc::new(Inner {
                storage,
                store,
                paths,
                export_status,
                import_status,
                export_task: Mutex::new(None),
            }),
        }
    }

    pub fn paths(&self) -> &MigrationPaths {
        &self.inner.paths
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Start an export in the background. Fails with `Busy` while another
    /// export is running.
    pub fn start_export(&self) -> Result<()> {
        if !claim(&self.inner.export_status, ExportStatus::Running, |s| {
            *s == ExportStatus::Running
        }) {
            return Err(MigrationError::Busy("export"));
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&self.inner);
        let flag = Arc::clone(&cancel);
        let handle = tokio::spawn(async move {
            let result = export::run(&inner.storage, &inner.store, &inner.paths, flag).await;
            let status = match result {
                Ok(archive) => ExportStatus::Finished(archive),
                Err(err) => {
                    if !matches!(err, MigrationError::Cancelled) {
                        error!(error = %err, "Export failed");
                    }
                    if let Err(cleanup) = export::discard_artifacts(&inner.paths).await {
                        warn!(error = %cleanup, "Cannot clean up after failed export");
                    }
                    ExportStatus::Failed(err.to_string())
                }
            };
            inner.export_status.send_replace(status);
        });

        *lock(&self.inner.export_task) = Some(RunningExport { handle, cancel });
        Ok(())
    }

    pub fn export_status(&self) -> ExportStatus {
        self.inner.export_status.borrow().clone()
    }

    pub fn subscribe_export(&self) -> watch::Receiver<ExportStatus> {
        self.inner.export_status.subscribe()
    }

    /// Wait until no export is running and return its outcome
    pub async fn export_result(&self) -> ExportStatus {
        let mut status = self.subscribe_export();
        let outcome = match status.wait_for(|s| *s != ExportStatus::Running).await {
            Ok(current) => current.clone(),
            Err(_) => self.export_status(),
        };
        outcome
    }

    /// Stop a running export and discard whatever it produced. An export
    /// that already finished is treated as done and its archive discarded.
    pub async fn cancel_export(&self) -> Result<()> {
        let running = lock(&self.inner.export_task).take();
        if let Some(RunningExport { handle, cancel }) = running {
            cancel.store(true, Ordering::SeqCst);
            if let Err(err) = handle.await {
                warn!(error = %err, "Export task did not stop cleanly");
            }
            info!("Export cancelled");
        }
        self.discard_export_artifacts().await
    }

    /// Remove the staging directory and any exported archive. Safe to call
    /// when nothing is pending.
    pub async fn discard_export_artifacts(&self) -> Result<()> {
        if self.export_status() == ExportStatus::Running {
            return Err(MigrationError::Busy("export"));
        }
        let removed = export::discard_artifacts(&self.inner.paths).await?;
        if removed > 0 {
            info!(removed, "Discarded export archives");
        }
        self.inner.export_status.send_replace(ExportStatus::Idle);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Import
    // ------------------------------------------------------------------

    /// Start importing `archive` in the background. Fails with `Busy` while
    /// another import is running. Imports cannot be cancelled.
    pub fn start_import(&self, archive: impl Into<PathBuf>) -> Result<()> {
        if !claim(&self.inner.import_status, ImportStatus::Running, |s| {
            *s == ImportStatus::Running
        }) {
            return Err(MigrationError::Busy("import"));
        }

        let archive = archive.into();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = import::run(&inner.storage, &inner.store, &inner.paths, &archive).await;
            let status = match result {
                Ok(summary) => ImportStatus::Succeeded(summary),
                Err(err) => {
                    error!(archive = %archive.display(), error = %err, "Import failed");
                    ImportStatus::Failed(err.to_string())
                }
            };
            inner.import_status.send_replace(status);
        });
        Ok(())
    }

    pub fn import_status(&self) -> ImportStatus {
        self.inner.import_status.borrow().clone()
    }

    pub fn subscribe_import(&self) -> watch::Receiver<ImportStatus> {
        self.inner.import_status.subscribe()
    }

    /// Wait until no import is running and return its outcome
    pub async fn import_result(&self) -> ImportStatus {
        let mut status = self.subscribe_import();
        let outcome = match status.wait_for(|s| *s != ImportStatus::Running).await {
            Ok(current) => current.clone(),
            Err(_) => self.import_status(),
        };
        outcome
    }
}

/// Atomically move `status` to `next` unless `busy` holds for it. Returns
/// whether the claim succeeded.
fn claim<T>(status: &watch::Sender<T>, next: T, busy: impl FnOnce(&T) -> bool) -> bool {
    status.send_if_modified(|current| {
        if busy(current) {
            false
        } else {
            *current = next;
            true
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) async fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
