//! Staged image edits for one record
//!
//! An [`EditSession`] lets an edit screen add, remove and reorder a record's
//! images while nothing durable changes for the rest of the app. Images added
//! during the session are written right away (so they can be displayed) but
//! baseline images are only deleted once the session commits. Aborting
//! deletes what the session added and leaves the baseline untouched.
//!
//! Resolution is a plain set difference, which is only sound because blob ids
//! are never reused and adds never overwrite an existing blob.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use stash_core::BlobId;
use stash_storage::BlobStore;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Committed,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Open => write!(f, "open"),
            SessionState::Committed => write!(f, "committed"),
            SessionState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Handle to an edit session. Clones share the same session, so concurrent
/// `add` calls can run from several tasks.
#[derive(Clone)]
pub struct EditSession {
    inner: Arc<Inner>,
}

struct Inner {
    store: BlobStore,
    baseline: Vec<BlobId>,
    baseline_set: HashSet<BlobId>,
    current: watch::Sender<Vec<BlobId>>,
    pending: watch::Sender<usize>,
    state: watch::Sender<SessionState>,
}

impl EditSession {
    /// Start a session over the ids the record currently references. No disk
    /// I/O happens here.
    pub fn open(store: BlobStore, baseline: Vec<BlobId>) -> Self {
        let baseline_set = baseline.iter().cloned().collect();
        let (current, _) = watch::channel(baseline.clone());
        let (pending, _) = watch::channel(0);
        let (state, _) = watch::channel(SessionState::Open);

        Self {
            inner: Arc::new(Inner {
                store,
                baseline,
                baseline_set,
                current,
                pending,
                state,
            }),
        }
    }

    pub fn baseline(&self) -> &[BlobId] {
        &self.inner.baseline
    }

    /// Snapshot of the working id list, in display order
    pub fn current(&self) -> Vec<BlobId> {
        self.inner.current.borrow().clone()
    }

    /// Number of adds still waiting for the blob store
    pub fn pending(&self) -> usize {
        *self.inner.pending.borrow()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_current(&self) -> watch::Receiver<Vec<BlobId>> {
        self.inner.current.subscribe()
    }

    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.inner.pending.subscribe()
    }

    /// Save an image and append its id. `Ok(None)` means the store could not
    /// produce a blob and the session is unchanged.
    pub async fn add(&self, image: Vec<u8>) -> Result<Option<BlobId>, SessionError> {
        let _pending = self.begin_operation()?;

        let saved = self.inner.store.save(image).await;
        if let Some(id) = &saved {
            self.inner.current.send_modify(|ids| ids.push(id.clone()));
        }
        Ok(saved)
    }

    /// Drop an id from the working list. Baseline blobs stay on disk until
    /// commit; blobs added in this session are deleted right away. Returns
    /// whether the id was present.
    pub fn remove(&self, id: &BlobId) -> Result<bool, SessionError> {
        self.ensure_open()?;

        let removed = self.inner.current.send_if_modified(|ids| {
            match ids.iter().position(|current| current == id) {
                Some(index) => {
                    ids.remove(index);
                    true
                }
                None => false,
            }
        });

        if removed && !self.inner.baseline_set.contains(id) {
            self.inner.store.delete_in_background(vec![id.clone()]);
        }
        Ok(removed)
    }

    /// Add `image` and remove `old`. The new id lands at the end of the list.
    pub async fn replace(
        &self,
        old: &BlobId,
        image: Vec<u8>,
    ) -> Result<Option<BlobId>, SessionError> {
        let added = self.add(image).await?;
        if added.is_some() {
            self.remove(old)?;
        }
        Ok(added)
    }

    /// Move the images at `from_indexes` so they end up before the image that
    /// was at `to_index` (`to_index == len` moves them to the end).
    pub fn reorder(&self, from_indexes: &[usize], to_index: usize) -> Result<(), SessionError> {
        self.ensure_open()?;

        let mut outcome = Ok(());
        self.inner.current.send_if_modified(|ids| {
            match move_indexes(ids, from_indexes, to_index) {
                Ok(()) => true,
                Err(err) => {
                    outcome = Err(err);
                    false
                }
            }
        });
        outcome
    }

    /// Keep the working list. Baseline blobs no longer in it are deleted and
    /// the final list is returned for the caller to store on its record.
    pub async fn commit(&self) -> Result<Vec<BlobId>, SessionError> {
        self.close(SessionState::Committed)?;
        self.wait_idle().await;

        let current = self.current();
        let kept: HashSet<&BlobId> = current.iter().collect();
        let dropped: Vec<BlobId> = self
            .inner
            .baseline
            .iter()
            .filter(|id| !kept.contains(id))
            .cloned()
            .collect();

        debug!(kept = current.len(), deleted = dropped.len(), "Committing edit session");
        self.inner.store.delete(dropped).await;
        Ok(current)
    }

    /// Discard the session. Blobs added in it are deleted; the baseline stays.
    pub async fn abort(&self) -> Result<(), SessionError> {
        self.close(SessionState::Aborted)?;
        self.wait_idle().await;

        let added: Vec<BlobId> = self
            .current()
            .into_iter()
            .filter(|id| !self.inner.baseline_set.contains(id))
            .collect();

        debug!(deleted = added.len(), "Aborting edit session");
        self.inner.store.delete(added).await;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Open => Ok(()),
            state => Err(SessionError::Closed(state)),
        }
    }

    /// Count an operation as pending. The state is read-locked while the
    /// counter moves so a concurrent commit either sees the increment or
    /// rejects the operation.
    fn begin_operation(&self) -> Result<PendingGuard<'_>, SessionError> {
        let state = self.inner.state.borrow();
        if *state != SessionState::Open {
            return Err(SessionError::Closed(*state));
        }
        self.inner.pending.send_modify(|n| *n += 1);
        Ok(PendingGuard {
            pending: &self.inner.pending,
        })
    }

    fn close(&self, to: SessionState) -> Result<(), SessionError> {
        let mut previous = SessionState::Open;
        let closed = self.inner.state.send_if_modified(|state| {
            previous = *state;
            if *state == SessionState::Open {
                *state = to;
                true
            } else {
                false
            }
        });

        if closed {
            Ok(())
        } else {
            Err(SessionError::Closed(previous))
        }
    }

    async fn wait_idle(&self) {
        let mut pending = self.inner.pending.subscribe();
        // The sender lives in `self`, so this only returns once idle.
        let _ = pending.wait_for(|n| *n == 0).await;
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if *self.state.borrow() == SessionState::Open {
            warn!("Edit session dropped without commit or abort");
        }
    }
}

/// Decrements the pending counter when an operation ends, including when its
/// future is dropped.
struct PendingGuard<'a> {
    pending: &'a watch::Sender<usize>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// List move with the semantics of a drag-and-drop reorder: `to` is an index
/// into the list before anything moved.
fn move_indexes<T>(items: &mut Vec<T>, from: &[usize], to: usize) -> Result<(), SessionError> {
    let len = items.len();
    if to > len {
        return Err(SessionError::InvalidIndex { index: to, len });
    }
    if let Some(&index) = from.iter().find(|&&index| index >= len) {
        return Err(SessionError::InvalidIndex { index, len });
    }

    let mut from = from.to_vec();
    from.sort_unstable();
    from.dedup();

    let target = to - from.iter().filter(|&&index| index < to).count();

    let mut moved = Vec::with_capacity(from.len());
    let mut kept = Vec::with_capacity(len - from.len());
    for (index, item) in items.drain(..).enumerate() {
        if from.binary_search(&index).is_ok() {
            moved.push(item);
        } else {
            kept.push(item);
        }
    }

    kept.splice(target..target, moved);
    *items = kept;
    Ok(())
}
