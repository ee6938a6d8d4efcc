//! The face gallery: the ordered, persisted collection of enrolled faces.
//!
//! [`GalleryStore`] is the only owner of the gallery. Readers get whole
//! snapshots; every mutation is written through to the backend before the
//! mutator returns.

use crate::backend::{BackendError, KvBackend};
use crate::types::{gallery_dimension, FaceRecord};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Entry name the gallery is stored under unless configured otherwise.
pub const DEFAULT_GALLERY_KEY: &str = "trainedFaces";

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("persist gallery: {0}")]
    Backend(#[from] BackendError),
    #[error("serialize gallery: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("index {index} out of range for gallery of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("face id {0} already exists")]
    DuplicateId(u32),
}

/// How new record ids are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPolicy {
    /// Durable counter stored next to the gallery; ids are never reused.
    #[default]
    Counter,
    /// `gallery length + 1`. Can reissue an id after a deletion.
    GalleryLength,
}

impl FromStr for IdPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counter" => Ok(IdPolicy::Counter),
            "gallery_length" | "length" => Ok(IdPolicy::GalleryLength),
            other => Err(format!("unknown id policy {other:?} (expected counter or gallery_length)")),
        }
    }
}

/// Asks the operator to confirm a destructive action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Outcome of [`GalleryStore::remove_by_id`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoveOutcome {
    Removed(FaceRecord),
    /// The operator declined; the gallery is unchanged.
    Cancelled,
    NotFound,
}

struct State {
    records: Arc<[FaceRecord]>,
    next_id: u32,
}

/// Owner of the persisted gallery.
pub struct GalleryStore {
    backend: Box<dyn KvBackend>,
    key: String,
    id_policy: IdPolicy,
    state: Mutex<State>,
}

impl GalleryStore {
    /// Open the gallery stored under `key`, loading whatever is persisted.
    pub fn open(backend: Box<dyn KvBackend>, key: impl Into<String>, id_policy: IdPolicy) -> Self {
        let mut store = Self {
            backend,
            key: key.into(),
            id_policy,
            state: Mutex::new(State { records: Arc::from(Vec::new()), next_id: 1 }),
        };
        let records = store.load();
        let next_id = store.initial_next_id(&records);
        *store.state.get_mut().unwrap_or_else(|e| e.into_inner()) = State {
            records: Arc::from(records),
            next_id,
        };
        store
    }

    /// Read the persisted gallery.
    ///
    /// Missing or malformed data yields an empty gallery; the failure is logged,
    /// never returned.
    pub fn load(&self) -> Vec<FaceRecord> {
        let raw = match self.backend.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "gallery read failed; starting empty");
                return Vec::new();
            }
        };

        let records = match serde_json::from_str::<Option<Vec<FaceRecord>>>(&raw) {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "stored gallery is malformed; starting empty");
                return Vec::new();
            }
        };

        if let Some(dim) = gallery_dimension(&records) {
            if records.iter().any(|r| r.embedding.len() != dim) {
                tracing::warn!(key = %self.key, dim, "stored gallery mixes embedding dimensions");
            }
        }
        tracing::info!(key = %self.key, faces = records.len(), "gallery loaded");
        records
    }

    /// Replace the in-memory gallery with what the backend currently holds.
    pub fn reload(&self) {
        let records = self.load();
        let next_id = self.initial_next_id(&records);
        let mut state = self.lock();
        state.records = Arc::from(records);
        state.next_id = next_id;
    }

    /// The gallery as of now. Later mutations do not affect the returned value.
    pub fn snapshot(&self) -> Arc<[FaceRecord]> {
        Arc::clone(&self.lock().records)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn id_policy(&self) -> IdPolicy {
        self.id_policy
    }

    /// Append a caller-built record.
    pub fn append(&self, record: FaceRecord) -> Result<(), GalleryError> {
        self.modify(|txn| {
            if txn.records().iter().any(|r| r.id == record.id) {
                return Err(GalleryError::DuplicateId(record.id));
            }
            txn.note_id(record.id);
            txn.push(record);
            Ok(())
        })?
    }

    /// Overwrite the record at `index` in place.
    pub fn replace_at(&self, index: usize, record: FaceRecord) -> Result<(), GalleryError> {
        self.modify(|txn| txn.replace(index, record))?
    }

    /// Remove the record with `id` after the operator confirms.
    ///
    /// No prompt is shown for an unknown id. The store lock is not held while
    /// waiting on the operator.
    pub fn remove_by_id(&self, id: u32, confirm: &dyn Confirm) -> Result<RemoveOutcome, GalleryError> {
        if !self.lock().records.iter().any(|r| r.id == id) {
            tracing::info!(id, "face not found; nothing to delete");
            return Ok(RemoveOutcome::NotFound);
        }

        if !confirm.confirm(&format!("Are you sure you want to delete the face with ID {id}?")) {
            tracing::info!(id, "deletion cancelled");
            return Ok(RemoveOutcome::Cancelled);
        }

        let removed = self.modify(|txn| {
            let index = txn.records().iter().position(|r| r.id == id)?;
            Some(txn.remove(index))
        })?;

        match removed {
            Some(record) => {
                tracing::info!(id, name = %record.name, "face removed");
                Ok(RemoveOutcome::Removed(record))
            }
            // Deleted by someone else while the prompt was open.
            None => Ok(RemoveOutcome::NotFound),
        }
    }

    /// Run `f` against a working copy of the gallery under the store lock.
    ///
    /// If `f` changed anything the whole gallery is persisted before the new
    /// state becomes visible; on a persistence error nothing changes.
    pub fn modify<T>(&self, f: impl FnOnce(&mut GalleryTxn) -> T) -> Result<T, GalleryError> {
        let mut state = self.lock();
        let mut txn = GalleryTxn {
            records: state.records.to_vec(),
            next_id: state.next_id,
            id_policy: self.id_policy,
            dirty: false,
        };
        let out = f(&mut txn);

        if txn.dirty {
            self.persist(&txn.records, txn.next_id)?;
            state.records = Arc::from(txn.records);
            state.next_id = txn.next_id;
        }
        Ok(out)
    }

    // Counter before gallery: a failed gallery write then only skips an id.
    fn persist(&self, records: &[FaceRecord], next_id: u32) -> Result<(), GalleryError> {
        let json = serde_json::to_string(records)?;
        if self.id_policy == IdPolicy::Counter {
            self.backend.set(&self.counter_key(), &next_id.to_string())?;
        }
        self.backend.set(&self.key, &json)?;
        tracing::debug!(key = %self.key, faces = records.len(), "gallery persisted");
        Ok(())
    }

    fn counter_key(&self) -> String {
        format!("{}.next_id", self.key)
    }

    fn initial_next_id(&self, records: &[FaceRecord]) -> u32 {
        let after_max = records.iter().map(|r| r.id).max().map_or(1, |m| m.saturating_add(1));
        let stored = match self.backend.get(&self.counter_key()) {
            Ok(Some(raw)) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "stored id counter is malformed; ignoring");
                1
            }),
            Ok(None) => 1,
            Err(e) => {
                tracing::warn!(error = %e, "id counter read failed; ignoring");
                1
            }
        };
        after_max.max(stored).max(1)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn length_id(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX).saturating_add(1)
}

/// Working copy handed to [`GalleryStore::modify`].
pub struct GalleryTxn {
    records: Vec<FaceRecord>,
    next_id: u32,
    id_policy: IdPolicy,
    dirty: bool,
}

impl GalleryTxn {
    pub fn records(&self) -> &[FaceRecord] {
        &self.records
    }

    /// Id for a record about to be appended.
    pub fn allocate_id(&mut self) -> u32 {
        match self.id_policy {
            IdPolicy::Counter => {
                let id = self.next_id;
                self.next_id = self.next_id.saturating_add(1);
                id
            }
            IdPolicy::GalleryLength => {
                let id = length_id(self.records.len());
                if self.records.iter().any(|r| r.id == id) {
                    tracing::warn!(id, "length-derived id collides with an existing face");
                }
                id
            }
        }
    }

    pub fn push(&mut self, record: FaceRecord) {
        self.records.push(record);
        self.dirty = true;
    }

    pub fn replace(&mut self, index: usize, record: FaceRecord) -> Result<(), GalleryError> {
        let len = self.records.len();
        let slot = self
            .records
            .get_mut(index)
            .ok_or(GalleryError::IndexOutOfRange { index, len })?;
        *slot = record;
        self.dirty = true;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> FaceRecord {
        self.dirty = true;
        self.records.remove(index)
    }

    // Keep the counter ahead of externally chosen ids.
    fn note_id(&mut self, id: u32) {
        self.next_id = self.next_id.max(id.saturating_add(1));
    }
}
