//! Enrollment: turning a live capture plus a name into a gallery record.

use crate::frame::Frame;
use crate::gallery::{GalleryError, GalleryStore};
use crate::matcher::{FirstUnderThreshold, Matcher};
use crate::thumbnail::{self, ThumbnailError};
use crate::types::{gallery_dimension, FaceRecord, ProbeFace};
use serde::Serialize;
use thiserror::Error;

/// Distance under which a capture is treated as a re-enrollment of an existing face.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Gallery size at which capture stops and the gallery is ready to submit.
pub const DEFAULT_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrollOptions {
    pub similarity_threshold: f32,
    pub capacity: usize,
}

impl Default for EnrollOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("a name is required to enroll a face")]
    NameRequired,
    #[error("captured face has no embedding")]
    EmptyEmbedding,
    #[error("embedding has {actual} dimensions, gallery uses {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("no face detected in the current frame")]
    NoFaceDetected,
    #[error("thumbnail: {0}")]
    Thumbnail(#[from] ThumbnailError),
    #[error("gallery: {0}")]
    Gallery(#[from] GalleryError),
}

/// What an accepted enrollment did to the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnrollmentResult {
    Inserted { id: u32 },
    /// An existing record was close enough and was overwritten in place.
    Replaced { id: u32, index: usize, previous_name: String },
}

pub fn validate_name(name: &str) -> Result<(), EnrollError> {
    if name.trim().is_empty() {
        return Err(EnrollError::NameRequired);
    }
    Ok(())
}

/// Insert a new record, or overwrite the first record within
/// `options.similarity_threshold` of the probe.
///
/// Capacity is not checked here; see [`EnrollmentWorkflow`]. A replaced record
/// keeps its id. The scan and the write happen under the store lock, and the
/// gallery is persisted before this returns.
pub fn enroll(
    store: &GalleryStore,
    name: &str,
    probe: &ProbeFace,
    image: String,
    options: &EnrollOptions,
) -> Result<EnrollmentResult, EnrollError> {
    validate_name(name)?;
    if probe.embedding.is_empty() {
        return Err(EnrollError::EmptyEmbedding);
    }

    let result = store.modify(|txn| {
        if let Some(expected) = gallery_dimension(txn.records()) {
            if expected != probe.embedding.len() {
                return Err(EnrollError::DimensionMismatch {
                    expected,
                    actual: probe.embedding.len(),
                });
            }
        }

        let similar =
            FirstUnderThreshold.find(&probe.embedding, txn.records(), options.similarity_threshold);

        match similar {
            Some(m) => {
                let existing = &txn.records()[m.index];
                let id = existing.id;
                let previous_name = existing.name.clone();
                txn.replace(
                    m.index,
                    FaceRecord { id, name: name.to_string(), embedding: probe.embedding.clone(), image },
                )?;
                Ok(EnrollmentResult::Replaced { id, index: m.index, previous_name })
            }
            None => {
                let id = txn.allocate_id();
                txn.push(FaceRecord { id, name: name.to_string(), embedding: probe.embedding.clone(), image });
                Ok(EnrollmentResult::Inserted { id })
            }
        }
    })??;

    match &result {
        EnrollmentResult::Inserted { id } => tracing::info!(id, name, "face enrolled"),
        EnrollmentResult::Replaced { id, previous_name, .. } => {
            tracing::info!(id, name, previous = %previous_name, "same face exists; record replaced")
        }
    }
    Ok(result)
}

/// Where the capture workflow stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    Capturing { enrolled: usize, capacity: usize },
    /// The gallery is full; capture is closed until a face is deleted.
    ReadyToSubmit { enrolled: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CaptureOutcome {
    Enrolled(EnrollmentResult),
    ReadyToSubmit(WorkflowState),
}

/// Capture workflow around [`enroll`]: enforces the gallery capacity and builds
/// the record thumbnail from the frame.
#[derive(Debug, Clone, Copy)]
pub struct EnrollmentWorkflow {
    options: EnrollOptions,
}

impl EnrollmentWorkflow {
    pub fn new(options: EnrollOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EnrollOptions {
        &self.options
    }

    pub fn state(&self, store: &GalleryStore) -> WorkflowState {
        let enrolled = store.len();
        if enrolled >= self.options.capacity {
            WorkflowState::ReadyToSubmit { enrolled }
        } else {
            WorkflowState::Capturing { enrolled, capacity: self.options.capacity }
        }
    }

    /// Enroll the first face detected in `frame` under `name`.
    ///
    /// Once the gallery has reached capacity this reports `ReadyToSubmit` and
    /// never calls [`enroll`].
    pub fn capture(
        &self,
        store: &GalleryStore,
        name: &str,
        frame: &Frame,
        faces: &[ProbeFace],
    ) -> Result<CaptureOutcome, EnrollError> {
        let state = self.state(store);
        if let WorkflowState::ReadyToSubmit { .. } = state {
            tracing::info!(?state, "gallery at capacity; capture skipped");
            return Ok(CaptureOutcome::ReadyToSubmit(state));
        }
        validate_name(name)?;

        let face = faces.first().ok_or(EnrollError::NoFaceDetected)?;
        if faces.len() > 1 {
            tracing::debug!(faces = faces.len(), "several faces in frame; enrolling the first");
        }
        let image = thumbnail::face_data_url(&frame.image, &face.bbox)?;
        enroll(store, name, face, image, &self.options).map(CaptureOutcome::Enrolled)
    }
}
