//! Capability traits for the external models that find faces and objects.

use crate::frame::Frame;
use crate::types::{ObjectDetection, ProbeFace};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("model: {0}")]
    Model(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Finds faces in a frame and produces an embedding for each.
///
/// Calls may suspend (remote round trip, model computation). A failed call
/// only affects the frame it was given.
#[async_trait]
pub trait EmbeddingSource: Send {
    /// Short name for logs and status.
    fn name(&self) -> &str;

    async fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<ProbeFace>, SourceError>;
}

/// Finds labelled objects in a frame.
#[async_trait]
pub trait ObjectSource: Send {
    fn name(&self) -> &str;

    async fn detect_objects(&mut self, frame: &Frame) -> Result<Vec<ObjectDetection>, SourceError>;
}

/// Deterministic source that reports the same faces for every frame.
#[derive(Debug, Clone, Default)]
pub struct FixedSource {
    faces: Vec<ProbeFace>,
    calls: usize,
}

impl FixedSource {
    pub fn new(faces: Vec<ProbeFace>) -> Self {
        Self { faces, calls: 0 }
    }

    /// Number of frames processed so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

#[async_trait]
impl EmbeddingSource for FixedSource {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn detect_faces(&mut self, _frame: &Frame) -> Result<Vec<ProbeFace>, SourceError> {
        self.calls += 1;
        Ok(self.faces.clone())
    }
}

/// Deterministic object source.
#[derive(Debug, Clone, Default)]
pub struct FixedObjects {
    objects: Vec<ObjectDetection>,
}

impl FixedObjects {
    pub fn new(objects: Vec<ObjectDetection>) -> Self {
        Self { objects }
    }
}

#[async_trait]
impl ObjectSource for FixedObjects {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn detect_objects(&mut self, _frame: &Frame) -> Result<Vec<ObjectDetection>, SourceError> {
        Ok(self.objects.clone())
    }
}
