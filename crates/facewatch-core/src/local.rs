//! In-process embedding source: SCRFD detection followed by ArcFace embedding.

use crate::detector::FaceDetector;
use crate::frame::Frame;
use crate::recognizer::FaceEmbedder;
use crate::source::{EmbeddingSource, SourceError};
use crate::types::ProbeFace;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const EMBEDDER_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/facewatch/models`, falling back to `~/.local/share/facewatch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facewatch/models")
}

/// Local ONNX models. Inference runs inline on the caller's thread.
pub struct OnnxFaceSource {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl OnnxFaceSource {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, SourceError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))
            .map_err(|e| SourceError::Model(e.to_string()))?;
        let embedder = FaceEmbedder::load(&model_dir.join(EMBEDDER_MODEL_FILE))
            .map_err(|e| SourceError::Model(e.to_string()))?;
        Ok(Self { detector, embedder })
    }
}

#[async_trait]
impl EmbeddingSource for OnnxFaceSource {
    fn name(&self) -> &str {
        "onnx"
    }

    async fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<ProbeFace>, SourceError> {
        let boxes = self
            .detector
            .detect(&frame.image)
            .map_err(|e| SourceError::Model(e.to_string()))?;

        let mut faces = Vec::with_capacity(boxes.len());
        for scored in boxes {
            match self.embedder.embed(&frame.image, &scored.bbox) {
                Ok(embedding) => faces.push(ProbeFace { bbox: scored.bbox, embedding, attributes: None }),
                // A face at the frame edge can crop to nothing; skip it, keep the rest.
                Err(crate::recognizer::RecognizerError::EmptyCrop) => {
                    tracing::debug!(bbox = ?scored.bbox, "face crop empty; skipped");
                }
                Err(e) => return Err(SourceError::Model(e.to_string())),
            }
        }
        tracing::trace!(seq = frame.sequence, faces = faces.len(), "onnx detection done");
        Ok(faces)
    }
}
