//! Remote face detection + descriptor endpoint.
//!
//! The frame is POSTed as `image/jpeg`; the response is an array of
//! detections in the face-api.js layout:
//!
//! ```json
//! [{"detection": {"box": {"x": 10, "y": 20, "width": 64, "height": 80}},
//!   "descriptor": [0.01, ...], "age": 31.2, "gender": "female",
//!   "expressions": {"happy": 0.93, "neutral": 0.05}}]
//! ```

use crate::RemoteError;
use async_trait::async_trait;
use facewatch_core::types::descriptor;
use facewatch_core::{BoundingBox, EmbeddingSource, FaceAttributes, Frame, ProbeFace, SourceError};
use image::ImageFormat;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct RemoteFace {
    detection: RemoteDetection,
    #[serde(deserialize_with = "descriptor::deserialize")]
    descriptor: Vec<f32>,
    #[serde(default)]
    age: Option<f32>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    expressions: BTreeMap<String, f32>,
}

#[derive(Debug, Deserialize)]
struct RemoteDetection {
    #[serde(rename = "box")]
    bbox: BoundingBox,
}

impl From<RemoteFace> for ProbeFace {
    fn from(face: RemoteFace) -> Self {
        let has_attributes = face.age.is_some() || face.gender.is_some() || !face.expressions.is_empty();
        let attributes = has_attributes.then(|| FaceAttributes {
            age: face.age,
            gender: face.gender,
            expressions: face.expressions,
        });
        ProbeFace { bbox: face.detection.bbox, embedding: face.descriptor, attributes }
    }
}

pub(crate) fn parse_faces(body: &str) -> Result<Vec<ProbeFace>, RemoteError> {
    let faces: Vec<RemoteFace> = serde_json::from_str(body)?;
    Ok(faces.into_iter().map(ProbeFace::from).collect())
}

pub struct RemoteFaceSource {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteFaceSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }
}

#[async_trait]
impl EmbeddingSource for RemoteFaceSource {
    fn name(&self) -> &str {
        "remote"
    }

    async fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<ProbeFace>, SourceError> {
        let jpeg = frame.encode(ImageFormat::Jpeg)?;
        let body = crate::post(&self.client, &self.endpoint, "image/jpeg", jpeg).await?;
        let faces = parse_faces(&body)?;
        tracing::trace!(seq = frame.sequence, faces = faces.len(), endpoint = %self.endpoint, "remote faces");
        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_detection() {
        let body = r#"[{
            "detection": {"box": {"x": 10, "y": 20, "width": 64, "height": 80}, "score": 0.98},
            "descriptor": [0.1, 0.2, 0.3],
            "age": 31.5,
            "gender": "female",
            "genderProbability": 0.97,
            "expressions": {"happy": 0.9, "neutral": 0.1}
        }]"#;
        let faces = parse_faces(body).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].bbox, BoundingBox::new(10.0, 20.0, 64.0, 80.0));
        assert_eq!(faces[0].embedding, vec![0.1, 0.2, 0.3]);
        let attrs = faces[0].attributes.as_ref().unwrap();
        assert_eq!(attrs.gender.as_deref(), Some("female"));
        assert_eq!(attrs.dominant_expression().map(|(k, _)| k), Some("happy"));
    }

    #[test]
    fn test_parse_indexed_descriptor_without_attributes() {
        let body = r#"[{"detection": {"box": {"x": 0, "y": 0, "width": 1, "height": 1}},
                        "descriptor": {"0": 0.5, "1": 0.25}}]"#;
        let faces = parse_faces(body).unwrap();
        assert_eq!(faces[0].embedding, vec![0.5, 0.25]);
        assert!(faces[0].attributes.is_none());
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert!(parse_faces("[]").unwrap().is_empty());
        assert!(matches!(parse_faces(r#"{"error": "busy"}"#), Err(RemoteError::Malformed(_))));
    }
}
