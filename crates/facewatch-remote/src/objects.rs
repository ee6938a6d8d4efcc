//! Remote object detector (COCO-SSD style): `[{"bbox": [x, y, w, h], "class": "person", "score": 0.87}]`.

use crate::RemoteError;
use async_trait::async_trait;
use facewatch_core::{BoundingBox, Frame, ObjectDetection, ObjectSource, SourceError};
use image::ImageFormat;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RemoteObject {
    bbox: [f32; 4],
    class: String,
    score: f32,
}

pub(crate) fn parse_objects(body: &str) -> Result<Vec<ObjectDetection>, RemoteError> {
    let objects: Vec<RemoteObject> = serde_json::from_str(body)?;
    Ok(objects
        .into_iter()
        .map(|o| ObjectDetection {
            bbox: BoundingBox::new(o.bbox[0], o.bbox[1], o.bbox[2], o.bbox[3]),
            class: o.class,
            score: o.score,
        })
        .collect())
}

pub struct RemoteObjectSource {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteObjectSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }
}

#[async_trait]
impl ObjectSource for RemoteObjectSource {
    fn name(&self) -> &str {
        "remote"
    }

    async fn detect_objects(&mut self, frame: &Frame) -> Result<Vec<ObjectDetection>, SourceError> {
        let jpeg = frame.encode(ImageFormat::Jpeg)?;
        let body = crate::post(&self.client, &self.endpoint, "image/jpeg", jpeg).await?;
        Ok(parse_objects(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_objects() {
        let body = r#"[{"bbox": [1, 2, 30, 40], "class": "person", "score": 0.87},
                       {"bbox": [5, 5, 10, 10], "class": "cup", "score": 0.6}]"#;
        let objects = parse_objects(body).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].bbox, BoundingBox::new(1.0, 2.0, 30.0, 40.0));
        assert_eq!(objects[1].class, "cup");
    }

    #[test]
    fn test_parse_objects_rejects_short_bbox() {
        let body = r#"[{"bbox": [1, 2, 3], "class": "person", "score": 0.5}]"#;
        assert!(parse_objects(body).is_err());
    }
}
