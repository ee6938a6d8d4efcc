use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Axis-aligned box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, 0.0 when disjoint or degenerate.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;

        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Optional per-face attributes some embedding sources report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceAttributes {
    pub age: Option<f32>,
    pub gender: Option<String>,
    /// Expression name → probability.
    #[serde(default)]
    pub expressions: BTreeMap<String, f32>,
}

impl FaceAttributes {
    /// The most probable expression, if any were reported.
    pub fn dominant_expression(&self) -> Option<(&str, f32)> {
        self.expressions
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, p)| (name.as_str(), *p))
    }
}

/// A face detected in a single frame. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeFace {
    pub bbox: BoundingBox,
    pub embedding: Vec<f32>,
    pub attributes: Option<FaceAttributes>,
}

/// An enrolled face as stored in the gallery.
///
/// Serialized as `{id, name, descriptor, image}`. The descriptor is read
/// either as a plain array or as an object keyed by index (`{"0": .., "1": ..}`)
/// and always written back as a plain array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: u32,
    pub name: String,
    #[serde(
        rename = "descriptor",
        alias = "embedding",
        deserialize_with = "descriptor::deserialize"
    )]
    pub embedding: Vec<f32>,
    /// Thumbnail reference: a `data:` URL or blob URL.
    #[serde(default)]
    pub image: String,
}

/// A labelled object box from an object detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetection {
    pub bbox: BoundingBox,
    pub class: String,
    pub score: f32,
}

/// Euclidean distance between two embeddings.
///
/// Returns `None` when the lengths differ; callers treat that as a non-match.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    Some(
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f32>()
            .sqrt(),
    )
}

/// Embedding dimension shared by the records of a gallery (that of the first record).
pub fn gallery_dimension(gallery: &[FaceRecord]) -> Option<usize> {
    gallery.first().map(|r| r.embedding.len())
}

/// Lenient descriptor decoding shared by the gallery layout and remote sources.
pub mod descriptor {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use std::collections::BTreeMap;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Dense(Vec<f32>),
        Indexed(BTreeMap<String, f32>),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Wire::deserialize(deserializer)? {
            Wire::Dense(values) => Ok(values),
            Wire::Indexed(map) => from_indexed(map).map_err(D::Error::custom),
        }
    }

    fn from_indexed(map: BTreeMap<String, f32>) -> Result<Vec<f32>, String> {
        let mut pairs = Vec::with_capacity(map.len());
        for (key, value) in map {
            let idx: usize = key
                .parse()
                .map_err(|_| format!("descriptor key {key:?} is not an index"))?;
            pairs.push((idx, value));
        }
        pairs.sort_by_key(|(idx, _)| *idx);

        for (expected, (idx, _)) in pairs.iter().enumerate() {
            if *idx != expected {
                return Err(format!("descriptor index {expected} missing"));
            }
        }
        Ok(pairs.into_iter().map(|(_, v)| v).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let d = euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_length_mismatch() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[0.0]), None);
    }

    #[test]
    fn test_iou_partial() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_record_reads_indexed_descriptor() {
        let json = r#"{"id":3,"name":"Ada","descriptor":{"1":0.5,"0":-0.25,"2":1.0},"image":"blob:x"}"#;
        let record: FaceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.embedding, vec![-0.25, 0.5, 1.0]);
        assert_eq!(record.image, "blob:x");
    }

    #[test]
    fn test_record_rejects_gapped_descriptor() {
        let json = r#"{"id":1,"name":"Ada","descriptor":{"0":0.1,"2":0.3}}"#;
        assert!(serde_json::from_str::<FaceRecord>(json).is_err());
    }

    #[test]
    fn test_record_accepts_embedding_alias() {
        let json = r#"{"id":1,"name":"Ada","embedding":[0.1,0.2]}"#;
        let record: FaceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.embedding, vec![0.1, 0.2]);
        assert!(record.image.is_empty());
    }

    #[test]
    fn test_record_writes_plain_descriptor() {
        let record = FaceRecord {
            id: 1,
            name: "Ada".into(),
            embedding: vec![0.5, 0.25],
            image: String::new(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["descriptor"], serde_json::json!([0.5, 0.25]));
    }

    #[test]
    fn test_dominant_expression() {
        let attrs = FaceAttributes {
            age: Some(30.0),
            gender: Some("female".into()),
            expressions: [("happy".to_string(), 0.8), ("neutral".to_string(), 0.15)]
                .into_iter()
                .collect(),
        };
        assert_eq!(attrs.dominant_expression(), Some(("happy", 0.8)));
    }
}
