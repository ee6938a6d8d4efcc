//! What the live loop publishes for display: labelled face boxes and object boxes.

use facewatch_core::{BoundingBox, Identity, ObjectDetection, ProbeFace};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceAnnotation {
    pub bbox: BoundingBox,
    /// Enrolled name or `"Unknown"`.
    pub label: String,
    pub face_id: Option<u32>,
    pub distance: Option<f32>,
    pub age: Option<f32>,
    pub gender: Option<String>,
    /// Most likely expression, when the source reports expressions.
    pub expression: Option<String>,
}

impl FaceAnnotation {
    pub fn new(probe: &ProbeFace, identity: &Identity) -> Self {
        let (face_id, distance) = match identity {
            Identity::Known { id, distance, .. } => (Some(*id), Some(*distance)),
            Identity::Unknown => (None, None),
        };
        let attrs = probe.attributes.as_ref();
        Self {
            bbox: probe.bbox,
            label: identity.label().to_string(),
            face_id,
            distance,
            age: attrs.and_then(|a| a.age),
            gender: attrs.and_then(|a| a.gender.clone()),
            expression: attrs.and_then(|a| a.dominant_expression()).map(|(name, _)| name.to_string()),
        }
    }
}

/// Latest results of the face and object loops. Each half carries the
/// sequence number of the frame it was computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Annotations {
    pub face_frame: Option<u64>,
    pub faces: Vec<FaceAnnotation>,
    pub object_frame: Option<u64>,
    pub objects: Vec<ObjectDetection>,
    pub object_counts: BTreeMap<String, usize>,
}

pub fn count_by_class(objects: &[ObjectDetection]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for object in objects {
        *counts.entry(object.class.clone()).or_insert(0) += 1;
    }
    counts
}
