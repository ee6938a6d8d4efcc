use crate::types::{euclidean_distance, FaceRecord, ProbeFace};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Label reported for faces that match no gallery record.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Euclidean distance under which a live face is labelled with a gallery name.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// A gallery record selected by a [`Matcher`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Position of the record in the gallery.
    pub index: usize,
    pub distance: f32,
}

/// Strategy for picking a gallery record for a probe embedding.
///
/// Implementations must skip records whose embedding length differs from the
/// probe and must return `None` for an empty probe.
pub trait Matcher: Send + Sync {
    fn find(&self, probe: &[f32], gallery: &[FaceRecord], threshold: f32) -> Option<Match>;
}

/// Scans in insertion order and takes the first record strictly under the threshold,
/// even when a later record is closer.
pub struct FirstUnderThreshold;

impl Matcher for FirstUnderThreshold {
    fn find(&self, probe: &[f32], gallery: &[FaceRecord], threshold: f32) -> Option<Match> {
        if probe.is_empty() {
            return None;
        }
        gallery.iter().enumerate().find_map(|(index, record)| {
            let distance = euclidean_distance(probe, &record.embedding)?;
            (distance < threshold).then_some(Match { index, distance })
        })
    }
}

/// Takes the closest record strictly under the threshold. Ties keep the earlier record.
pub struct ClosestUnderThreshold;

impl Matcher for ClosestUnderThreshold {
    fn find(&self, probe: &[f32], gallery: &[FaceRecord], threshold: f32) -> Option<Match> {
        if probe.is_empty() {
            return None;
        }
        let mut best: Option<Match> = None;
        for (index, record) in gallery.iter().enumerate() {
            let Some(distance) = euclidean_distance(probe, &record.embedding) else {
                continue;
            };
            if distance >= threshold {
                continue;
            }
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(Match { index, distance });
            }
        }
        best
    }
}

/// Configurable choice of [`Matcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    #[default]
    First,
    Closest,
}

impl MatchPolicy {
    pub fn matcher(self) -> &'static dyn Matcher {
        match self {
            MatchPolicy::First => &FirstUnderThreshold,
            MatchPolicy::Closest => &ClosestUnderThreshold,
        }
    }
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(MatchPolicy::First),
            "closest" => Ok(MatchPolicy::Closest),
            other => Err(format!("unknown match policy {other:?} (expected first or closest)")),
        }
    }
}

/// Who a probe face is, as far as the gallery knows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Known { id: u32, name: String, distance: f32 },
    Unknown,
}

impl Identity {
    /// Display label: the enrolled name, or `"Unknown"`.
    pub fn label(&self) -> &str {
        match self {
            Identity::Known { name, .. } => name,
            Identity::Unknown => UNKNOWN_LABEL,
        }
    }
}

/// Label a probe face against a gallery snapshot.
pub fn identify(
    matcher: &dyn Matcher,
    probe: &ProbeFace,
    gallery: &[FaceRecord],
    threshold: f32,
) -> Identity {
    if probe.embedding.is_empty() {
        tracing::debug!("probe has no embedding; labelling as unknown");
        return Identity::Unknown;
    }
    match matcher.find(&probe.embedding, gallery, threshold) {
        Some(m) => {
            let record = &gallery[m.index];
            Identity::Known {
                id: record.id,
                name: record.name.clone(),
                distance: m.distance,
            }
        }
        None => Identity::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn record(id: u32, name: &str, embedding: Vec<f32>) -> FaceRecord {
        FaceRecord { id, name: name.into(), embedding, image: String::new() }
    }

    fn probe(embedding: Vec<f32>) -> ProbeFace {
        ProbeFace { bbox: BoundingBox::default(), embedding, attributes: None }
    }

    #[test]
    fn test_identify_near_record() {
        let gallery = vec![record(1, "A", vec![0.0, 0.0])];
        let id = identify(&FirstUnderThreshold, &probe(vec![0.0, 0.1]), &gallery, 0.6);
        assert_eq!(id.label(), "A");
    }

    #[test]
    fn test_identify_far_record_is_unknown() {
        let gallery = vec![record(1, "A", vec![0.0, 0.0])];
        let id = identify(&FirstUnderThreshold, &probe(vec![5.0, 5.0]), &gallery, 0.6);
        assert_eq!(id, Identity::Unknown);
        assert_eq!(id.label(), UNKNOWN_LABEL);
    }

    #[test]
    fn test_first_under_threshold_prefers_earlier_record() {
        // "far" qualifies first even though "near" is closer.
        let gallery = vec![
            record(1, "far", vec![0.5, 0.0]),
            record(2, "near", vec![0.05, 0.0]),
        ];
        let m = FirstUnderThreshold.find(&[0.0, 0.0], &gallery, 0.6).unwrap();
        assert_eq!(m.index, 0);
        assert!((m.distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_closest_under_threshold_picks_minimum() {
        let gallery = vec![
            record(1, "far", vec![0.5, 0.0]),
            record(2, "near", vec![0.05, 0.0]),
        ];
        let m = ClosestUnderThreshold.find(&[0.0, 0.0], &gallery, 0.6).unwrap();
        assert_eq!(m.index, 1);
    }

    #[test]
    fn test_threshold_is_strict() {
        let gallery = vec![record(1, "edge", vec![0.6, 0.0])];
        assert!(FirstUnderThreshold.find(&[0.0, 0.0], &gallery, 0.6).is_none());
        assert!(ClosestUnderThreshold.find(&[0.0, 0.0], &gallery, 0.6).is_none());
    }

    #[test]
    fn test_length_mismatch_is_skipped() {
        let gallery = vec![
            record(1, "short", vec![0.0]),
            record(2, "match", vec![0.0, 0.0]),
        ];
        let id = identify(&FirstUnderThreshold, &probe(vec![0.0, 0.0]), &gallery, 0.6);
        assert_eq!(id.label(), "match");
    }

    #[test]
    fn test_empty_probe_is_unknown() {
        let gallery = vec![record(1, "A", vec![])];
        assert_eq!(identify(&FirstUnderThreshold, &probe(vec![]), &gallery, 0.6), Identity::Unknown);
        assert_eq!(identify(&ClosestUnderThreshold, &probe(vec![]), &gallery, 0.6), Identity::Unknown);
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        assert_eq!(identify(&FirstUnderThreshold, &probe(vec![0.0]), &[], 0.6), Identity::Unknown);
    }

    #[test]
    fn test_first_match_over_many_thresholds() {
        let gallery = vec![
            record(1, "a", vec![1.0, 0.0]),
            record(2, "b", vec![0.3, 0.0]),
            record(3, "c", vec![0.0, 0.0]),
        ];
        let probe = [0.0, 0.0];
        for (threshold, expected) in [(0.0, None), (0.2, Some(2)), (0.5, Some(1)), (1.5, Some(0))] {
            let got = FirstUnderThreshold.find(&probe, &gallery, threshold).map(|m| m.index);
            assert_eq!(got, expected, "threshold {threshold}");
        }
    }

    #[test]
    fn test_match_policy_parse() {
        assert_eq!("First".parse::<MatchPolicy>().unwrap(), MatchPolicy::First);
        assert_eq!(" closest ".parse::<MatchPolicy>().unwrap(), MatchPolicy::Closest);
        assert!("nearest".parse::<MatchPolicy>().is_err());
    }
}
