//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB frame to 640×640, decodes the three anchor-free stride
//! heads and suppresses overlapping boxes.

use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [u32; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0}")]
    ModelNotFound(String),
    #[error("detector model has {0} outputs, expected at least 6 (score and bbox per stride)")]
    UnexpectedOutputs(usize),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face box with its detector score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBox {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Scale and padding applied when fitting a frame into the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
    width: u32,
    height: u32,
}

impl Letterbox {
    fn fit(frame_w: u32, frame_h: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / frame_w as f32).min(INPUT_SIZE as f32 / frame_h as f32);
        let width = ((frame_w as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        let height = ((frame_h as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        Self {
            scale,
            pad_x: (INPUT_SIZE - width) / 2,
            pad_y: (INPUT_SIZE - height) / 2,
            width,
            height,
        }
    }

    /// Map a point in model-input space back to frame space.
    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x as f32) / self.scale, (y - self.pad_y as f32) / self.scale)
    }
}

pub struct FaceDetector {
    session: Session,
    /// (score, bbox) output indices per stride.
    heads: [(usize, usize); 3],
}

impl FaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 6 {
            return Err(DetectorError::UnexpectedOutputs(names.len()));
        }
        let heads = head_indices(&names);
        tracing::info!(path = %model_path.display(), outputs = ?names, ?heads, "loaded SCRFD detector");

        Ok(Self { session, heads })
    }

    /// Faces in the frame, highest score first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<ScoredBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let letterbox = Letterbox::fit(image.width(), image.height());
        let input = input_tensor(image, &letterbox);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.heads[slot];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores @{stride}: {e}")))?;
            let (_, deltas) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("boxes @{stride}: {e}")))?;
            candidates.extend(decode_head(scores, deltas, stride, &letterbox));
        }

        Ok(suppress(candidates, NMS_IOU_THRESHOLD))
    }
}

/// Output indices for each stride, by name (`score_8`, `bbox_8`, ...) when the
/// export names them, otherwise the usual positional layout.
fn head_indices(names: &[String]) -> [(usize, usize); 3] {
    let find = |kind: &str, stride: u32| names.iter().position(|n| *n == format!("{kind}_{stride}"));
    let named: Option<Vec<(usize, usize)>> = STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?)))
        .collect();

    match named {
        Some(v) => [v[0], v[1], v[2]],
        None => [(0, 3), (1, 4), (2, 5)],
    }
}

fn input_tensor(image: &RgbImage, letterbox: &Letterbox) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let resized = image::imageops::resize(image, letterbox.width, letterbox.height, FilterType::Triangle);

    // Padding is left at 0.0, which is the normalized value of the mean pixel.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in resized.enumerate_pixels() {
        let tx = (x + letterbox.pad_x) as usize;
        let ty = (y + letterbox.pad_y) as usize;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (px[c] as f32 - PIXEL_MEAN) / PIXEL_STD;
        }
    }
    tensor
}

fn decode_head(scores: &[f32], deltas: &[f32], stride: u32, letterbox: &Letterbox) -> Vec<ScoredBox> {
    let cells_x = (INPUT_SIZE / stride) as usize;
    let step = stride as f32;

    scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score > SCORE_THRESHOLD)
        .filter_map(|(anchor, &score)| {
            let d = deltas.get(anchor * 4..anchor * 4 + 4)?;
            let cell = anchor / ANCHORS_PER_CELL;
            let cx = (cell % cells_x) as f32 * step;
            let cy = (cell / cells_x) as f32 * step;

            let (x1, y1) = letterbox.to_frame(cx - d[0] * step, cy - d[1] * step);
            let (x2, y2) = letterbox.to_frame(cx + d[2] * step, cy + d[3] * step);
            Some(ScoredBox { bbox: BoundingBox::new(x1, y1, x2 - x1, y2 - y1), score })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by descending score.
fn suppress(mut boxes: Vec<ScoredBox>, iou_threshold: f32) -> Vec<ScoredBox> {
    boxes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<ScoredBox> = Vec::new();
    for candidate in boxes {
        if kept.iter().all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
