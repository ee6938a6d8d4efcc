//! ArcFace embedder via ONNX Runtime.
//!
//! Takes a square crop around a detected face box, resizes it to 112×112 and
//! returns an L2-normalized embedding.

use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 112;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 127.5;
/// Extra context around the detector box, as a fraction of its longer side.
const CROP_MARGIN: f32 = 0.15;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("embedding model not found: {0}")]
    ModelNotFound(String),
    #[error("face box lies outside the frame")]
    EmptyCrop,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded ArcFace embedder");
        Ok(Self { session })
    }

    pub fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Vec<f32>, RecognizerError> {
        let crop = square_crop(image, face).ok_or(RecognizerError::EmptyCrop)?;
        let input = input_tensor(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding output: {e}")))?;

        if raw.is_empty() {
            return Err(RecognizerError::InferenceFailed("empty embedding".into()));
        }
        Ok(l2_normalize(raw))
    }
}

/// Square region centred on the face box, grown by [`CROP_MARGIN`] and clamped to
/// the frame, resized to the model input.
fn square_crop(image: &RgbImage, face: &BoundingBox) -> Option<RgbImage> {
    let side = face.width.max(face.height) * (1.0 + 2.0 * CROP_MARGIN);
    if !(side > 0.0) {
        return None;
    }
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).max(0.0).floor() as u32;
    let y0 = (cy - side / 2.0).max(0.0).floor() as u32;
    let x1 = ((cx + side / 2.0).ceil().max(0.0) as u32).min(image.width());
    let y1 = ((cy + side / 2.0).ceil().max(0.0) as u32).min(image.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let region = image::imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
    Some(image::imageops::resize(&region, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle))
}

fn input_tensor(crop: &RgbImage) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (px[c] as f32 - PIXEL_MEAN) / PIXEL_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}
