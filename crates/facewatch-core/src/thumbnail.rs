//! Face thumbnails stored alongside enrolled records.

use crate::types::BoundingBox;
use base64::Engine;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("face box {0:?} does not overlap the frame")]
    EmptyCrop(BoundingBox),
    #[error("encode thumbnail: {0}")]
    Encode(#[from] image::ImageError),
}

/// Cut the face box out of the frame, clamped to the frame bounds.
pub fn crop_face(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let x0 = bbox.x.max(0.0).floor();
    let y0 = bbox.y.max(0.0).floor();
    let x1 = (bbox.x + bbox.width).min(w).ceil();
    let y1 = (bbox.y + bbox.height).min(h).ceil();
    if !(x1 > x0 && y1 > y0) {
        return None;
    }
    let crop = image::imageops::crop_imm(
        image,
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    );
    Some(crop.to_image())
}

/// PNG-encode the face crop as a `data:image/png;base64,...` URL.
pub fn face_data_url(image: &RgbImage, bbox: &BoundingBox) -> Result<String, ThumbnailError> {
    let crop = crop_face(image, bbox).ok_or(ThumbnailError::EmptyCrop(*bbox))?;
    let mut png = Vec::new();
    crop.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
    Ok(format!("data:image/png;base64,{encoded}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_inside_frame() {
        let img = RgbImage::new(100, 80);
        let crop = crop_face(&img, &BoundingBox::new(10.0, 20.0, 30.0, 40.0)).unwrap();
        assert_eq!(crop.dimensions(), (30, 40));
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let img = RgbImage::new(100, 80);
        let crop = crop_face(&img, &BoundingBox::new(-10.0, 60.0, 50.0, 50.0)).unwrap();
        assert_eq!(crop.dimensions(), (40, 20));
    }

    #[test]
    fn test_crop_outside_frame() {
        let img = RgbImage::new(100, 80);
        assert!(crop_face(&img, &BoundingBox::new(200.0, 0.0, 10.0, 10.0)).is_none());
        assert!(crop_face(&img, &BoundingBox::new(10.0, 10.0, 0.0, 10.0)).is_none());
    }

    #[test]
    fn test_data_url_decodes_to_png() {
        let img = RgbImage::from_pixel(64, 64, image::Rgb([200, 10, 10]));
        let url = face_data_url(&img, &BoundingBox::new(8.0, 8.0, 16.0, 16.0)).unwrap();
        let payload = url.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(payload).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }
}
