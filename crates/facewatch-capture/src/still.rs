use crate::camera::{CaptureError, FrameSource};
use async_trait::async_trait;
use image::RgbImage;

/// Returns the same in-memory image for every frame. Used for diagnostics and tests.
pub struct StillSource {
    label: String,
    image: RgbImage,
    open: bool,
    deny: bool,
}

impl StillSource {
    pub fn new(label: impl Into<String>, image: RgbImage) -> Self {
        Self { label: label.into(), image, open: false, deny: false }
    }

    /// A source whose open always fails with [`CaptureError::AccessDenied`].
    pub fn denied(label: impl Into<String>) -> Self {
        Self { deny: true, ..Self::new(label, RgbImage::new(1, 1)) }
    }
}

#[async_trait]
impl FrameSource for StillSource {
    fn describe(&self) -> String {
        format!("still:{}", self.label)
    }

    async fn open(&mut self) -> Result<(), CaptureError> {
        if self.deny {
            return Err(CaptureError::AccessDenied(self.describe()));
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        Ok(self.image.clone())
    }
}
