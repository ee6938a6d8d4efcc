//! The set of configured cameras, one of which is active.

use crate::camera::{CameraSpec, CaptureError, FrameSource};
use crate::directory::ImageDirSource;
use crate::snapshot::SnapshotSource;
use facewatch_core::Frame;

pub struct CameraRing {
    sources: Vec<Box<dyn FrameSource>>,
    active: usize,
    sequence: u64,
}

impl CameraRing {
    pub fn from_specs(specs: &[CameraSpec], client: reqwest::Client) -> Self {
        let sources = specs
            .iter()
            .map(|spec| -> Box<dyn FrameSource> {
                match spec {
                    CameraSpec::Directory(dir) => Box::new(ImageDirSource::new(dir.clone())),
                    CameraSpec::Snapshot(url) => Box::new(SnapshotSource::new(url.clone(), client.clone())),
                }
            })
            .collect();
        Self::from_sources(sources)
    }

    pub fn from_sources(sources: Vec<Box<dyn FrameSource>>) -> Self {
        Self { sources, active: 0, sequence: 0 }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_description(&self) -> Option<String> {
        self.sources.get(self.active).map(|s| s.describe())
    }

    pub fn is_open(&self) -> bool {
        self.sources.get(self.active).is_some_and(|s| s.is_open())
    }

    pub async fn open_active(&mut self) -> Result<(), CaptureError> {
        let source = self
            .sources
            .get_mut(self.active)
            .ok_or_else(|| CaptureError::DeviceNotFound("no cameras configured".into()))?;
        source.open().await
    }

    /// Stop capturing from the active camera until it is restarted or switched.
    pub fn close_active(&mut self) {
        if let Some(source) = self.sources.get_mut(self.active) {
            source.close();
        }
    }

    /// Close and reopen the active camera.
    pub async fn restart(&mut self) -> Result<(), CaptureError> {
        self.close_active();
        tracing::info!(camera = ?self.active_description(), "restarting capture");
        self.open_active().await
    }

    /// Close the active camera and open the next one, wrapping around.
    pub async fn switch_next(&mut self) -> Result<(), CaptureError> {
        if self.sources.is_empty() {
            return Err(CaptureError::DeviceNotFound("no cameras configured".into()));
        }
        self.sources[self.active].close();
        self.active = (self.active + 1) % self.sources.len();
        tracing::info!(index = self.active, camera = %self.sources[self.active].describe(), "switched camera");
        self.open_active().await
    }

    /// Grab a frame from the active camera and stamp it with the next sequence number.
    pub async fn capture(&mut self) -> Result<Frame, CaptureError> {
        let source = self.sources.get_mut(self.active).ok_or(CaptureError::NotOpen)?;
        let image = source.next_frame().await?;
        self.sequence += 1;
        Ok(Frame::new(image, self.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::still::StillSource;
    use image::RgbImage;

    fn still(label: &str, shade: u8) -> Box<dyn FrameSource> {
        Box::new(StillSource::new(label, RgbImage::from_pixel(2, 2, image::Rgb([shade, 0, 0]))))
    }

    #[tokio::test]
    async fn test_capture_sequence_increments() {
        let mut ring = CameraRing::from_sources(vec![still("a", 1)]);
        ring.open_active().await.unwrap();
        assert_eq!(ring.capture().await.unwrap().sequence, 1);
        assert_eq!(ring.capture().await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_switch_wraps_and_closes_previous() {
        let mut ring = CameraRing::from_sources(vec![still("a", 1), still("b", 2)]);
        ring.open_active().await.unwrap();

        ring.switch_next().await.unwrap();
        assert_eq!(ring.active_description().as_deref(), Some("still:b"));
        assert_eq!(ring.capture().await.unwrap().image.get_pixel(0, 0)[0], 2);

        ring.switch_next().await.unwrap();
        assert_eq!(ring.active_index(), 0);
        assert!(ring.is_open());
    }

    #[tokio::test]
    async fn test_restart_reopens() {
        let mut ring = CameraRing::from_sources(vec![still("a", 1)]);
        ring.open_active().await.unwrap();
        ring.restart().await.unwrap();
        assert!(ring.is_open());
    }

    #[tokio::test]
    async fn test_close_active_stops_capture() {
        let mut ring = CameraRing::from_sources(vec![still("a", 1)]);
        ring.open_active().await.unwrap();
        ring.close_active();
        assert!(!ring.is_open());
        assert!(matches!(ring.capture().await, Err(CaptureError::NotOpen)));
        ring.restart().await.unwrap();
        assert!(ring.capture().await.is_ok());
    }

    #[tokio::test]
    async fn test_denied_camera() {
        let mut ring = CameraRing::from_sources(vec![Box::new(StillSource::denied("locked"))]);
        let err = ring.open_active().await.unwrap_err();
        assert!(err.is_access_denied());
        assert!(!ring.is_open());
    }

    #[tokio::test]
    async fn test_empty_ring() {
        let mut ring = CameraRing::from_specs(&[], reqwest::Client::new());
        assert!(ring.is_empty());
        assert!(matches!(ring.open_active().await, Err(CaptureError::DeviceNotFound(_))));
        assert!(ring.switch_next().await.is_err());
    }
}
