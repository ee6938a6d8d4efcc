//! HTTP snapshot camera: each frame is a GET of a JPEG/PNG URL.

use crate::camera::{CaptureError, FrameSource};
use async_trait::async_trait;
use image::RgbImage;
use reqwest::StatusCode;

pub struct SnapshotSource {
    url: String,
    client: reqwest::Client,
    open: bool,
}

impl SnapshotSource {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self { url: url.into(), client, open: false }
    }

    async fn fetch(&self) -> Result<RgbImage, CaptureError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("{}: {e}", self.url)))?;

        let status = response.status();
        if let Some(err) = status_error(status, &self.url) {
            return Err(err);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("{}: {e}", self.url)))?;
        Ok(image::load_from_memory(&bytes)?.to_rgb8())
    }
}

fn status_error(status: StatusCode, url: &str) -> Option<CaptureError> {
    match status {
        s if s.is_success() => None,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Some(CaptureError::AccessDenied(format!("{url}: {status}")))
        }
        StatusCode::NOT_FOUND => Some(CaptureError::DeviceNotFound(url.to_string())),
        _ => Some(CaptureError::CaptureFailed(format!("{url}: {status}"))),
    }
}

#[async_trait]
impl FrameSource for SnapshotSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    /// Probes the URL once so that access problems surface at open time.
    async fn open(&mut self) -> Result<(), CaptureError> {
        if self.open {
            return Ok(());
        }
        let probe = self.fetch().await?;
        tracing::info!(url = %self.url, width = probe.width(), height = probe.height(), "opened snapshot camera");
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
        self.fetch().await
    }
}
