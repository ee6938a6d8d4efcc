//! The frame source abstraction and camera configuration strings.

use async_trait::async_trait;
use image::RgbImage;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("no frames available from {0}")]
    NoFrames(String),
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("camera is not open")]
    NotOpen,
}

impl CaptureError {
    /// Whether retrying the same source is pointless until configuration changes.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, CaptureError::AccessDenied(_))
    }
}

/// A camera-like producer of RGB frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Human-readable identity for logs and status.
    fn describe(&self) -> String;

    /// Acquire the device. Opening an already-open source is a no-op.
    async fn open(&mut self) -> Result<(), CaptureError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    async fn next_frame(&mut self) -> Result<RgbImage, CaptureError>;
}

/// A configured camera, parsed from `FACEWATCH_CAMERAS` or the config file.
///
/// `http://` and `https://` URLs are snapshot cameras; anything else is a
/// directory of images, optionally prefixed with `dir:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSpec {
    Directory(PathBuf),
    Snapshot(String),
}

impl FromStr for CameraSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty camera entry".into());
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(CameraSpec::Snapshot(s.to_string()));
        }
        let path = s.strip_prefix("dir:").unwrap_or(s);
        if path.is_empty() {
            return Err(format!("camera entry '{s}' has no path"));
        }
        Ok(CameraSpec::Directory(PathBuf::from(path)))
    }
}

impl std::fmt::Display for CameraSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraSpec::Directory(p) => write!(f, "dir:{}", p.display()),
            CameraSpec::Snapshot(url) => f.write_str(url),
        }
    }
}
