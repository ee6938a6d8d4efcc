//! A directory of still images played back as a camera.

use crate::camera::{CaptureError, FrameSource};
use async_trait::async_trait;
use image::RgbImage;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Cycles through the images of a directory in file-name order.
///
/// The listing is taken at open time; restart the source to pick up new files.
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    open: bool,
}

impl ImageDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), files: Vec::new(), cursor: 0, open: false }
    }

    fn list(&self) -> Result<Vec<PathBuf>, CaptureError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CaptureError::DeviceNotFound(self.dir.display().to_string()),
            ErrorKind::PermissionDenied => CaptureError::AccessDenied(self.dir.display().to_string()),
            _ => CaptureError::CaptureFailed(format!("{}: {e}", self.dir.display())),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_supported(p))
            .collect();
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl FrameSource for ImageDirSource {
    fn describe(&self) -> String {
        format!("dir:{}", self.dir.display())
    }

    async fn open(&mut self) -> Result<(), CaptureError> {
        if self.open {
            return Ok(());
        }
        let files = self.list()?;
        if files.is_empty() {
            return Err(CaptureError::NoFrames(self.describe()));
        }
        tracing::info!(dir = %self.dir.display(), images = files.len(), "opened image directory");
        self.files = files;
        self.cursor = 0;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.files.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        let path = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();

        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) if io.kind() == ErrorKind::PermissionDenied => {
                CaptureError::AccessDenied(path.display().to_string())
            }
            image::ImageError::IoError(io) => CaptureError::CaptureFailed(format!("{}: {io}", path.display())),
            other => CaptureError::Decode(other),
        })?;
        Ok(img.to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &Path, name: &str, shade: u8) {
        RgbImage::from_pixel(4, 3, image::Rgb([shade, shade, shade]))
            .save(dir.join(name))
            .unwrap();
    }

    #[tokio::test]
    async fn test_cycles_sorted_images() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 20);
        write_png(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageDirSource::new(dir.path());
        source.open().await.unwrap();
        assert!(source.is_open());

        let shades: Vec<u8> = {
            let mut v = Vec::new();
            for _ in 0..3 {
                v.push(source.next_frame().await.unwrap().get_pixel(0, 0)[0]);
            }
            v
        };
        assert_eq!(shades, vec![10, 20, 10]);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageDirSource::new(dir.path().join("absent"));
        assert!(matches!(source.open().await, Err(CaptureError::DeviceNotFound(_))));
        assert!(!source.is_open());
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageDirSource::new(dir.path());
        assert!(matches!(source.open().await, Err(CaptureError::NoFrames(_))));
    }

    #[tokio::test]
    async fn test_frame_before_open() {
        let mut source = ImageDirSource::new("/nonexistent");
        assert!(matches!(source.next_frame().await, Err(CaptureError::NotOpen)));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(Path::new("x/frame.JPG")));
        assert!(is_supported(Path::new("frame.webp")));
        assert!(!is_supported(Path::new("frame.gif")));
        assert!(!is_supported(Path::new("frame")));
    }
}
