//! facewatch-capture — frame sources for the live annotation loop.
//!
//! A frame source stands in for a webcam: it is opened once, yields RGB
//! frames on demand and can be closed and reopened. [`CameraRing`] holds the
//! configured sources and implements restart and switch.

pub mod camera;
pub mod directory;
pub mod ring;
pub mod snapshot;
pub mod still;

pub use camera::{CameraSpec, CaptureError, FrameSource};
pub use directory::ImageDirSource;
pub use ring::CameraRing;
pub use snapshot::SnapshotSource;
pub use still::StillSource;
