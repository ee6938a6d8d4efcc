//! facewatch-core — Face gallery, identity matching and enrollment.
//!
//! The gallery of named face embeddings is owned by [`GalleryStore`];
//! [`identify`] labels live probes against a gallery snapshot and
//! [`enroll`] inserts or refreshes gallery records. Embeddings come from
//! a pluggable [`EmbeddingSource`]: a deterministic fake, the local ONNX
//! models in [`local`], or a remote endpoint (see `facewatch-remote`).

pub mod backend;
pub mod detector;
pub mod enroll;
pub mod frame;
pub mod gallery;
pub mod local;
pub mod matcher;
pub mod recognizer;
pub mod source;
pub mod thumbnail;
pub mod types;

pub use backend::{BackendError, FileBackend, KvBackend, MemoryBackend, SqliteBackend};
pub use enroll::{
    enroll, CaptureOutcome, EnrollError, EnrollOptions, EnrollmentResult, EnrollmentWorkflow,
    WorkflowState,
};
pub use frame::Frame;
pub use gallery::{Confirm, GalleryError, GalleryStore, IdPolicy, RemoveOutcome};
pub use local::{default_model_dir, OnnxFaceSource};
pub use matcher::{
    identify, ClosestUnderThreshold, FirstUnderThreshold, Identity, Match, MatchPolicy, Matcher,
};
pub use source::{EmbeddingSource, FixedObjects, FixedSource, ObjectSource, SourceError};
pub use types::{BoundingBox, FaceAttributes, FaceRecord, ObjectDetection, ProbeFace};
