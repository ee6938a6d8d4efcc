//! The live annotation engine.
//!
//! Runs on a dedicated OS thread with a single-threaded tokio runtime. Three
//! loops share that thread: capture (fixed timer, publishes the latest
//! frame), faces (identify every face in the latest frame, serve enroll
//! requests) and objects. D-Bus handlers talk to it through [`EngineHandle`].

use crate::annotations::{count_by_class, Annotations, FaceAnnotation};
use facewatch_capture::{CameraRing, CaptureError};
use facewatch_core::{
    identify, CaptureOutcome, EmbeddingSource, EnrollError, EnrollmentWorkflow, Frame, GalleryStore,
    MatchPolicy, ObjectSource, SourceError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error("embedding source: {0}")]
    Source(#[from] SourceError),
    #[error("capture: {0}")]
    Capture(#[from] CaptureError),
    #[error("no frame captured yet")]
    NoFrame,
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("engine runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// State of the active camera.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CaptureStatus {
    Starting,
    Streaming { camera: String },
    /// Access to the camera was refused; capture stays stopped until restarted.
    Denied { camera: String, reason: String },
    Unavailable { camera: Option<String>, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub capture: CaptureStatus,
    pub camera_index: usize,
    pub cameras: usize,
    pub frames_captured: u64,
    pub face_source: String,
    pub object_source: Option<String>,
}

/// Everything the engine owns once spawned.
pub struct EngineParts {
    pub store: Arc<GalleryStore>,
    pub faces: Box<dyn EmbeddingSource>,
    pub objects: Option<Box<dyn ObjectSource>>,
    pub cameras: CameraRing,
    pub workflow: EnrollmentWorkflow,
    pub match_policy: MatchPolicy,
    pub match_threshold: f32,
    pub frame_interval: Duration,
}

struct EnrollRequest {
    name: String,
    reply: oneshot::Sender<Result<CaptureOutcome, EngineError>>,
}

enum CameraRequest {
    Restart { reply: oneshot::Sender<Result<CaptureStatus, EngineError>> },
    Switch { reply: oneshot::Sender<Result<CaptureStatus, EngineError>> },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    enroll_tx: mpsc::Sender<EnrollRequest>,
    camera_tx: mpsc::Sender<CameraRequest>,
    annotations: watch::Receiver<Annotations>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    /// Enroll the first face of the latest frame under `name`.
    pub async fn enroll(&self, name: &str) -> Result<CaptureOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.enroll_tx
            .send(EnrollRequest { name: name.to_string(), reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn restart_capture(&self) -> Result<CaptureStatus, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.camera_tx
            .send(CameraRequest::Restart { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn switch_camera(&self) -> Result<CaptureStatus, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.camera_tx
            .send(CameraRequest::Switch { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub fn annotations(&self) -> Annotations {
        self.annotations.borrow().clone()
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Wait until the face loop has published results for a frame at or after `sequence`.
    #[cfg(test)]
    pub async fn wait_for_faces(&self, sequence: u64) -> Annotations {
        let mut rx = self.annotations.clone();
        let result = rx
            .wait_for(|a| a.face_frame.is_some_and(|s| s >= sequence))
            .await
            .map(|a| (*a).clone());
        result.unwrap_or_default()
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Camera access problems do not fail the spawn; they are reported through
/// [`EngineHandle::status`] and logged.
pub fn spawn_engine(parts: EngineParts) -> Result<EngineHandle, EngineError> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    let (enroll_tx, enroll_rx) = mpsc::channel(4);
    let (camera_tx, camera_rx) = mpsc::channel(4);
    let (annotations_tx, annotations_rx) = watch::channel(Annotations::default());
    let (status_tx, status_rx) = watch::channel(EngineStatus {
        capture: CaptureStatus::Starting,
        camera_index: parts.cameras.active_index(),
        cameras: parts.cameras.len(),
        frames_captured: 0,
        face_source: parts.faces.name().to_string(),
        object_source: parts.objects.as_ref().map(|o| o.name().to_string()),
    });

    std::thread::Builder::new()
        .name("facewatch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            runtime.block_on(run(parts, enroll_rx, camera_rx, annotations_tx, status_tx));
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle {
        enroll_tx,
        camera_tx,
        annotations: annotations_rx,
        status: status_rx,
    })
}

async fn run(
    parts: EngineParts,
    enroll_rx: mpsc::Receiver<EnrollRequest>,
    camera_rx: mpsc::Receiver<CameraRequest>,
    annotations: watch::Sender<Annotations>,
    status: watch::Sender<EngineStatus>,
) {
    let EngineParts {
        store,
        faces,
        objects,
        cameras,
        workflow,
        match_policy,
        match_threshold,
        frame_interval,
    } = parts;
    let (frame_tx, frame_rx) = watch::channel::<Option<Arc<Frame>>>(None);

    let face_loop = FaceLoop {
        source: faces,
        store,
        workflow,
        match_policy,
        match_threshold,
    };

    tokio::join!(
        capture_loop(cameras, frame_interval, camera_rx, frame_tx, &status),
        face_loop.run(frame_rx.clone(), enroll_rx, &annotations),
        object_loop(objects, frame_rx, &annotations),
    );
}

fn capture_status(cameras: &CameraRing, result: &Result<(), CaptureError>) -> CaptureStatus {
    let camera = cameras.active_description();
    match result {
        Ok(()) => CaptureStatus::Streaming { camera: camera.unwrap_or_default() },
        Err(e) if e.is_access_denied() => CaptureStatus::Denied {
            camera: camera.unwrap_or_default(),
            reason: e.to_string(),
        },
        Err(e) => CaptureStatus::Unavailable { camera, reason: e.to_string() },
    }
}

fn publish_capture(
    status: &watch::Sender<EngineStatus>,
    cameras: &CameraRing,
    result: &Result<(), CaptureError>,
) -> CaptureStatus {
    let capture = capture_status(cameras, result);
    match &capture {
        CaptureStatus::Streaming { camera } => tracing::info!(camera = %camera, "capture streaming"),
        CaptureStatus::Denied { camera, reason } => {
            tracing::error!(camera = %camera, reason = %reason, "camera access denied; capture stopped")
        }
        CaptureStatus::Unavailable { camera, reason } => {
            tracing::error!(camera = ?camera, reason = %reason, "camera unavailable; capture stopped")
        }
        CaptureStatus::Starting => {}
    }
    status.send_modify(|s| {
        s.capture = capture.clone();
        s.camera_index = cameras.active_index();
    });
    capture
}

/// Consecutive failed grabs before an open camera is reported as unavailable.
const MAX_CAPTURE_FAILURES: u32 = 3;

/// Tracks mid-stream capture failures so status leaves `Streaming` when the
/// camera stops delivering, and returns to it once frames flow again.
#[derive(Debug, Default)]
struct CaptureHealth {
    failures: u32,
    degraded: bool,
}

impl CaptureHealth {
    /// Record a failed grab. Returns true when a degraded status should be published.
    fn failed(&mut self, denied: bool) -> bool {
        self.failures = self.failures.saturating_add(1);
        if self.degraded || !(denied || self.failures >= MAX_CAPTURE_FAILURES) {
            return false;
        }
        self.degraded = true;
        true
    }

    /// Record a good frame. Returns true when status should go back to streaming.
    fn recovered(&mut self) -> bool {
        let was_degraded = self.degraded;
        *self = Self::default();
        was_degraded
    }
}

async fn capture_loop(
    mut cameras: CameraRing,
    interval: Duration,
    mut requests: mpsc::Receiver<CameraRequest>,
    frames: watch::Sender<Option<Arc<Frame>>>,
    status: &watch::Sender<EngineStatus>,
) {
    let opened = cameras.open_active().await;
    publish_capture(status, &cameras, &opened);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut health = CaptureHealth::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !cameras.is_open() {
                    continue;
                }
                match cameras.capture().await {
                    Ok(frame) => {
                        if health.recovered() {
                            publish_capture(status, &cameras, &Ok(()));
                        }
                        let sequence = frame.sequence;
                        frames.send_replace(Some(Arc::new(frame)));
                        status.send_modify(|s| s.frames_captured = sequence);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, failures = health.failures.saturating_add(1), "frame capture failed; skipping tick");
                        let denied = e.is_access_denied();
                        if health.failed(denied) {
                            if denied {
                                cameras.close_active();
                            }
                            publish_capture(status, &cameras, &Err(e));
                        }
                    }
                }
            }
            request = requests.recv() => {
                let Some(request) = request else { break };
                let (result, reply) = match request {
                    CameraRequest::Restart { reply } => (cameras.restart().await, reply),
                    CameraRequest::Switch { reply } => (cameras.switch_next().await, reply),
                };
                health = CaptureHealth::default();
                let capture = publish_capture(status, &cameras, &result);
                let _ = reply.send(result.map(|()| capture).map_err(EngineError::from));
            }
        }
    }
    tracing::debug!("capture loop stopped");
}

struct FaceLoop {
    source: Box<dyn EmbeddingSource>,
    store: Arc<GalleryStore>,
    workflow: EnrollmentWorkflow,
    match_policy: MatchPolicy,
    match_threshold: f32,
}

impl FaceLoop {
    async fn run(
        mut self,
        mut frames: watch::Receiver<Option<Arc<Frame>>>,
        mut requests: mpsc::Receiver<EnrollRequest>,
        annotations: &watch::Sender<Annotations>,
    ) {
        loop {
            tokio::select! {
                changed = frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let latest = frames.borrow_and_update().clone();
                    if let Some(frame) = latest {
                        self.annotate(&frame, annotations).await;
                    }
                }
                Some(request) = requests.recv() => {
                    let latest = frames.borrow().clone();
                    let result = match latest {
                        Some(frame) => self.enroll(&request.name, &frame).await,
                        None => Err(EngineError::NoFrame),
                    };
                    let _ = request.reply.send(result);
                }
            }
        }
        tracing::debug!("face loop stopped");
    }

    async fn annotate(&mut self, frame: &Frame, annotations: &watch::Sender<Annotations>) {
        let faces = match self.source.detect_faces(frame).await {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(seq = frame.sequence, source = self.source.name(), error = %e, "face source failed; frame dropped");
                return;
            }
        };

        let gallery = self.store.snapshot();
        let matcher = self.match_policy.matcher();
        let labelled: Vec<FaceAnnotation> = faces
            .iter()
            .map(|probe| FaceAnnotation::new(probe, &identify(matcher, probe, &gallery, self.match_threshold)))
            .collect();

        tracing::trace!(seq = frame.sequence, faces = labelled.len(), "faces annotated");
        annotations.send_modify(|a| {
            a.face_frame = Some(frame.sequence);
            a.faces = labelled;
        });
    }

    async fn enroll(&mut self, name: &str, frame: &Frame) -> Result<CaptureOutcome, EngineError> {
        let faces = self.source.detect_faces(frame).await?;
        let outcome = self.workflow.capture(&self.store, name, frame, &faces)?;
        match &outcome {
            CaptureOutcome::Enrolled(result) => tracing::info!(name, seq = frame.sequence, ?result, "face enrolled"),
            CaptureOutcome::ReadyToSubmit(state) => tracing::info!(name, ?state, "enroll skipped; gallery full"),
        }
        Ok(outcome)
    }
}

async fn object_loop(
    source: Option<Box<dyn ObjectSource>>,
    mut frames: watch::Receiver<Option<Arc<Frame>>>,
    annotations: &watch::Sender<Annotations>,
) {
    let Some(mut source) = source else { return };

    while frames.changed().await.is_ok() {
        let latest = frames.borrow_and_update().clone();
        let Some(frame) = latest else { continue };

        match source.detect_objects(&frame).await {
            Ok(objects) => {
                let counts = count_by_class(&objects);
                annotations.send_modify(|a| {
                    a.object_frame = Some(frame.sequence);
                    a.objects = objects;
                    a.object_counts = counts;
                });
            }
            Err(e) => {
                tracing::warn!(seq = frame.sequence, source = source.name(), error = %e, "object source failed; frame dropped")
            }
        }
    }
    tracing::debug!("object loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use facewatch_capture::{FrameSource, StillSource};
    use facewatch_core::enroll::WorkflowState;
    use facewatch_core::gallery::DEFAULT_GALLERY_KEY;
    use facewatch_core::{
        BoundingBox, EnrollOptions, EnrollmentResult, FaceRecord, FixedObjects, FixedSource, IdPolicy,
        MemoryBackend, ObjectDetection, ProbeFace,
    };
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then reports fixed faces.
    struct FlakyFaces {
        faces: Vec<ProbeFace>,
        failures: usize,
        failed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingSource for FlakyFaces {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn detect_faces(&mut self, _frame: &Frame) -> Result<Vec<ProbeFace>, SourceError> {
            if self.failed.load(Ordering::SeqCst) < self.failures {
                self.failed.fetch_add(1, Ordering::SeqCst);
                return Err(SourceError::Transport("connection reset".into()));
            }
            Ok(self.faces.clone())
        }
    }

    struct FlakyObjects {
        objects: Vec<ObjectDetection>,
        failed: bool,
    }

    #[async_trait]
    impl ObjectSource for FlakyObjects {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn detect_objects(&mut self, _frame: &Frame) -> Result<Vec<ObjectDetection>, SourceError> {
            if !self.failed {
                self.failed = true;
                return Err(SourceError::Malformed("truncated body".into()));
            }
            Ok(self.objects.clone())
        }
    }

    /// Delivers `good_frames` frames after each open, then fails every grab.
    struct FailingCamera {
        good_frames: usize,
        served: usize,
        denied: bool,
        open: bool,
    }

    impl FailingCamera {
        fn boxed(good_frames: usize, denied: bool) -> Box<dyn FrameSource> {
            Box::new(Self { good_frames, served: 0, denied, open: false })
        }
    }

    #[async_trait]
    impl FrameSource for FailingCamera {
        fn describe(&self) -> String {
            "failing".into()
        }

        async fn open(&mut self) -> Result<(), CaptureError> {
            self.open = true;
            self.served = 0;
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
            if self.served < self.good_frames {
                self.served += 1;
                return Ok(RgbImage::new(16, 16));
            }
            if self.denied {
                Err(CaptureError::AccessDenied("failing".into()))
            } else {
                Err(CaptureError::CaptureFailed("device unplugged".into()))
            }
        }
    }

    fn store(records: Vec<FaceRecord>) -> Arc<GalleryStore> {
        let store = GalleryStore::open(Box::new(MemoryBackend::new()), DEFAULT_GALLERY_KEY, IdPolicy::Counter);
        for r in records {
            store.append(r).unwrap();
        }
        Arc::new(store)
    }

    fn record(id: u32, name: &str, embedding: Vec<f32>) -> FaceRecord {
        FaceRecord { id, name: name.into(), embedding, image: String::new() }
    }

    fn probe(embedding: Vec<f32>) -> ProbeFace {
        ProbeFace { bbox: BoundingBox::new(8.0, 8.0, 16.0, 16.0), embedding, attributes: None }
    }

    fn still(label: &str) -> Box<dyn FrameSource> {
        Box::new(StillSource::new(label, RgbImage::from_pixel(48, 48, image::Rgb([120, 110, 100]))))
    }

    fn parts(store: Arc<GalleryStore>, faces: Vec<ProbeFace>, cameras: Vec<Box<dyn FrameSource>>) -> EngineParts {
        EngineParts {
            store,
            faces: Box::new(FixedSource::new(faces)),
            objects: None,
            cameras: CameraRing::from_sources(cameras),
            workflow: EnrollmentWorkflow::new(EnrollOptions::default()),
            match_policy: MatchPolicy::First,
            match_threshold: 0.6,
            frame_interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_live_faces_are_labelled() {
        let gallery = store(vec![record(1, "A", vec![0.0, 0.0]), record(2, "B", vec![5.0, 5.0])]);
        let handle = spawn_engine(parts(gallery, vec![probe(vec![0.0, 0.1]), probe(vec![9.0, 9.0])], vec![still("cam")]))
            .unwrap();

        let annotations = handle.wait_for_faces(1).await;
        let labels: Vec<&str> = annotations.faces.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "Unknown"]);
        assert_eq!(annotations.faces[0].face_id, Some(1));
        assert!(matches!(handle.status().capture, CaptureStatus::Streaming { .. }));
    }

    #[tokio::test]
    async fn test_enroll_inserts_then_labels() {
        let gallery = store(Vec::new());
        let handle = spawn_engine(parts(gallery.clone(), vec![probe(vec![1.0, 2.0])], vec![still("cam")])).unwrap();
        handle.wait_for_faces(1).await;

        let outcome = handle.enroll("Ada").await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Enrolled(EnrollmentResult::Inserted { id: 1 }));
        assert_eq!(gallery.len(), 1);
        assert!(gallery.snapshot()[0].image.starts_with("data:image/png;base64,"));

        let seq = handle.status().frames_captured + 1;
        let annotations = handle.wait_for_faces(seq).await;
        assert_eq!(annotations.faces[0].label, "Ada");
    }

    #[tokio::test]
    async fn test_enroll_blank_name() {
        let handle = spawn_engine(parts(store(Vec::new()), vec![probe(vec![1.0])], vec![still("cam")])).unwrap();
        handle.wait_for_faces(1).await;
        let err = handle.enroll("  ").await.unwrap_err();
        assert!(matches!(err, EngineError::Enroll(EnrollError::NameRequired)));
    }

    #[tokio::test]
    async fn test_enroll_at_capacity_reports_ready() {
        let records = (1..=5).map(|i| record(i, &format!("P{i}"), vec![i as f32 * 10.0])).collect();
        let handle = spawn_engine(parts(store(records), vec![probe(vec![1.0])], vec![still("cam")])).unwrap();
        handle.wait_for_faces(1).await;

        let outcome = handle.enroll("Late").await.unwrap();
        assert_eq!(outcome, CaptureOutcome::ReadyToSubmit(WorkflowState::ReadyToSubmit { enrolled: 5 }));
    }

    #[tokio::test]
    async fn test_denied_camera_reports_status() {
        let handle = spawn_engine(parts(store(Vec::new()), Vec::new(), vec![Box::new(StillSource::denied("locked"))]))
            .unwrap();

        let mut status = handle.status.clone();
        let status = (*status.wait_for(|s| s.capture != CaptureStatus::Starting).await.unwrap()).clone();
        assert!(matches!(status.capture, CaptureStatus::Denied { .. }));

        let err = handle.enroll("Ada").await.unwrap_err();
        assert!(matches!(err, EngineError::NoFrame));
    }

    #[tokio::test]
    async fn test_switch_camera_cycles() {
        let handle = spawn_engine(parts(store(Vec::new()), Vec::new(), vec![still("front"), still("back")])).unwrap();

        let status = handle.switch_camera().await.unwrap();
        assert_eq!(status, CaptureStatus::Streaming { camera: "still:back".into() });
        assert_eq!(handle.status().camera_index, 1);

        let status = handle.restart_capture().await.unwrap();
        assert_eq!(status, CaptureStatus::Streaming { camera: "still:back".into() });
    }

    #[tokio::test]
    async fn test_face_source_failure_drops_only_that_frame() {
        let gallery = store(Vec::new());
        let failed = Arc::new(AtomicUsize::new(0));
        let mut engine_parts = parts(gallery.clone(), Vec::new(), vec![still("cam")]);
        engine_parts.faces = Box::new(FlakyFaces {
            faces: vec![probe(vec![1.0, 2.0])],
            failures: 1,
            failed: failed.clone(),
        });
        let handle = spawn_engine(engine_parts).unwrap();

        let annotations = handle.wait_for_faces(1).await;
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert!(annotations.face_frame.unwrap() >= 2);
        assert_eq!(annotations.faces.len(), 1);
        assert_eq!(annotations.faces[0].label, "Unknown");

        let outcome = handle.enroll("Ada").await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Enrolled(EnrollmentResult::Inserted { id: 1 }));
        assert_eq!(gallery.len(), 1);
    }

    #[tokio::test]
    async fn test_enroll_reports_face_source_failure() {
        let mut engine_parts = parts(store(Vec::new()), Vec::new(), vec![still("cam")]);
        engine_parts.faces = Box::new(FlakyFaces {
            faces: vec![probe(vec![1.0])],
            failures: usize::MAX,
            failed: Arc::new(AtomicUsize::new(0)),
        });
        let handle = spawn_engine(engine_parts).unwrap();

        let mut status = handle.status.clone();
        status.wait_for(|s| s.frames_captured >= 1).await.unwrap();
        let err = handle.enroll("Ada").await.unwrap_err();
        assert!(matches!(err, EngineError::Source(SourceError::Transport(_))));
        assert!(handle.annotations().face_frame.is_none());
    }

    #[tokio::test]
    async fn test_object_source_failure_recovers() {
        let person = ObjectDetection { bbox: BoundingBox::default(), class: "person".into(), score: 0.9 };
        let mut engine_parts = parts(store(Vec::new()), Vec::new(), vec![still("cam")]);
        engine_parts.objects = Some(Box::new(FlakyObjects { objects: vec![person], failed: false }));
        let handle = spawn_engine(engine_parts).unwrap();

        let mut rx = handle.annotations.clone();
        let annotations = (*rx.wait_for(|a| a.object_frame.is_some()).await.unwrap()).clone();
        assert!(annotations.object_frame.unwrap() >= 2);
        assert_eq!(annotations.object_counts.get("person"), Some(&1));
    }

    #[tokio::test]
    async fn test_repeated_capture_failures_mark_camera_unavailable() {
        let handle = spawn_engine(parts(store(Vec::new()), Vec::new(), vec![FailingCamera::boxed(2, false)])).unwrap();

        let mut status = handle.status.clone();
        let status = (*status
            .wait_for(|s| matches!(s.capture, CaptureStatus::Unavailable { .. }))
            .await
            .unwrap())
        .clone();
        assert_eq!(status.frames_captured, 2);
        assert!(
            matches!(status.capture, CaptureStatus::Unavailable { ref reason, .. } if reason.contains("device unplugged"))
        );
    }

    #[tokio::test]
    async fn test_access_denied_mid_stream_stops_until_restart() {
        let handle = spawn_engine(parts(store(Vec::new()), Vec::new(), vec![FailingCamera::boxed(1, true)])).unwrap();

        let mut rx = handle.status.clone();
        let denied = (*rx.wait_for(|s| matches!(s.capture, CaptureStatus::Denied { .. })).await.unwrap()).clone();
        assert_eq!(denied.frames_captured, 1);

        let restarted = handle.restart_capture().await.unwrap();
        assert_eq!(restarted, CaptureStatus::Streaming { camera: "failing".into() });
        rx.wait_for(|s| s.frames_captured >= 2).await.unwrap();
    }

    #[test]
    fn test_capture_health_transitions() {
        let mut health = CaptureHealth::default();
        assert!(!health.failed(false));
        assert!(!health.failed(false));
        assert!(health.failed(false));
        assert!(!health.failed(false), "degraded status is published once");
        assert!(health.recovered());
        assert!(!health.recovered());
        assert!(health.failed(true), "access denied degrades immediately");
    }

    #[tokio::test]
    async fn test_object_counts_published() {
        let obj = |class: &str| ObjectDetection { bbox: BoundingBox::default(), class: class.into(), score: 0.8 };
        let mut engine_parts = parts(store(Vec::new()), Vec::new(), vec![still("cam")]);
        engine_parts.objects = Some(Box::new(FixedObjects::new(vec![obj("person"), obj("person"), obj("cup")])));
        let handle = spawn_engine(engine_parts).unwrap();

        let mut rx = handle.annotations.clone();
        let annotations = (*rx.wait_for(|a| a.object_frame.is_some()).await.unwrap()).clone();
        assert_eq!(annotations.object_counts.get("person"), Some(&2));
        assert_eq!(annotations.objects.len(), 3);
        assert_eq!(handle.status().object_source.as_deref(), Some("fixed"));
    }
}
