use crate::engine::{EngineError, EngineHandle};
use facewatch_core::{EnrollError, EnrollmentWorkflow, GalleryStore, MatchPolicy, RemoveOutcome, WorkflowState};
use facewatch_remote::GallerySubmitter;
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.facewatch.Facewatch1";
pub const OBJECT_PATH: &str = "/org/facewatch/Facewatch1";

/// D-Bus interface for the Facewatch daemon.
///
/// Bus name: org.facewatch.Facewatch1
/// Object path: /org/facewatch/Facewatch1
pub struct FacewatchService {
    engine: EngineHandle,
    store: Arc<GalleryStore>,
    workflow: EnrollmentWorkflow,
    submitter: GallerySubmitter,
    match_policy: MatchPolicy,
    match_threshold: f32,
}

impl FacewatchService {
    pub fn new(
        engine: EngineHandle,
        store: Arc<GalleryStore>,
        workflow: EnrollmentWorkflow,
        submitter: GallerySubmitter,
        match_policy: MatchPolicy,
        match_threshold: f32,
    ) -> Self {
        Self { engine, store, workflow, submitter, match_policy, match_threshold }
    }
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    match err {
        e @ EngineError::Enroll(EnrollError::NameRequired) => zbus::fdo::Error::InvalidArgs(e.to_string()),
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(format!("encode reply: {e}")))
}

#[interface(name = "org.facewatch.Facewatch1")]
impl FacewatchService {
    /// Enroll the first face of the current frame under `name`.
    async fn enroll(&self, name: &str) -> zbus::fdo::Result<String> {
        tracing::info!(name, "enroll requested");
        let outcome = self.engine.enroll(name).await.map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Enrolled faces in enrollment order, without descriptors.
    async fn list_faces(&self) -> zbus::fdo::Result<String> {
        let faces: Vec<serde_json::Value> = self
            .store
            .snapshot()
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "name": r.name,
                    "dimension": r.embedding.len(),
                    "image": r.image,
                })
            })
            .collect();
        to_json(&faces)
    }

    /// Remove a face by id. `confirmed` is the operator's answer to the
    /// deletion prompt; the CLI asks it only when the id exists.
    async fn remove_face(&self, id: u32, confirmed: bool) -> zbus::fdo::Result<String> {
        tracing::info!(id, confirmed, "remove requested");
        let outcome = self
            .store
            .remove_by_id(id, &|_prompt: &str| confirmed)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        let reply = match outcome {
            RemoveOutcome::Removed(record) => serde_json::json!({"outcome": "removed", "id": id, "name": record.name}),
            RemoveOutcome::Cancelled => serde_json::json!({"outcome": "cancelled", "id": id}),
            RemoveOutcome::NotFound => serde_json::json!({"outcome": "not_found", "id": id}),
        };
        Ok(reply.to_string())
    }

    async fn restart_capture(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.restart_capture().await.map_err(to_fdo)?;
        to_json(&status)
    }

    async fn switch_camera(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.switch_camera().await.map_err(to_fdo)?;
        to_json(&status)
    }

    /// Latest face labels, object boxes and per-class object counts.
    async fn annotations(&self) -> zbus::fdo::Result<String> {
        to_json(&self.engine.annotations())
    }

    /// POST the gallery to the training server. Only allowed once the gallery is full.
    async fn submit(&self) -> zbus::fdo::Result<String> {
        match self.workflow.state(&self.store) {
            WorkflowState::ReadyToSubmit { .. } => {}
            WorkflowState::Capturing { enrolled, capacity } => {
                return Err(zbus::fdo::Error::Failed(format!(
                    "gallery not ready to submit: {enrolled} of {capacity} faces enrolled"
                )));
            }
        }

        let records = self.store.snapshot();
        let receipt = self.submitter.submit(&records).await.map_err(|e| {
            tracing::warn!(url = self.submitter.url(), error = %e, "gallery submission failed");
            zbus::fdo::Error::Failed(e.to_string())
        })?;
        to_json(&receipt)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "engine": self.engine.status(),
            "gallery": {
                "faces": self.store.len(),
                "id_policy": self.store.id_policy(),
                "workflow": self.workflow.state(&self.store),
            },
            "match_policy": self.match_policy,
            "match_threshold": self.match_threshold,
            "similarity_threshold": self.workflow.options().similarity_threshold,
            "submit_url": self.submitter.url(),
        })
        .to_string())
    }
}
