use anyhow::{Context, Result};
use facewatch_capture::CameraRing;
use facewatch_core::{
    EmbeddingSource, EnrollmentWorkflow, FileBackend, GalleryStore, KvBackend, ObjectSource, OnnxFaceSource,
    SqliteBackend,
};
use facewatch_remote::{GallerySubmitter, RemoteFaceSource, RemoteObjectSource};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod annotations;
mod config;
mod dbus_interface;
mod engine;

use config::{Config, FaceSourceKind, StorageKind};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facewatchd starting");

    let config = Config::load().context("failed to load configuration")?;

    let backend: Box<dyn KvBackend> = match config.storage {
        StorageKind::Sqlite => {
            let path = config.gallery_db_path();
            Box::new(SqliteBackend::open(&path).with_context(|| format!("failed to open {}", path.display()))?)
        }
        StorageKind::File => Box::new(FileBackend::new(config.data_dir.join("gallery"))),
    };
    let store = Arc::new(GalleryStore::open(backend, config.gallery_key.clone(), config.id_policy));

    let client = facewatch_remote::http_client(config.http_timeout())?;

    let faces: Box<dyn EmbeddingSource> = match config.face_source {
        FaceSourceKind::Onnx => Box::new(
            OnnxFaceSource::load(&config.model_dir)
                .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?,
        ),
        FaceSourceKind::Remote => {
            let endpoint = config.face_endpoint.clone().context("face_endpoint is not set")?;
            Box::new(RemoteFaceSource::new(client.clone(), endpoint))
        }
    };
    let objects: Option<Box<dyn ObjectSource>> = config
        .object_endpoint
        .clone()
        .map(|endpoint| Box::new(RemoteObjectSource::new(client.clone(), endpoint)) as Box<dyn ObjectSource>);

    let specs = config.camera_specs()?;
    tracing::info!(
        cameras = ?specs.iter().map(ToString::to_string).collect::<Vec<_>>(),
        face_source = faces.name(),
        objects = objects.is_some(),
        faces_enrolled = store.len(),
        "components ready"
    );

    let workflow = EnrollmentWorkflow::new(config.enroll_options());
    let engine = engine::spawn_engine(engine::EngineParts {
        store: store.clone(),
        faces,
        objects,
        cameras: CameraRing::from_specs(&specs, client.clone()),
        workflow,
        match_policy: config.match_policy,
        match_threshold: config.match_threshold,
        frame_interval: config.frame_interval(),
    })?;

    let service = dbus_interface::FacewatchService::new(
        engine,
        store,
        workflow,
        GallerySubmitter::new(client, config.submit_url.clone()),
        config.match_policy,
        config.match_threshold,
    );

    let _conn = zbus::connection::Builder::session()?
        .name(dbus_interface::BUS_NAME)?
        .serve_at(dbus_interface::OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    tracing::info!(bus = dbus_interface::BUS_NAME, path = dbus_interface::OBJECT_PATH, "facewatchd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("facewatchd shutting down");

    Ok(())
}
