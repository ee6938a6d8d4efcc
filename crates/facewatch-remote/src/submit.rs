//! Upload of the whole gallery to a training server.

use crate::RemoteError;
use facewatch_core::FaceRecord;
use serde::Serialize;

pub const DEFAULT_SUBMIT_URL: &str = "http://localhost:3000/train/face";

#[derive(Serialize)]
struct SubmitBody<'a> {
    #[serde(rename = "trainedFaces")]
    trained_faces: &'a [FaceRecord],
}

/// What the server acknowledged.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub submitted: usize,
    pub response: String,
}

pub struct GallerySubmitter {
    client: reqwest::Client,
    url: String,
}

impl GallerySubmitter {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn submit(&self, records: &[FaceRecord]) -> Result<SubmitReceipt, RemoteError> {
        let body = encode_body(records)?;
        let response = crate::post(&self.client, &self.url, "application/json", body).await?;
        tracing::info!(url = %self.url, faces = records.len(), "gallery submitted");
        Ok(SubmitReceipt { submitted: records.len(), response })
    }
}

fn encode_body(records: &[FaceRecord]) -> Result<Vec<u8>, RemoteError> {
    Ok(serde_json::to_vec(&SubmitBody { trained_faces: records })?)
}
