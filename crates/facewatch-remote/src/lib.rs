//! facewatch-remote — HTTP adapters for inference endpoints and gallery submission.

pub mod faces;
pub mod objects;
pub mod submit;

pub use faces::RemoteFaceSource;
pub use objects::RemoteObjectSource;
pub use submit::{GallerySubmitter, SubmitReceipt};

use facewatch_core::SourceError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<RemoteError> for SourceError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Malformed(e) => SourceError::Malformed(e.to_string()),
            other => SourceError::Transport(other.to_string()),
        }
    }
}

/// Shared async client with a per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, RemoteError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// POST `body` and return the raw response text, mapping non-2xx statuses to
/// [`RemoteError::Status`].
pub(crate) async fn post(
    client: &reqwest::Client,
    url: &str,
    content_type: &str,
    body: Vec<u8>,
) -> Result<String, RemoteError> {
    let response = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, content_type)
        .body(body)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(RemoteError::Status { url: url.to_string(), status: status.as_u16(), body: text });
    }
    Ok(text)
}
