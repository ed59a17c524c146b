//! HTTP adapters for the upload collaborators.
//!
//! [`HttpControlPlane`] talks JSON to a multipart upload service and
//! [`HttpPartTransport`] PUTs part bodies to pre-signed URLs.

pub mod control_plane;
pub mod transport;

pub use control_plane::HttpControlPlane;
pub use transport::{HttpPartTransport, UPLOAD_SLICE_SIZE};

/// Errors from the HTTP adapters.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response carried no ETag header")]
    MissingTag,
}

/// Reads a response body, turning non-success statuses into [`HttpError::Api`].
pub(crate) async fn success_body(resp: reqwest::Response) -> Result<Vec<u8>, HttpError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(HttpError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.bytes().await?.to_vec())
}
