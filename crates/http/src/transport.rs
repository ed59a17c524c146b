//! Part uploads to pre-signed URLs.

use std::sync::Arc;

use capyupload_uploader::{
    BytesProgress, PartPut, PartReceipt, PartTransport, TransportFuture, UploadError,
};
use futures_util::stream;
use reqwest::header::{CONTENT_LENGTH, ETAG};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{HttpError, success_body};

/// Bytes handed to the connection between two progress reports.
pub const UPLOAD_SLICE_SIZE: usize = 64 * 1024;

/// Sends each part as one `PUT` of its exact bytes.
///
/// The storage service answers with an `ETag` header, which becomes the
/// part's tag.
#[derive(Clone)]
pub struct HttpPartTransport {
    http: reqwest::Client,
}

impl HttpPartTransport {
    pub fn new() -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| UploadError::Configuration(e.to_string()))?;
        Ok(Self { http })
    }

    /// Uses an existing client, sharing its connection pool.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn put_part(
        &self,
        part: PartPut,
        progress: mpsc::Sender<BytesProgress>,
    ) -> Result<String, HttpError> {
        let total = part.body.len() as u64;
        let body = reqwest::Body::wrap_stream(progress_stream(part.body, progress));

        let resp = self
            .http
            .put(&part.signed_url)
            .header(CONTENT_LENGTH, total)
            .body(body)
            .send()
            .await?;

        let tag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        success_body(resp).await?;
        tag.ok_or(HttpError::MissingTag)
    }
}

/// Yields `body` in [`UPLOAD_SLICE_SIZE`] slices, reporting the running
/// byte count as each slice is handed over.
///
/// `progress` is dropped with the stream, once the body is fully sent or
/// the request is abandoned.
fn progress_stream(
    body: Vec<u8>,
    progress: mpsc::Sender<BytesProgress>,
) -> impl futures_util::Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let body: Arc<[u8]> = body.into();
    stream::unfold(
        (body, 0usize, progress),
        |(body, offset, progress)| async move {
            if offset >= body.len() {
                return None;
            }
            let end = (offset + UPLOAD_SLICE_SIZE).min(body.len());
            let slice = body[offset..end].to_vec();
            // A closed receiver only means nobody is watching.
            let _ = progress
                .send(BytesProgress {
                    bytes_sent: end as u64,
                    bytes_total: body.len() as u64,
                })
                .await;
            trace!(sent = end, total = body.len(), "part slice");
            Some((Ok(slice), (body, end, progress)))
        },
    )
}

impl PartTransport for HttpPartTransport {
    fn put(&self, part: PartPut, progress: mpsc::Sender<BytesProgress>) -> TransportFuture<'_> {
        Box::pin(async move {
            let part_number = part.part_number;
            let len = part.body.len();
            let tag = self
                .put_part(part, progress)
                .await
                .map_err(|e| UploadError::Transport {
                    part_number,
                    message: e.to_string(),
                })?;
            debug!(part_number, len, "part uploaded");
            Ok(PartReceipt {
                part_number,
                tag: Some(tag),
            })
        })
    }
}
