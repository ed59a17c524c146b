//! JSON client for a multipart upload service.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Call     | Request                                          | Response            |
//! |----------|--------------------------------------------------|---------------------|
//! | create   | `POST /multipart` `{filename, type, metadata, bucket}` | `{uploadId, key}` |
//! | sign     | `GET /multipart/{uploadId}/{partNumber}?key=`    | `{url}`             |
//! | complete | `POST /multipart/{uploadId}/complete?key=` `{parts: [{PartNumber, ETag}]}` | `{key}` |

use capyupload_protocol::{
    CompleteUploadRequest, CompleteUploadResponse, CreateUploadRequest, CreateUploadResponse,
    SignPartRequest, SignPartResponse,
};
use capyupload_uploader::{ControlPlaneClient, ControlPlaneFuture, UploadError};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{HttpError, success_body};

#[derive(Serialize)]
struct CreateBody<'a> {
    #[serde(flatten)]
    request: &'a CreateUploadRequest,
    bucket: &'a str,
}

#[derive(Serialize)]
struct CompleteBody<'a> {
    parts: Vec<CompletePart<'a>>,
}

#[derive(Serialize)]
struct CompletePart<'a> {
    #[serde(rename = "PartNumber")]
    part_number: u32,
    #[serde(rename = "ETag")]
    etag: &'a str,
}

/// The service may answer complete with an empty object.
#[derive(Deserialize, Default)]
#[serde(default)]
struct CompleteReply {
    key: String,
    location: String,
}

/// Control-plane client over HTTP.
pub struct HttpControlPlane {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
}

impl HttpControlPlane {
    /// Creates a client for `endpoint` storing objects in `bucket`.
    ///
    /// Both must be non-empty.
    pub fn new(endpoint: &str, bucket: &str) -> Result<Self, UploadError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(UploadError::Configuration(
                "control plane endpoint is not set".into(),
            ));
        }
        if bucket.trim().is_empty() {
            return Err(UploadError::Configuration("storage bucket is not set".into()));
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| UploadError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            bucket: bucket.trim().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn upload_url(&self, upload_id: &str, suffix: &str) -> String {
        let encoded = utf8_percent_encode(upload_id, NON_ALPHANUMERIC);
        format!("{}/multipart/{encoded}/{suffix}", self.endpoint)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, HttpError> {
        let resp = builder.send().await?;
        let body = success_body(resp).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn control_plane_error(err: HttpError) -> UploadError {
    UploadError::ControlPlane(err.to_string())
}

impl ControlPlaneClient for HttpControlPlane {
    fn create(
        &self,
        request: &CreateUploadRequest,
    ) -> ControlPlaneFuture<'_, CreateUploadResponse> {
        let builder = self
            .http
            .post(format!("{}/multipart", self.endpoint))
            .json(&CreateBody {
                request,
                bucket: &self.bucket,
            });
        let filename = request.filename.clone();
        Box::pin(async move {
            debug!(filename = %filename, "creating multipart upload");
            self.send_json(builder).await.map_err(control_plane_error)
        })
    }

    fn sign_part(&self, request: &SignPartRequest) -> ControlPlaneFuture<'_, SignPartResponse> {
        let builder = self
            .http
            .get(self.upload_url(&request.upload_id, &request.part_number.to_string()))
            .query(&[("key", request.key.as_str())]);
        Box::pin(async move { self.send_json(builder).await.map_err(control_plane_error) })
    }

    fn complete(
        &self,
        request: &CompleteUploadRequest,
    ) -> ControlPlaneFuture<'_, CompleteUploadResponse> {
        let body = CompleteBody {
            parts: request
                .parts
                .iter()
                .filter_map(|p| {
                    Some(CompletePart {
                        part_number: p.part_number,
                        etag: p.tag.as_deref()?,
                    })
                })
                .collect(),
        };
        let builder = self
            .http
            .post(self.upload_url(&request.upload_id, "complete"))
            .query(&[("key", request.key.as_str())])
            .json(&body);
        let fallback_key = request.key.clone();

        Box::pin(async move {
            let reply: CompleteReply = self.send_json(builder).await.map_err(control_plane_error)?;
            let key = if reply.key.is_empty() {
                fallback_key
            } else {
                reply.key
            };
            Ok(CompleteUploadResponse {
                key,
                location: reply.location,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::serve_once;
    use capyupload_protocol::PartResult;
    use std::collections::HashMap;

    #[test]
    fn new_requires_endpoint_and_bucket() {
        assert!(matches!(
            HttpControlPlane::new("", "media"),
            Err(UploadError::Configuration(_))
        ));
        assert!(matches!(
            HttpControlPlane::new("https://api.test", " "),
            Err(UploadError::Configuration(_))
        ));
        let client = HttpControlPlane::new("https://api.test/", "media").unwrap();
        assert_eq!(client.endpoint(), "https://api.test");
        assert_eq!(client.bucket(), "media");
    }

    #[test]
    fn upload_url_encodes_id() {
        let client = HttpControlPlane::new("https://api.test", "media").unwrap();
        assert_eq!(
            client.upload_url("a/b c", "3"),
            "https://api.test/multipart/a%2Fb%20c/3"
        );
    }

    #[tokio::test]
    async fn create_posts_request_with_bucket() {
        let (url, handle) =
            serve_once(200, &[], r#"{"uploadId":"u-42","key":"media/clip.mp4"}"#).await;
        let client = HttpControlPlane::new(&url, "media").unwrap();

        let resp = client
            .create(&CreateUploadRequest {
                filename: "clip.mp4".into(),
                content_type: Some("video/mp4".into()),
                metadata: HashMap::from([("owner".into(), "ops".into())]),
            })
            .await
            .unwrap();

        assert_eq!(resp.upload_id, "u-42");
        assert_eq!(resp.key, "media/clip.mp4");

        let req = handle.await.unwrap();
        assert_eq!(req.request_line(), "POST /multipart HTTP/1.1");
        let body = req.json();
        assert_eq!(body["filename"], "clip.mp4");
        assert_eq!(body["type"], "video/mp4");
        assert_eq!(body["metadata"]["owner"], "ops");
        assert_eq!(body["bucket"], "media");
    }

    #[tokio::test]
    async fn sign_part_queries_key() {
        let (url, handle) = serve_once(200, &[], r#"{"url":"https://s3.test/signed"}"#).await;
        let client = HttpControlPlane::new(&url, "media").unwrap();

        let resp = client
            .sign_part(&SignPartRequest {
                upload_id: "u-42".into(),
                key: "media/clip.mp4".into(),
                part_number: 7,
            })
            .await
            .unwrap();

        assert_eq!(resp.url, "https://s3.test/signed");
        let req = handle.await.unwrap();
        assert_eq!(
            req.request_line(),
            "GET /multipart/u%2D42/7?key=media%2Fclip.mp4 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn complete_sends_parts_and_falls_back_to_request_key() {
        let (url, handle) = serve_once(200, &[], "{}").await;
        let client = HttpControlPlane::new(&url, "media").unwrap();

        let resp = client
            .complete(&CompleteUploadRequest {
                upload_id: "u1".into(),
                key: "media/clip.mp4".into(),
                parts: vec![PartResult::new(1, "aaa"), PartResult::new(2, "bbb")],
            })
            .await
            .unwrap();

        assert_eq!(resp.key, "media/clip.mp4");
        let req = handle.await.unwrap();
        assert!(req.request_line().starts_with("POST /multipart/u1/complete?key="));
        assert_eq!(
            req.json(),
            serde_json::json!({"parts": [
                {"PartNumber": 1, "ETag": "aaa"},
                {"PartNumber": 2, "ETag": "bbb"}
            ]})
        );
    }

    #[tokio::test]
    async fn error_status_becomes_control_plane_error() {
        let (url, handle) = serve_once(500, &[], r#"{"error":"boom"}"#).await;
        let client = HttpControlPlane::new(&url, "media").unwrap();

        let err = client
            .create(&CreateUploadRequest {
                filename: "x.bin".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        match err {
            UploadError::ControlPlane(msg) => {
                assert!(msg.contains("500"), "should mention status: {msg}");
                assert!(msg.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        handle.await.unwrap();
    }
}
