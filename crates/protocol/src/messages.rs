use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::PartResult;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Allocates a new multipart upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub filename: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Asks for a pre-signed URL for one part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPartRequest {
    pub upload_id: String,
    pub key: String,
    pub part_number: u32,
}

/// Finalizes an upload from its finished parts.
///
/// `parts` must be sorted by ascending part number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub upload_id: String,
    pub key: String,
    pub parts: Vec<PartResult>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Identifiers assigned by the control plane on create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadResponse {
    pub upload_id: String,
    pub key: String,
}

/// Pre-signed URL for a single part transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignPartResponse {
    pub url: String,
}

/// Result of a successful finalize call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    /// Final object identifier.
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
}
