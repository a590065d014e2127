//! Domain types shared across the proxy
//!
//! Nothing here outlives a single request: upload targets and part
//! descriptors are owned by the backing services and only referenced
//! by value while a request is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies a multipart upload on the bucket backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub key: String,
    #[serde(rename = "uploadId")]
    pub upload_id: String,
}

/// A single uploaded part, echoed back to the client after mpu-uploadpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPart {
    #[serde(rename = "partNumber")]
    pub part_number: u32,
    pub etag: String,
}

/// Body of an mpu-complete request.
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub parts: Vec<UploadedPart>,
}

/// Short-lived descriptor for one part upload, issued by the upstream API.
///
/// `headers` are the exact headers the destination expects on the PUT;
/// they pass through the forwarding policy before being sent.
#[derive(Debug, Clone, Deserialize)]
pub struct PartDescriptor {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Completion metadata for one uploaded segment, PATCHed to the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionSegment {
    pub etag: String,
    pub part_number: u32,
}

/// Final response of the proxied part-upload chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayReceipt {
    pub id: String,
    #[serde(rename = "partNumber")]
    pub part_number: u32,
    pub status: String,
    pub etag: String,
}

/// HTTP-facing metadata copied onto GET responses.
#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub etag: String,
    pub content_type: Option<String>,
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
}
