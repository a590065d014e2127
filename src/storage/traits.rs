//! Object store trait definitions

use crate::types::{ObjectMetadata, UploadTarget, UploadedPart};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors that can occur during bucket operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object Not Found")]
    NotFound(String),

    #[error("No such upload: {0}")]
    NoSuchUpload(String),

    #[error("Invalid part: {0}")]
    InvalidPart(String),

    #[error("{0}")]
    Backend(String),
}

/// Streamed object body
pub type ObjectBody = BoxStream<'static, Result<Bytes, StorageError>>;

/// A retrieved object: streamed body plus the HTTP-facing metadata
/// the GET handler copies onto its response.
pub struct StoredObject {
    pub body: ObjectBody,
    pub metadata: ObjectMetadata,
}

/// Abstract bucket backend exposing the multipart-upload capability set.
///
/// Upload resumption is implicit: every operation that touches an
/// in-progress upload takes the (key, upload_id) pair, so no handle is
/// held between requests.
///
/// This trait is object-safe and used as `Arc<dyn ObjectStore>`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Start a multipart upload for a key
    async fn create_multipart(&self, key: &str) -> Result<UploadTarget, StorageError>;

    /// Upload one part of an in-progress upload
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<UploadedPart, StorageError>;

    /// Finalize an upload from the client-supplied part list, returning the
    /// assembled object's ETag
    async fn complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<String, StorageError>;

    /// Abort an in-progress upload, discarding its parts
    async fn abort(&self, key: &str, upload_id: &str) -> Result<(), StorageError>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Retrieve an object; `NotFound` if the key does not exist
    async fn get(&self, key: &str) -> Result<StoredObject, StorageError>;
}
