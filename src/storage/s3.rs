//! S3 bucket backend using the AWS SDK
//!
//! All objects and multipart uploads live in a single configured bucket;
//! the proxy never creates or lists buckets.

use super::traits::{ObjectStore, StorageError, StoredObject};
use crate::config::BackendConfig;
use crate::types::{ObjectMetadata, UploadTarget, UploadedPart};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// S3 bucket backend
pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    /// Create a new S3 backend from configuration
    pub async fn new(config: &BackendConfig) -> Result<Self, StorageError> {
        let (endpoint, region, force_path_style, bucket, access_key_id, secret_access_key) =
            match config {
                BackendConfig::S3 {
                    endpoint,
                    region,
                    force_path_style,
                    bucket,
                    access_key_id,
                    secret_access_key,
                } => (
                    endpoint.clone(),
                    region.clone(),
                    *force_path_style,
                    bucket.clone(),
                    access_key_id.clone(),
                    secret_access_key.clone(),
                ),
                _ => {
                    return Err(StorageError::Backend(
                        "S3Backend requires S3 configuration".to_string(),
                    ))
                }
            };

        // Require explicit credentials — never fall back to the default AWS credential chain
        // (env vars, ~/.aws/credentials, instance metadata, etc.)
        let credentials = match (access_key_id, secret_access_key) {
            (Some(ref key_id), Some(ref secret)) => {
                Credentials::new(key_id, secret, None, None, "uplink_proxy-config")
            }
            _ => {
                return Err(StorageError::Backend(
                    "S3 backend requires explicit credentials: set ULP_BE_AWS_ACCESS_KEY_ID and ULP_BE_AWS_SECRET_ACCESS_KEY".to_string(),
                ));
            }
        };

        // Build S3 client directly — no aws-config needed since we use static credentials
        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(force_path_style);

        if let Some(ref ep) = endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(ep);
        }

        debug!("S3Backend initialized for bucket {}", bucket);
        Ok(Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket,
        })
    }

    /// Map an SDK error onto our storage taxonomy. The SDK does not expose
    /// typed variants for every multipart failure, so unknown-upload is
    /// matched on the error code string.
    fn classify_sdk_error(upload_id: &str, e: &SdkError<impl std::fmt::Debug>) -> StorageError {
        let debug_str = format!("{:?}", e);
        if debug_str.contains("NoSuchUpload") {
            return StorageError::NoSuchUpload(upload_id.to_string());
        }
        if debug_str.contains("InvalidPart") {
            return StorageError::InvalidPart(format!("{:?}", e));
        }
        StorageError::Backend(format!("{}", e))
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self))]
    async fn create_multipart(&self, key: &str) -> Result<UploadTarget, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("create_multipart_upload failed: {}", e)))?;

        let upload_id = output
            .upload_id
            .ok_or_else(|| StorageError::Backend("S3 returned no upload id".to_string()))?;

        Ok(UploadTarget {
            key: key.to_string(),
            upload_id,
        })
    }

    #[instrument(skip(self, body))]
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<UploadedPart, StorageError> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Self::classify_sdk_error(upload_id, &e))?;

        let etag = output
            .e_tag
            .ok_or_else(|| StorageError::Backend("S3 returned no part ETag".to_string()))?;

        Ok(UploadedPart { part_number, etag })
    }

    #[instrument(skip(self, parts))]
    async fn complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<String, StorageError> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number as i32)
                    .e_tag(p.etag.clone())
                    .build()
            })
            .collect();

        let multipart = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(multipart)
            .send()
            .await
            .map_err(|e| Self::classify_sdk_error(upload_id, &e))?;

        output
            .e_tag
            .ok_or_else(|| StorageError::Backend("S3 returned no object ETag".to_string()))
    }

    #[instrument(skip(self))]
    async fn abort(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| Self::classify_sdk_error(upload_id, &e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        // DeleteObject is idempotent: a missing key still returns 204
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("delete_object failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<StoredObject, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if let SdkError::ServiceError(service_error) = &e {
                    if matches!(service_error.err(), GetObjectError::NoSuchKey(_)) {
                        return StorageError::NotFound(key.to_string());
                    }
                }
                StorageError::Backend(format!("get_object failed: {}", e))
            })?;

        debug!("S3 GET stream {}/{}", self.bucket, key);

        let metadata = ObjectMetadata {
            etag: response.e_tag.clone().unwrap_or_default(),
            content_type: response.content_type.clone(),
            content_length: response.content_length.unwrap_or(0).max(0) as u64,
            last_modified: response
                .last_modified
                .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                .unwrap_or_else(Utc::now),
        };

        // Stream chunks directly from the S3 response body without buffering.
        let stream = futures::stream::unfold(response.body, |mut body| async {
            match body.try_next().await {
                Ok(Some(chunk)) => Some((Ok(chunk), body)),
                Ok(None) => None,
                Err(e) => Some((
                    Err(StorageError::Backend(format!(
                        "Failed to read response body: {}",
                        e
                    ))),
                    body,
                )),
            }
        });

        Ok(StoredObject {
            body: Box::pin(stream),
            metadata,
        })
    }
}
