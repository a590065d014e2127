//! In-memory bucket backend
//!
//! Parts are buffered in memory until complete() assembles them into a
//! stored object. Everything is ephemeral — lost on restart; meant for
//! local development and the integration test suite.

use super::traits::{ObjectStore, StorageError, StoredObject};
use crate::types::{ObjectMetadata, UploadTarget, UploadedPart};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use parking_lot::RwLock;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Data for a single uploaded part
struct PartData {
    data: Bytes,
    md5_hex: String,
    md5_raw: [u8; 16],
}

/// State for an in-progress multipart upload
struct MultipartUpload {
    key: String,
    parts: HashMap<u32, PartData>,
}

/// A finalized object
struct StoredEntry {
    data: Bytes,
    etag: String,
    created_at: DateTime<Utc>,
}

/// Thread-safe in-memory bucket with multipart upload state
pub struct MemoryBackend {
    uploads: RwLock<HashMap<String, MultipartUpload>>,
    objects: RwLock<HashMap<String, StoredEntry>>,
    id_counter: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            uploads: RwLock::new(HashMap::new()),
            objects: RwLock::new(HashMap::new()),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Derive an opaque upload id: SHA256(counter + timestamp_nanos + key),
    /// first 32 hex chars.
    fn next_upload_id(&self, key: &str) -> String {
        let counter = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(counter.to_le_bytes());
        hasher.update(nanos.to_le_bytes());
        hasher.update(key.as_bytes());
        let hash = hasher.finalize();
        hex::encode(&hash[..16])
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn create_multipart(&self, key: &str) -> Result<UploadTarget, StorageError> {
        let upload_id = self.next_upload_id(key);
        self.uploads.write().insert(
            upload_id.clone(),
            MultipartUpload {
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        debug!("created multipart upload {} for {}", upload_id, key);
        Ok(UploadTarget {
            key: key.to_string(),
            upload_id,
        })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<UploadedPart, StorageError> {
        if !(1..=10000).contains(&part_number) {
            return Err(StorageError::InvalidPart(
                "Part number must be between 1 and 10000".to_string(),
            ));
        }

        let md5_raw: [u8; 16] = Md5::digest(&body).into();
        let md5_hex = hex::encode(md5_raw);
        let etag = format!("\"{}\"", md5_hex);

        let mut uploads = self.uploads.write();
        let upload = uploads
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| StorageError::NoSuchUpload(upload_id.to_string()))?;

        // Overwrite semantics: re-uploading same part_number replaces previous data
        upload.parts.insert(
            part_number,
            PartData {
                data: body,
                md5_hex,
                md5_raw,
            },
        );

        Ok(UploadedPart { part_number, etag })
    }

    async fn complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<String, StorageError> {
        let mut uploads = self.uploads.write();
        let upload = uploads
            .get(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| StorageError::NoSuchUpload(upload_id.to_string()))?;

        if parts.is_empty() {
            return Err(StorageError::InvalidPart(
                "You must specify at least one part".to_string(),
            ));
        }

        // Validate ascending order
        for window in parts.windows(2) {
            if window[0].part_number >= window[1].part_number {
                return Err(StorageError::InvalidPart(
                    "The list of parts was not in ascending order".to_string(),
                ));
            }
        }

        let mut md5_concat = Vec::new();
        let mut assembled = BytesMut::new();

        for requested in parts {
            let part = upload.parts.get(&requested.part_number).ok_or_else(|| {
                StorageError::InvalidPart(format!(
                    "Part {} has not been uploaded",
                    requested.part_number
                ))
            })?;

            // Normalize ETags for comparison (strip quotes)
            if requested.etag.trim_matches('"') != part.md5_hex {
                return Err(StorageError::InvalidPart(format!(
                    "ETag mismatch for part {}",
                    requested.part_number
                )));
            }

            md5_concat.extend_from_slice(&part.md5_raw);
            assembled.extend_from_slice(&part.data);
        }

        // S3-compatible multipart ETag: MD5(concat of part MD5 raw bytes)-N
        let final_md5 = Md5::digest(&md5_concat);
        let etag = format!("\"{}-{}\"", hex::encode(final_md5), parts.len());

        self.objects.write().insert(
            key.to_string(),
            StoredEntry {
                data: assembled.freeze(),
                etag: etag.clone(),
                created_at: Utc::now(),
            },
        );

        // The upload is finalized; completing it again is NoSuchUpload
        uploads.remove(upload_id);
        debug!("completed multipart upload {} for {}", upload_id, key);

        Ok(etag)
    }

    async fn abort(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        let mut uploads = self.uploads.write();
        uploads
            .get(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| StorageError::NoSuchUpload(upload_id.to_string()))?;
        uploads.remove(upload_id);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.write().remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StorageError> {
        let objects = self.objects.read();
        let entry = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let metadata = ObjectMetadata {
            etag: entry.etag.clone(),
            content_type: None,
            content_length: entry.data.len() as u64,
            last_modified: entry.created_at,
        };
        let data = entry.data.clone();
        Ok(StoredObject {
            body: Box::pin(futures::stream::once(async move { Ok(data) })),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(mut obj: StoredObject) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = obj.body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_create_and_upload_part() {
        let store = MemoryBackend::new();
        let target = store.create_multipart("key.bin").await.unwrap();
        assert_eq!(target.key, "key.bin");

        let part = store
            .upload_part("key.bin", &target.upload_id, 1, Bytes::from(vec![0u8; 1024]))
            .await
            .unwrap();
        assert_eq!(part.part_number, 1);
        assert!(part.etag.starts_with('"'));
        assert!(part.etag.ends_with('"'));
    }

    #[tokio::test]
    async fn test_complete_roundtrip() {
        let store = MemoryBackend::new();
        let target = store.create_multipart("key.bin").await.unwrap();

        let part1 = store
            .upload_part("key.bin", &target.upload_id, 1, Bytes::from(vec![1u8; 100]))
            .await
            .unwrap();
        let part2 = store
            .upload_part("key.bin", &target.upload_id, 2, Bytes::from(vec![2u8; 200]))
            .await
            .unwrap();

        let etag = store
            .complete("key.bin", &target.upload_id, &[part1, part2])
            .await
            .unwrap();
        assert!(etag.ends_with("-2\""));

        let obj = store.get("key.bin").await.unwrap();
        assert_eq!(obj.metadata.etag, etag);
        assert_eq!(obj.metadata.content_length, 300);
        let data = collect(obj).await;
        assert_eq!(&data[..100], &[1u8; 100]);
        assert_eq!(&data[100..], &[2u8; 200]);
    }

    #[tokio::test]
    async fn test_complete_twice_is_no_such_upload() {
        let store = MemoryBackend::new();
        let target = store.create_multipart("key.bin").await.unwrap();
        let part = store
            .upload_part("key.bin", &target.upload_id, 1, Bytes::from_static(b"x"))
            .await
            .unwrap();

        store
            .complete("key.bin", &target.upload_id, &[part.clone()])
            .await
            .unwrap();
        let again = store.complete("key.bin", &target.upload_id, &[part]).await;
        assert!(matches!(again, Err(StorageError::NoSuchUpload(_))));
    }

    #[tokio::test]
    async fn test_abort() {
        let store = MemoryBackend::new();
        let target = store.create_multipart("key.bin").await.unwrap();
        store.abort("key.bin", &target.upload_id).await.unwrap();

        let result = store
            .upload_part("key.bin", &target.upload_id, 1, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(result, Err(StorageError::NoSuchUpload(_))));
    }

    #[tokio::test]
    async fn test_abort_unknown_upload_fails() {
        let store = MemoryBackend::new();
        let result = store.abort("key.bin", "nope").await;
        assert!(matches!(result, Err(StorageError::NoSuchUpload(_))));
    }

    #[tokio::test]
    async fn test_key_mismatch_is_no_such_upload() {
        let store = MemoryBackend::new();
        let target = store.create_multipart("a.bin").await.unwrap();

        let result = store
            .upload_part("b.bin", &target.upload_id, 1, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(result, Err(StorageError::NoSuchUpload(_))));
    }

    #[tokio::test]
    async fn test_invalid_part_number() {
        let store = MemoryBackend::new();
        let target = store.create_multipart("key.bin").await.unwrap();

        for bad in [0u32, 10001] {
            let result = store
                .upload_part("key.bin", &target.upload_id, bad, Bytes::from_static(b"x"))
                .await;
            assert!(matches!(result, Err(StorageError::InvalidPart(_))));
        }
    }

    #[tokio::test]
    async fn test_complete_etag_mismatch() {
        let store = MemoryBackend::new();
        let target = store.create_multipart("key.bin").await.unwrap();
        store
            .upload_part("key.bin", &target.upload_id, 1, Bytes::from_static(b"x"))
            .await
            .unwrap();

        let wrong = UploadedPart {
            part_number: 1,
            etag: "\"deadbeef\"".to_string(),
        };
        let result = store.complete("key.bin", &target.upload_id, &[wrong]).await;
        assert!(matches!(result, Err(StorageError::InvalidPart(_))));
    }

    #[tokio::test]
    async fn test_overwrite_part() {
        let store = MemoryBackend::new();
        let target = store.create_multipart("key.bin").await.unwrap();

        let first = store
            .upload_part("key.bin", &target.upload_id, 1, Bytes::from(vec![1u8; 100]))
            .await
            .unwrap();
        let second = store
            .upload_part("key.bin", &target.upload_id, 1, Bytes::from(vec![2u8; 100]))
            .await
            .unwrap();
        assert_ne!(first.etag, second.etag);

        let etag = store
            .complete("key.bin", &target.upload_id, &[second])
            .await
            .unwrap();
        let data = collect(store.get("key.bin").await.unwrap()).await;
        assert_eq!(data, vec![2u8; 100]);
        assert!(etag.ends_with("-1\""));
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = MemoryBackend::new();
        assert!(store.delete("never-stored").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryBackend::new();
        let result = store.get("nope").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}
