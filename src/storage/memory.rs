//! In-memory reference implementation of the storage adapter port.
//!
//! Objects live in a guarded map keyed by storage key; URLs use the
//! `memory://{bucket}/{key}` shape. The adapter honors every port contract:
//! keys round-trip through metadata fetch and delete, deletes are
//! idempotent, and progress reports 100 on completion. Intended for tests
//! and embedding scenarios that do not need a network backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::errors::{UploadError, UploadResult};
use crate::models::{RemoteFileMetadata, StoredObject, TrackedFile};
use crate::plugins::{PluginContext, UploadContext};
use crate::storage::StorageAdapter;

struct StoredBlob {
    data: Bytes,
    content_type: String,
    checksum: String,
}

/// Storage adapter keeping every object in process memory.
pub struct MemoryStorage {
    bucket: String,
    objects: Mutex<HashMap<String, StoredBlob>>,
}

impl MemoryStorage {
    /// Creates an adapter with the given bucket label.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an object exists under the given key.
    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Returns a stored object's bytes.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|blob| blob.data.clone())
    }

    fn url_for(&self, key: &str) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }

    fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(&format!("memory://{}/", self.bucket))
    }

    fn store(&self, key: &str, data: Bytes, content_type: &str) -> StoredObject {
        let checksum = hex::encode(Sha256::digest(&data));
        let size = data.len();

        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(
            key.to_string(),
            StoredBlob {
                data,
                content_type: content_type.to_string(),
                checksum: checksum.clone(),
            },
        );

        StoredObject {
            url: self.url_for(key),
            storage_key: Some(key.to_string()),
            extra: json!({ "checksum": checksum, "size": size }),
        }
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    fn id(&self) -> &str {
        "memoryStorage"
    }

    async fn upload(&self, file: &TrackedFile, ctx: &UploadContext) -> UploadResult<StoredObject> {
        let data = file
            .data()
            .cloned()
            .ok_or_else(|| UploadError::AdapterError {
                message: format!("file `{}` has no local data to upload", file.id),
            })?;

        let result = self.store(&file.id, data, &file.mime_type);

        ctx.on_progress(100);
        tracing::debug!(file_id = %file.id, url = %result.url, "stored object");
        Ok(result)
    }

    async fn get_remote_file(
        &self,
        storage_key: &str,
        _ctx: &PluginContext,
    ) -> UploadResult<RemoteFileMetadata> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        let blob = objects
            .get(storage_key)
            .ok_or_else(|| UploadError::AdapterError {
                message: format!("no object stored under `{storage_key}`"),
            })?;

        Ok(RemoteFileMetadata {
            size: blob.data.len() as u64,
            mime_type: blob.content_type.clone(),
            remote_url: self.url_for(storage_key),
            preview: None,
            upload_result: Some(StoredObject {
                url: self.url_for(storage_key),
                storage_key: Some(storage_key.to_string()),
                extra: json!({ "checksum": blob.checksum }),
            }),
        })
    }

    async fn remove(&self, file: &TrackedFile, _ctx: &PluginContext) -> UploadResult<()> {
        let key = file
            .storage_key
            .clone()
            .or_else(|| {
                file.remote_url
                    .as_deref()
                    .and_then(|url| self.key_from_url(url))
                    .map(str::to_string)
            })
            .ok_or_else(|| UploadError::AdapterError {
                message: format!("file `{}` carries no storage reference", file.id),
            })?;

        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.remove(&key);
        Ok(())
    }

    async fn upload_blob(
        &self,
        data: Bytes,
        key: &str,
        content_type: &str,
    ) -> UploadResult<StoredObject> {
        Ok(self.store(key, data, content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::test_support::{plugin_context, upload_context};

    fn local_file(id: &str, payload: &'static [u8]) -> TrackedFile {
        TrackedFile::local(id, "a.bin", "application/octet-stream", Bytes::from_static(payload), None)
    }

    #[tokio::test]
    async fn storage_key_round_trips_through_get_and_remove() {
        let storage = MemoryStorage::new("test");
        let file = local_file("1-a.bin", b"0123456789");

        let (ctx, _progress) = upload_context();
        let result = storage.upload(&file, &ctx).await.unwrap();
        let key = result.storage_key.clone().unwrap();

        let meta = storage
            .get_remote_file(&key, &plugin_context())
            .await
            .unwrap();
        assert_eq!(meta.size, 10);
        assert_eq!(meta.remote_url, result.url);

        let mut stored = file.clone();
        stored.storage_key = Some(key.clone());
        storage.remove(&stored, &plugin_context()).await.unwrap();
        assert!(!storage.contains(&key));
    }

    #[tokio::test]
    async fn upload_reports_completion_progress() {
        let storage = MemoryStorage::new("test");
        let file = local_file("1-a.bin", b"abc");

        let (ctx, progress) = upload_context();
        storage.upload(&file, &ctx).await.unwrap();

        let seen = progress.lock().unwrap();
        assert_eq!(*seen, vec![100]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let storage = MemoryStorage::new("test");
        let mut file = local_file("1-a.bin", b"abc");
        file.storage_key = Some("never-stored".into());

        storage.remove(&file, &plugin_context()).await.unwrap();
        storage.remove(&file, &plugin_context()).await.unwrap();
    }

    #[tokio::test]
    async fn remove_accepts_a_remote_url_fallback() {
        let storage = MemoryStorage::new("test");
        let file = local_file("1-a.bin", b"abc");

        let (ctx, _progress) = upload_context();
        let result = storage.upload(&file, &ctx).await.unwrap();

        let mut by_url = file.clone();
        by_url.remote_url = Some(result.url.clone());
        storage.remove(&by_url, &plugin_context()).await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn blob_uploads_store_standalone_artifacts() {
        let storage = MemoryStorage::new("test");

        let result = storage
            .upload_blob(Bytes::from_static(b"thumb"), "a_thumb.jpg", "image/jpeg")
            .await
            .unwrap();

        assert_eq!(result.storage_key.as_deref(), Some("a_thumb.jpg"));
        assert_eq!(storage.object("a_thumb.jpg").unwrap().as_ref(), b"thumb");
    }

    #[tokio::test]
    async fn metadata_fetch_for_unknown_key_fails() {
        let storage = MemoryStorage::new("test");

        let err = storage
            .get_remote_file("ghost.jpg", &plugin_context())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::AdapterError { .. }));
    }
}
