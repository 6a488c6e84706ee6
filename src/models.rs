//! # Data Models and Types
//!
//! This module defines the core data structures used throughout the upload
//! manager. All models are designed to be serializable for network
//! transmission and UI binding via JSON.
//!
//! ## Core Types
//!
//! - `TrackedFile`: Canonical entity tracked by the manager
//! - `FileSource`: Discriminates locally-owned bytes from remote references
//! - `FileStatus`: State tracking for the per-file lifecycle
//! - `StoredObject`: Opaque result returned by storage adapters
//! - `FileInput`: Caller-provided description of a file to admit
//!
//! ## Design Principles
//!
//! - All types implement `Serialize` and `Deserialize` for JSON compatibility
//! - Enums use string representations for API clarity
//! - The local/remote split is a sum type; invariants define which fields
//!   are live per case
//! - UTC timestamps for global consistency

use std::collections::HashMap;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status enumeration tracking the lifecycle of a tracked file.
///
/// The status progresses through these states:
/// 1. `Waiting` - File admitted and queued for upload
/// 2. `Uploading` - Transfer to the storage adapter is in flight
/// 3. `Complete` - Upload finished, remote location recorded
/// 4. `Error` - A validator, hook, or the adapter failed for this file
///
/// # State Transitions
///
/// ```text
/// Waiting -> Uploading -> Complete
///    |           |
///    v           v
///  Error       Error
/// ```
///
/// Remote files resolved from storage references enter directly as
/// `Complete`. Replacing a file's data returns it to `Waiting`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// File is admitted and waiting to be uploaded.
    Waiting,

    /// File is currently being transferred by the storage adapter.
    Uploading,

    /// File upload finished successfully, or the file was resolved from a
    /// remote reference.
    Complete,

    /// A terminal failure occurred for this file.
    Error,
}

impl FileStatus {
    /// Converts the status to its lowercase string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Waiting => "waiting",
            FileStatus::Uploading => "uploading",
            FileStatus::Complete => "complete",
            FileStatus::Error => "error",
        }
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" => Ok(FileStatus::Waiting),
            "uploading" => Ok(FileStatus::Uploading),
            "complete" => Ok(FileStatus::Complete),
            "error" => Ok(FileStatus::Error),
            _ => Err(format!("Invalid file status: {}", s)),
        }
    }
}

/// Origin of a tracked file's bytes.
///
/// The local/remote split is a tagged variant:
/// - `Local` owns the bytes exclusively; `data` is always present.
/// - `Storage` references bytes held by remote storage; the file's
///   `remote_url` is required instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum FileSource {
    /// File bytes are held in memory by the manager.
    Local {
        /// The owned payload.
        data: Bytes,
    },

    /// File bytes live in remote storage; only metadata is tracked.
    Storage,
}

impl FileSource {
    /// Returns true for locally-owned files.
    pub fn is_local(&self) -> bool {
        matches!(self, FileSource::Local { .. })
    }

    /// Returns true for remote storage references.
    pub fn is_remote(&self) -> bool {
        matches!(self, FileSource::Storage)
    }

    /// Returns the owned bytes for local files.
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            FileSource::Local { data } => Some(data),
            FileSource::Storage => None,
        }
    }
}

/// Upload progress for a single file.
///
/// The percentage is an integer in `[0, 100]` and is monotonically
/// non-decreasing within a single upload attempt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    /// Completion percentage in `[0, 100]`.
    pub percentage: u8,
}

impl Progress {
    /// Progress at the start of an attempt.
    pub fn zero() -> Self {
        Self { percentage: 0 }
    }

    /// Progress of a finished transfer.
    pub fn done() -> Self {
        Self { percentage: 100 }
    }
}

/// Failure record attached to a file whose status is `Error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileError {
    /// Human-readable failure description.
    pub message: String,

    /// Optional structured context (stable error code, validator limits).
    pub details: Option<Value>,
}

impl FileError {
    /// Creates a failure record from a message alone.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }
}

/// Reference to a standalone thumbnail artifact uploaded alongside a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbnailRef {
    /// Public URL of the uploaded thumbnail.
    pub url: String,

    /// Storage key of the thumbnail, when the adapter issued one.
    pub storage_key: Option<String>,
}

/// Opaque result returned by a storage adapter on successful upload.
///
/// The `url` is required; `storage_key` round-trips through the adapter's
/// metadata fetch and delete operations to refer to the same stored object.
/// Adapter-specific fields travel in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredObject {
    /// Publicly resolvable URL of the stored object.
    pub url: String,

    /// Opaque identifier accepted by `get_remote_file` and `remove`.
    pub storage_key: Option<String>,

    /// Adapter-specific payload (checksums, versions, upload receipts).
    #[serde(default)]
    pub extra: Value,
}

impl StoredObject {
    /// Creates a result with a URL alone.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            storage_key: None,
            extra: Value::Null,
        }
    }

    /// Attaches a storage key to the result.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }
}

/// Metadata resolved by a storage adapter for a previously stored object.
///
/// This is the inverse of `upload`: given the storage key returned by an
/// upload, the adapter resolves the remote location and descriptive
/// metadata of the same logical object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFileMetadata {
    /// Byte length of the stored object.
    pub size: u64,

    /// Media type of the stored object.
    pub mime_type: String,

    /// Publicly resolvable URL of the stored object.
    pub remote_url: String,

    /// Optional preview URL supplied by the adapter.
    pub preview: Option<String>,

    /// Optional upload receipt copied onto the resolved file.
    pub upload_result: Option<StoredObject>,
}

/// Canonical entity tracked by the manager.
///
/// A tracked file is either a *local* file (the manager owns the bytes and
/// will drive them to remote storage) or a *remote* file (a reference to an
/// object already held in storage, resolved during initialization).
///
/// # Invariants
///
/// - `id` is unique within a manager instance and preserves the source
///   file's extension when derivable
/// - For `source = local`, `data` is present; for `source = storage`,
///   `remote_url` is non-empty
/// - `progress.percentage` is in `[0, 100]` and monotonically
///   non-decreasing within a single upload attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedFile {
    /// Stable identifier, unique within the manager instance.
    pub id: String,

    /// Original display filename.
    pub name: String,

    /// Byte length of the file.
    pub size: u64,

    /// Media type string.
    pub mime_type: String,

    /// Origin of the file's bytes.
    #[serde(flatten)]
    pub source: FileSource,

    /// Current lifecycle status.
    pub status: FileStatus,

    /// Upload progress.
    pub progress: Progress,

    /// Optional data URL or object URL for UI rendering.
    pub preview: Option<String>,

    /// Reference to a standalone uploaded thumbnail, when produced.
    pub thumbnail: Option<ThumbnailRef>,

    /// Remote location after a successful upload or initialization.
    pub remote_url: Option<String>,

    /// Storage key issued by the adapter or provided by initialization.
    pub storage_key: Option<String>,

    /// Opaque adapter result recorded on successful upload.
    pub upload_result: Option<StoredObject>,

    /// Failure record when `status` is `Error`.
    pub error: Option<FileError>,

    /// Extensibility mapping used by plugins.
    #[serde(default)]
    pub meta: HashMap<String, Value>,

    /// Last-modified timestamp of the source, when known.
    pub last_modified: Option<DateTime<Utc>>,
}

impl TrackedFile {
    /// Builds a local file entering the lifecycle in `Waiting`.
    pub fn local(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Bytes,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        let size = data.len() as u64;
        Self {
            id: id.into(),
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            source: FileSource::Local { data },
            status: FileStatus::Waiting,
            progress: Progress::zero(),
            preview: None,
            thumbnail: None,
            remote_url: None,
            storage_key: None,
            upload_result: None,
            error: None,
            meta: HashMap::new(),
            last_modified,
        }
    }

    /// Builds a remote file resolved from a storage reference.
    ///
    /// Remote files enter directly as `Complete` with full progress; their
    /// identity derives from the storage key.
    pub fn remote(
        id: impl Into<String>,
        name: impl Into<String>,
        storage_key: impl Into<String>,
        metadata: RemoteFileMetadata,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: metadata.size,
            mime_type: metadata.mime_type,
            source: FileSource::Storage,
            status: FileStatus::Complete,
            progress: Progress::done(),
            preview: metadata.preview,
            thumbnail: None,
            remote_url: Some(metadata.remote_url),
            storage_key: Some(storage_key.into()),
            upload_result: metadata.upload_result,
            error: None,
            meta: HashMap::new(),
            last_modified: None,
        }
    }

    /// Returns the owned bytes for local files.
    pub fn data(&self) -> Option<&Bytes> {
        self.source.data()
    }

    /// Raises the progress percentage, clamped to 100.
    ///
    /// Values below the current percentage are ignored so progress is
    /// monotonically non-decreasing within an attempt.
    pub fn set_progress(&mut self, percentage: u8) {
        let percentage = percentage.min(100);
        if percentage > self.progress.percentage {
            self.progress.percentage = percentage;
        }
    }

    /// Marks the file as failed and records the failure.
    pub fn mark_error(&mut self, error: FileError) {
        self.status = FileStatus::Error;
        self.error = Some(error);
    }
}

/// Caller-provided description of a file to admit.
#[derive(Debug, Clone)]
pub struct FileInput {
    /// Original filename; must carry an extension.
    pub name: String,

    /// Media type of the payload.
    pub mime_type: String,

    /// The file bytes.
    pub data: Bytes,

    /// Last-modified timestamp of the source, when known.
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileInput {
    /// Creates an input from a name, media type, and payload.
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
            last_modified: None,
        }
    }

    /// Attaches a last-modified timestamp.
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }
}

/// Shallow patch applied by `update_file`.
///
/// Every field is optional; present fields overwrite the tracked file's
/// values, and `meta` entries are merged key by key. No events are emitted
/// for patch application.
#[derive(Debug, Clone, Default)]
pub struct FilePatch {
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub status: Option<FileStatus>,
    pub progress: Option<u8>,
    pub preview: Option<String>,
    pub thumbnail: Option<ThumbnailRef>,
    pub remote_url: Option<String>,
    pub storage_key: Option<String>,
    pub upload_result: Option<StoredObject>,
    pub error: Option<FileError>,
    pub meta: Option<HashMap<String, Value>>,
}

impl FilePatch {
    /// Applies the patch to a tracked file in place.
    pub fn apply(self, file: &mut TrackedFile) {
        if let Some(name) = self.name {
            file.name = name;
        }
        if let Some(mime_type) = self.mime_type {
            file.mime_type = mime_type;
        }
        if let Some(status) = self.status {
            file.status = status;
        }
        if let Some(progress) = self.progress {
            file.progress.percentage = progress.min(100);
        }
        if let Some(preview) = self.preview {
            file.preview = Some(preview);
        }
        if let Some(thumbnail) = self.thumbnail {
            file.thumbnail = Some(thumbnail);
        }
        if let Some(remote_url) = self.remote_url {
            file.remote_url = Some(remote_url);
        }
        if let Some(storage_key) = self.storage_key {
            file.storage_key = Some(storage_key);
        }
        if let Some(upload_result) = self.upload_result {
            file.upload_result = Some(upload_result);
        }
        if let Some(error) = self.error {
            file.error = Some(error);
        }
        if let Some(meta) = self.meta {
            file.meta.extend(meta);
        }
    }
}

/// Storage deletion policy applied by `remove_file`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RemovePolicy {
    /// Delete the remote object when the file references one.
    #[default]
    Always,

    /// Never contact the storage adapter.
    Never,

    /// Remove the local record only, leaving remote storage untouched.
    LocalOnly,
}

impl RemovePolicy {
    /// Whether this policy permits contacting the storage adapter.
    pub fn deletes_from_storage(&self) -> bool {
        matches!(self, RemovePolicy::Always)
    }
}

/// Options accepted by `remove_file`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Storage deletion policy; defaults to `Always`.
    pub delete_from_storage: RemovePolicy,
}

/// Aggregate status of the manager, derived from the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ManagerStatus {
    /// No upload in flight; some files may still be waiting.
    Idle,

    /// At least one file is currently uploading.
    Uploading,

    /// Every tracked file reached `Complete` (registry non-empty).
    Complete,

    /// No upload in flight and at least one file is in `Error`.
    Error,
}

impl ManagerStatus {
    /// Converts the status to its lowercase string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerStatus::Idle => "idle",
            ManagerStatus::Uploading => "uploading",
            ManagerStatus::Complete => "complete",
            ManagerStatus::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_file_enters_waiting_with_owned_bytes() {
        let file = TrackedFile::local(
            "1-abc.jpg",
            "photo.jpg",
            "image/jpeg",
            Bytes::from_static(b"bytes"),
            None,
        );

        assert_eq!(file.status, FileStatus::Waiting);
        assert_eq!(file.size, 5);
        assert_eq!(file.progress.percentage, 0);
        assert!(file.source.is_local());
        assert_eq!(file.data().unwrap().as_ref(), b"bytes");
    }

    #[test]
    fn remote_file_enters_complete_with_full_progress() {
        let file = TrackedFile::remote(
            "a.jpg",
            "a.jpg",
            "media/a.jpg",
            RemoteFileMetadata {
                size: 2048,
                mime_type: "image/png".into(),
                remote_url: "https://x/a.jpg".into(),
                preview: None,
                upload_result: None,
            },
        );

        assert_eq!(file.status, FileStatus::Complete);
        assert_eq!(file.progress.percentage, 100);
        assert!(file.source.is_remote());
        assert_eq!(file.remote_url.as_deref(), Some("https://x/a.jpg"));
        assert_eq!(file.storage_key.as_deref(), Some("media/a.jpg"));
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let mut file = TrackedFile::local("1-a.jpg", "a.jpg", "image/jpeg", Bytes::new(), None);

        file.set_progress(60);
        file.set_progress(30);
        assert_eq!(file.progress.percentage, 60);

        file.set_progress(120);
        assert_eq!(file.progress.percentage, 100);
    }

    #[test]
    fn patch_merges_meta_without_dropping_existing_keys() {
        let mut file = TrackedFile::local("1-a.jpg", "a.jpg", "image/jpeg", Bytes::new(), None);
        file.meta
            .insert("existing".into(), serde_json::json!("kept"));

        let mut meta = HashMap::new();
        meta.insert("added".into(), serde_json::json!(1));
        FilePatch {
            name: Some("renamed.jpg".into()),
            meta: Some(meta),
            ..Default::default()
        }
        .apply(&mut file);

        assert_eq!(file.name, "renamed.jpg");
        assert_eq!(file.meta["existing"], "kept");
        assert_eq!(file.meta["added"], 1);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            FileStatus::Waiting,
            FileStatus::Uploading,
            FileStatus::Complete,
            FileStatus::Error,
        ] {
            assert_eq!(FileStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn remove_policy_defaults_to_storage_deletion() {
        assert!(RemoveOptions::default()
            .delete_from_storage
            .deletes_from_storage());
        assert!(!RemovePolicy::Never.deletes_from_storage());
        assert!(!RemovePolicy::LocalOnly.deletes_from_storage());
    }
}
