//! # Storage Adapter Port
//!
//! The storage adapter is the sole backend-facing interface the manager
//! consumes. Concrete backends (object stores, presigned-URL services) live
//! outside this crate; the manager treats the adapter as a
//! dependency-injected capability and never constructs one itself.
//!
//! ## Adapter Contracts
//!
//! 1. **Idempotent delete**: removing a non-existent object succeeds
//!    silently.
//! 2. **Storage-key identity**: the `storage_key` returned by `upload` must
//!    be accepted by `get_remote_file` and `remove` to refer to the same
//!    object.
//! 3. **Progress monotonicity**: successive `on_progress` values are
//!    non-decreasing, and 100 is reported at least once on completion.
//! 4. **Error reporting**: failures are raised, never swallowed.
//!
//! The bundled [`MemoryStorage`] is the reference implementation of these
//! contracts and the workhorse of the test suite.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{UploadError, UploadResult};
use crate::models::{RemoteFileMetadata, StoredObject, TrackedFile};
use crate::plugins::{PluginContext, UploadContext};

mod memory;

pub use memory::MemoryStorage;

/// Interface implemented by storage backends.
///
/// All operations are asynchronous and atomic from the manager's point of
/// view; adapters may retry or parallelize internally but surface a single
/// result per call.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Identifier used for event scoping and logging.
    fn id(&self) -> &str {
        "storage"
    }

    /// Transfers a file's bytes to the backend.
    ///
    /// Must invoke `ctx.on_progress` with 100 when the transfer completes;
    /// intermediate values are optional but must be non-decreasing. The
    /// returned object carries the public URL, an optional storage key that
    /// round-trips through [`StorageAdapter::get_remote_file`] and
    /// [`StorageAdapter::remove`], and adapter-specific extras.
    async fn upload(&self, file: &TrackedFile, ctx: &UploadContext) -> UploadResult<StoredObject>;

    /// Resolves metadata for a previously stored object.
    ///
    /// This is the inverse of [`StorageAdapter::upload`]: given the key an
    /// upload returned, the adapter describes the same logical object.
    async fn get_remote_file(
        &self,
        storage_key: &str,
        ctx: &PluginContext,
    ) -> UploadResult<RemoteFileMetadata>;

    /// Deletes the referenced object.
    ///
    /// The adapter may use `file.storage_key` or `file.remote_url`; the
    /// manager never calls this for a file lacking both. Deleting an object
    /// that no longer exists succeeds silently.
    async fn remove(&self, file: &TrackedFile, ctx: &PluginContext) -> UploadResult<()>;

    /// Stores a standalone artifact (e.g. a generated thumbnail) under an
    /// explicit key.
    ///
    /// Optional; the default implementation reports the operation as
    /// unsupported, which plugin callers treat as non-fatal.
    async fn upload_blob(
        &self,
        data: Bytes,
        key: &str,
        content_type: &str,
    ) -> UploadResult<StoredObject> {
        let _ = (data, key, content_type);
        Err(UploadError::UnsupportedOperation {
            operation: "upload_blob".to_string(),
        })
    }
}
