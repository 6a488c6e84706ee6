//! # UploadKit
//!
//! A reactive, plugin-driven file upload manager with pluggable storage
//! backends. The manager ingests user-provided files, validates and
//! transforms them through a lifecycle of plugin hooks, and drives them to
//! completion against an injected storage adapter.
//!
//! ## Architecture
//!
//! The crate follows a modular architecture with clear separation of
//! concerns:
//! - **Manager**: Public API for file operations and orchestration
//! - **Registry**: Authoritative ordered file sequence with watch channels
//! - **Plugins**: Lifecycle hooks executed per stage in registration order
//! - **Storage**: Adapter port for uploads, metadata fetches, and deletes
//! - **Events**: Synchronous pub/sub for core and plugin-scoped events
//! - **Resources**: Object URL ownership with release on every exit path
//!
//! ## Core Features
//!
//! - Per-file lifecycle state machine (`waiting`, `uploading`, `complete`,
//!   `error`) with deterministic event ordering
//! - Built-in validators (max files, max size, allowed types, duplicates)
//!   and processors (thumbnails, image compression)
//! - Initialization from remote storage references, including lazily
//!   supplied reactive sources
//! - Failure containment: one file's failure never aborts a batch
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use uploadkit::config::{ManagerConfig, ManagerOptions};
//! use uploadkit::models::FileInput;
//! use uploadkit::storage::MemoryStorage;
//!
//! # async fn run() -> uploadkit::errors::UploadResult<()> {
//! let manager = uploadkit::create(ManagerConfig {
//!     storage: Some(Arc::new(MemoryStorage::new("uploads"))),
//!     options: ManagerOptions {
//!         max_file_size: Some(10 * 1024 * 1024),
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! });
//!
//! manager.on(uploadkit::events::UPLOAD_PROGRESS, |event| {
//!     if let Some(file) = event.as_file() {
//!         println!("{}: {}%", file.name, file.progress.percentage);
//!     }
//! });
//!
//! manager
//!     .add_file(FileInput::new("photo.jpg", "image/jpeg", vec![0u8; 1024]))
//!     .await?;
//! let completed = manager.upload().await?;
//! println!("uploaded {} file(s)", completed.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod logging;
pub mod manager;
pub mod models;
pub mod plugins;
pub mod registry;
pub mod resources;
pub mod storage;
pub mod utils;

pub use config::{CompressionOptions, InitialFiles, ManagerConfig, ManagerOptions, OutputFormat, ThumbnailOptions};
pub use errors::{UploadError, UploadResult};
pub use events::EventPayload;
pub use manager::{FileStream, UploadManager};
pub use models::{
    FileError, FileInput, FilePatch, FileSource, FileStatus, ManagerStatus, Progress,
    RemoteFileMetadata, RemoveOptions, RemovePolicy, StoredObject, ThumbnailRef, TrackedFile,
};
pub use plugins::{PluginContext, UploadContext, UploadPlugin};
pub use storage::{MemoryStorage, StorageAdapter};

/// Builds an [`UploadManager`] from configuration.
///
/// Equivalent to [`UploadManager::new`]; requires a Tokio runtime context
/// when initial files or auto-upload are configured.
pub fn create(config: ManagerConfig) -> UploadManager {
    UploadManager::new(config)
}
