//! # Configuration Management
//!
//! This module provides configuration for the upload manager. Construction
//! takes a [`ManagerConfig`] combining serializable options with the
//! injected capabilities (storage adapter, additional plugins, initial file
//! references); [`ManagerOptions`] carries the limits and feature flags and
//! is what plugins see at hook time.
//!
//! ## Configuration Options
//!
//! - `max_files`: maximum number of tracked files; `None` disables the limit
//! - `max_file_size`: maximum file size in bytes; `None` disables the limit
//! - `allowed_file_types`: admitted MIME types; `None` admits everything
//! - `thumbnails`: thumbnail generation options; `None` disables generation
//! - `image_compression`: recompression options; `None` disables it
//! - `auto_upload`: upload immediately after admission
//! - `dedupe_files`: reject files matching an already-tracked name and size
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use uploadkit::config::{ManagerConfig, ManagerOptions, ThumbnailOptions};
//! use uploadkit::storage::MemoryStorage;
//!
//! let config = ManagerConfig {
//!     storage: Some(Arc::new(MemoryStorage::new("uploads"))),
//!     options: ManagerOptions {
//!         max_files: Some(10),
//!         thumbnails: Some(ThumbnailOptions::default()),
//!         auto_upload: true,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::constants::{
    DEFAULT_COMPRESSION_MAX_HEIGHT, DEFAULT_COMPRESSION_MAX_WIDTH, DEFAULT_COMPRESSION_QUALITY,
    DEFAULT_MIN_SIZE_TO_COMPRESS, DEFAULT_THUMBNAIL_HEIGHT, DEFAULT_THUMBNAIL_QUALITY,
    DEFAULT_THUMBNAIL_WIDTH,
};
use crate::plugins::UploadPlugin;
use crate::storage::StorageAdapter;

/// Options for the bundled thumbnail processor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailOptions {
    /// Maximum thumbnail width in pixels.
    pub width: u32,

    /// Maximum thumbnail height in pixels.
    pub height: u32,

    /// JPEG quality of the generated thumbnail.
    pub quality: u8,

    /// Upload the thumbnail as a standalone artifact during processing.
    pub upload: bool,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_THUMBNAIL_WIDTH,
            height: DEFAULT_THUMBNAIL_HEIGHT,
            quality: DEFAULT_THUMBNAIL_QUALITY,
            upload: false,
        }
    }
}

/// Target encoding for recompressed images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Keep the source format.
    #[default]
    Auto,

    /// Re-encode as JPEG at the configured quality.
    Jpeg,

    /// Re-encode as PNG.
    Png,

    /// Re-encode as (lossless) WebP.
    WebP,
}

impl OutputFormat {
    /// File extension associated with the format, when fixed.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Auto => None,
            OutputFormat::Jpeg => Some("jpg"),
            OutputFormat::Png => Some("png"),
            OutputFormat::WebP => Some("webp"),
        }
    }

    /// Media type associated with the format, when fixed.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Auto => None,
            OutputFormat::Jpeg => Some("image/jpeg"),
            OutputFormat::Png => Some("image/png"),
            OutputFormat::WebP => Some("image/webp"),
        }
    }
}

/// Options for the bundled image compression processor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompressionOptions {
    /// Maximum output width in pixels; larger sources are scaled down.
    pub max_width: u32,

    /// Maximum output height in pixels; larger sources are scaled down.
    pub max_height: u32,

    /// Re-encode quality for lossy formats.
    pub quality: u8,

    /// Target encoding; `Auto` preserves the source format.
    pub output_format: OutputFormat,

    /// Sources below this byte size are not recompressed.
    pub min_size_to_compress: u64,

    /// Copy EXIF metadata from JPEG sources onto JPEG output.
    pub preserve_metadata: bool,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_COMPRESSION_MAX_WIDTH,
            max_height: DEFAULT_COMPRESSION_MAX_HEIGHT,
            quality: DEFAULT_COMPRESSION_QUALITY,
            output_format: OutputFormat::Auto,
            min_size_to_compress: DEFAULT_MIN_SIZE_TO_COMPRESS,
            preserve_metadata: false,
        }
    }
}

/// Serializable limits and feature flags of a manager instance.
///
/// This is the configuration plugins observe through their context. All
/// limits use `None` as the disabled sentinel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManagerOptions {
    /// Maximum number of tracked files; `None` disables the limit.
    pub max_files: Option<u32>,

    /// Maximum file size in bytes; `None` disables the limit.
    pub max_file_size: Option<u64>,

    /// Admitted MIME types; `None` or empty admits everything.
    pub allowed_file_types: Option<Vec<String>>,

    /// Thumbnail generation options; `None` disables generation.
    pub thumbnails: Option<ThumbnailOptions>,

    /// Image recompression options; `None` disables recompression.
    pub image_compression: Option<CompressionOptions>,

    /// Upload files immediately after admission.
    pub auto_upload: bool,

    /// Reject files matching an already-tracked name and size.
    pub dedupe_files: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_files: None,
            max_file_size: None,
            allowed_file_types: None,
            thumbnails: None,
            image_compression: None,
            auto_upload: false,
            dedupe_files: true,
        }
    }
}

/// Declarative references to files already held in remote storage.
///
/// The manager resolves these at construction time through the storage
/// adapter's metadata fetch, pre-populating the registry with remote
/// files. The `Reactive` form defers resolution until a defined, non-empty
/// value appears on the channel; resolution happens exactly once.
#[derive(Clone, Debug, Default)]
pub enum InitialFiles {
    /// No initial files; the manager is ready immediately.
    #[default]
    None,

    /// A single storage key.
    Single(String),

    /// An ordered sequence of storage keys.
    Many(Vec<String>),

    /// A lazily supplied sequence of storage keys.
    Reactive(watch::Receiver<Option<Vec<String>>>),
}

impl InitialFiles {
    /// Whether any resolution work is configured.
    pub fn is_none(&self) -> bool {
        matches!(self, InitialFiles::None)
    }
}

/// Construction-time input for a manager instance.
///
/// Combines the serializable [`ManagerOptions`] with the injected
/// capabilities: the storage adapter, additional plugins appended after the
/// built-ins, and initial file references.
#[derive(Default)]
pub struct ManagerConfig {
    /// Storage adapter driving uploads, metadata fetches, and deletes.
    pub storage: Option<Arc<dyn StorageAdapter>>,

    /// Additional plugins, executed after the built-ins in order.
    pub plugins: Vec<Arc<dyn UploadPlugin>>,

    /// References to files already in remote storage.
    pub initial_files: InitialFiles,

    /// Limits and feature flags.
    pub options: ManagerOptions,
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("storage", &self.storage.as_ref().map(|s| s.id().to_string()))
            .field(
                "plugins",
                &self
                    .plugins
                    .iter()
                    .map(|p| p.id().to_string())
                    .collect::<Vec<_>>(),
            )
            .field("initial_files", &self.initial_files)
            .field("options", &self.options)
            .finish()
    }
}
