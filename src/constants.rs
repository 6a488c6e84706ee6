//! # Application Constants
//!
//! This module defines crate-wide constants used throughout the upload
//! manager. Centralizing constants improves maintainability and reduces the
//! risk of inconsistencies across the codebase.
//!
//! ## Defaults
//!
//! Default processor settings applied when a feature is enabled without an
//! explicit options record.
//!
//! ## Limits
//!
//! Size thresholds and warning boundaries following the behavior of the
//! public API contracts.

/// Scheme used for object URLs minted by the resource tracker.
pub const OBJECT_URL_SCHEME: &str = "memory://";

/// Byte size above which `get_file_data` logs a warning (100 MB).
pub const LARGE_FILE_WARNING_BYTES: u64 = 104_857_600;

/// Chunk size used when streaming local file data (64 KB).
pub const STREAM_CHUNK_SIZE: usize = 65_536;

/// Default bounding width for generated thumbnails.
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 200;

/// Default bounding height for generated thumbnails.
pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 200;

/// Default JPEG quality for generated thumbnails.
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 75;

/// Default bounding width for recompressed images.
pub const DEFAULT_COMPRESSION_MAX_WIDTH: u32 = 1920;

/// Default bounding height for recompressed images.
pub const DEFAULT_COMPRESSION_MAX_HEIGHT: u32 = 1920;

/// Default re-encode quality for recompressed images.
pub const DEFAULT_COMPRESSION_QUALITY: u8 = 80;

/// Minimum source size before recompression is attempted (100 KB).
pub const DEFAULT_MIN_SIZE_TO_COMPRESS: u64 = 102_400;

/// Suffix inserted before the extension of uploaded thumbnail artifacts.
pub const THUMBNAIL_KEY_SUFFIX: &str = "_thumb";

/// Separator between a plugin id and its event action.
pub const PLUGIN_EVENT_SEPARATOR: char = ':';
