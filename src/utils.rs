//! # Utility Functions
//!
//! This module provides utility functions used throughout the upload
//! manager. It includes functions for generating unique file identifiers,
//! deriving storage keys for auxiliary artifacts, classifying media types,
//! and encoding data URLs for previews.
//!
//! ## Identifier Strategy
//!
//! File ids combine a millisecond timestamp with a UUID v4 and preserve the
//! source file's extension:
//!
//! ```text
//! {timestamp}-{uuid}.{ext}
//! ```
//!
//! The timestamp prefix keeps ids sortable by admission time; the UUID
//! component guarantees uniqueness within and across manager instances.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::errors::{UploadError, UploadResult};

/// Extracts the extension from a filename.
///
/// The extension is the segment after the final dot, provided the dot is
/// neither the first nor the last character. Hidden files (`.gitignore`)
/// and bare names yield `None`.
pub fn file_extension(name: &str) -> Option<&str> {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) if idx + 1 == name.len() => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Generates a unique file identifier preserving the source extension.
///
/// Returns an identifier in the format `{timestamp}-{uuid}.{ext}` where
/// `ext` comes from the provided name. Fails with
/// [`UploadError::InvalidFileName`] when no extension is derivable.
///
/// # Example
///
/// ```rust
/// let id = uploadkit::utils::generate_file_id("photo.jpg").unwrap();
/// assert!(id.ends_with(".jpg"));
/// ```
pub fn generate_file_id(name: &str) -> UploadResult<String> {
    let ext = file_extension(name).ok_or_else(|| UploadError::InvalidFileName {
        name: name.to_string(),
    })?;

    let timestamp = Utc::now().timestamp_millis();
    Ok(format!("{}-{}.{}", timestamp, Uuid::new_v4(), ext))
}

/// Sanitizes a filename for use in storage keys.
///
/// Removes path separators and characters that are problematic in storage
/// systems while preserving the file extension.
pub fn sanitize_filename(filename: &str) -> String {
    let filename = filename.trim();

    let safe_chars: String = filename
        .chars()
        .filter(|c| !"/\\:*?\"<>|".contains(*c))
        .take(255)
        .collect();

    if safe_chars.is_empty() {
        "unknown".to_string()
    } else {
        safe_chars
    }
}

/// Derives the storage key for a file's thumbnail artifact.
///
/// Inserts `_thumb` before the extension: `abc.jpg` becomes
/// `abc_thumb.jpg`. Identifiers without an extension get the suffix
/// appended.
pub fn thumbnail_key(id: &str) -> String {
    match id.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < id.len() => {
            format!(
                "{}{}.{}",
                &id[..idx],
                crate::constants::THUMBNAIL_KEY_SUFFIX,
                &id[idx + 1..]
            )
        }
        _ => format!("{}{}", id, crate::constants::THUMBNAIL_KEY_SUFFIX),
    }
}

/// Replaces the extension of an identifier, appending when absent.
pub fn replace_extension(id: &str, new_ext: &str) -> String {
    match id.rfind('.') {
        Some(idx) if idx > 0 => format!("{}.{}", &id[..idx], new_ext),
        _ => format!("{}.{}", id, new_ext),
    }
}

/// Returns the last path segment of a storage key.
///
/// Used to derive display names and ids for files resolved from remote
/// references: `media/2024/a.jpg` yields `a.jpg`.
pub fn last_path_segment(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Whether a media type is a raster image the bundled processors handle.
///
/// GIF and vector formats are excluded: animated GIFs lose frames under
/// re-encoding and vector formats have no pixel dimensions to bound.
pub fn is_raster_image(mime_type: &str) -> bool {
    let mime_type = mime_type.to_lowercase();
    mime_type.starts_with("image/")
        && mime_type != "image/gif"
        && mime_type != "image/svg+xml"
}

/// Whether a media type is a video format.
pub fn is_video(mime_type: &str) -> bool {
    mime_type.to_lowercase().starts_with("video/")
}

/// Encodes bytes as a `data:` URL with the given media type.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64.encode(data))
}

/// Decodes a `data:` URL into its media type and payload.
///
/// Returns `None` for non-data URLs and undecodable payloads.
pub fn parse_data_url(url: &str) -> Option<(String, Bytes)> {
    let rest = url.strip_prefix("data:")?;
    let (mime_type, payload) = rest.split_once(";base64,")?;
    let decoded = BASE64.decode(payload).ok()?;
    Some((mime_type.to_string(), Bytes::from(decoded)))
}
