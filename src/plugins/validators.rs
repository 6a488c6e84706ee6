//! # Built-in Validators
//!
//! Admission validators implementing the plugin contract. Each validator
//! reads its limits from the active options at hook time and passes when
//! its feature is disabled, so the set can be installed unconditionally.
//!
//! Rejections carry structured details (the configured limit and the
//! received value) for UI consumption.

use async_trait::async_trait;
use serde_json::json;

use crate::errors::{UploadError, UploadResult};
use crate::models::TrackedFile;
use crate::plugins::{PluginContext, UploadPlugin};

/// Plugin id of the max-files validator.
pub const MAX_FILES_ID: &str = "maxFiles";
/// Plugin id of the max-file-size validator.
pub const MAX_FILE_SIZE_ID: &str = "maxFileSize";
/// Plugin id of the allowed-types validator.
pub const ALLOWED_FILE_TYPES_ID: &str = "allowedFileTypes";
/// Plugin id of the duplicate-file validator.
pub const DUPLICATE_FILES_ID: &str = "duplicateFiles";

/// Rejects admissions that would exceed the configured file count.
pub struct MaxFilesValidator;

#[async_trait]
impl UploadPlugin for MaxFilesValidator {
    fn id(&self) -> &str {
        MAX_FILES_ID
    }

    async fn validate(&self, _file: &TrackedFile, ctx: &PluginContext) -> UploadResult<()> {
        let Some(limit) = ctx.options.max_files else {
            return Ok(());
        };

        if ctx.files.len() as u32 >= limit {
            return Err(UploadError::ValidationFailed {
                message: format!("Maximum number of files reached ({limit})"),
                details: Some(json!({ "limit": limit, "current": ctx.files.len() })),
            });
        }

        Ok(())
    }
}

/// Rejects files larger than the configured byte limit.
pub struct MaxFileSizeValidator;

#[async_trait]
impl UploadPlugin for MaxFileSizeValidator {
    fn id(&self) -> &str {
        MAX_FILE_SIZE_ID
    }

    async fn validate(&self, file: &TrackedFile, ctx: &PluginContext) -> UploadResult<()> {
        // A zero limit is treated as disabled, same as absence.
        let limit = match ctx.options.max_file_size {
            Some(limit) if limit > 0 => limit,
            _ => return Ok(()),
        };

        if file.size > limit {
            return Err(UploadError::ValidationFailed {
                message: format!(
                    "File size {} exceeds maximum allowed {}",
                    file.size, limit
                ),
                details: Some(json!({ "limit": limit, "size": file.size })),
            });
        }

        Ok(())
    }
}

/// Rejects files whose media type is not in the configured set.
pub struct AllowedFileTypesValidator;

#[async_trait]
impl UploadPlugin for AllowedFileTypesValidator {
    fn id(&self) -> &str {
        ALLOWED_FILE_TYPES_ID
    }

    async fn validate(&self, file: &TrackedFile, ctx: &PluginContext) -> UploadResult<()> {
        let allowed = match &ctx.options.allowed_file_types {
            Some(allowed) if !allowed.is_empty() => allowed,
            _ => return Ok(()),
        };

        if !allowed.iter().any(|t| t == &file.mime_type) {
            return Err(UploadError::ValidationFailed {
                message: format!("File type `{}` is not allowed", file.mime_type),
                details: Some(json!({ "allowed": allowed, "received": file.mime_type })),
            });
        }

        Ok(())
    }
}

/// Rejects files matching an already-tracked name and size.
///
/// When both the candidate and an existing file carry a last-modified
/// timestamp, the timestamps must also match for the pair to count as
/// duplicates. Skippable through the `dedupe_files` option.
pub struct DuplicateFileValidator;

#[async_trait]
impl UploadPlugin for DuplicateFileValidator {
    fn id(&self) -> &str {
        DUPLICATE_FILES_ID
    }

    async fn validate(&self, file: &TrackedFile, ctx: &PluginContext) -> UploadResult<()> {
        if !ctx.options.dedupe_files {
            return Ok(());
        }

        let duplicate = ctx.files.iter().any(|existing| {
            existing.name == file.name
                && existing.size == file.size
                && match (existing.last_modified, file.last_modified) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                }
        });

        if duplicate {
            return Err(UploadError::ValidationFailed {
                message: format!("File `{}` is already added", file.name),
                details: Some(json!({ "name": file.name, "size": file.size })),
            });
        }

        Ok(())
    }
}
