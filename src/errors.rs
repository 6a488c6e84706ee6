//! # Error Handling
//!
//! This module provides structured error handling for the upload manager.
//! It defines the error types surfaced by the public API, stable machine
//! codes for each error kind, and conversion into the per-file error record
//! attached to tracked files.
//!
//! ## Error Design Principles
//!
//! - **Structured Errors**: Each error variant carries relevant context
//! - **Stable Codes**: Every variant maps to a machine-readable code
//! - **File Attachment**: Terminal failures convert to a [`FileError`]
//!   recorded on the affected file and broadcast as a `file:error` event
//! - **Containment**: Plugin and adapter failures never abort batch
//!   operations; they are scoped to the file they occurred on
//!
//! ## Error Categories
//!
//! - **User input**: bad filename, validator rejection
//! - **Plugin failure**: a lifecycle hook failed
//! - **Adapter failure**: upload / metadata fetch / delete failed
//! - **Configuration failure**: initialization requires a storage adapter
//! - **Resource failure**: a remote data fetch returned a failure status

use serde_json::json;
use thiserror::Error;

use crate::models::FileError;

/// Error enumeration covering all failure conditions of the upload manager.
///
/// This enum uses the `thiserror` crate to provide automatic `Error` trait
/// implementation and display formatting. Each variant includes relevant
/// context data so callers and UIs can render meaningful messages.
#[derive(Error, Debug)]
pub enum UploadError {
    /// File source name has no derivable extension.
    #[error("Invalid file name: {name}")]
    InvalidFileName {
        /// The offending file name
        name: String,
    },

    /// No file with the given id is registered.
    #[error("File not found: {id}")]
    NotFound {
        /// The id that failed to resolve
        id: String,
    },

    /// A validator rejected the file during admission.
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Human-readable rejection reason
        message: String,
        /// Structured validator context (limit values, received values)
        details: Option<serde_json::Value>,
    },

    /// A lifecycle hook failed while operating on a file.
    #[error("Plugin `{plugin}` failed: {message}")]
    PluginFailed {
        /// Id of the plugin whose hook failed
        plugin: String,
        /// Failure description from the hook
        message: String,
    },

    /// An operation required a storage adapter and none is configured.
    #[error("No storage adapter configured")]
    NoStorageAdapter,

    /// The storage adapter raised a failure during upload, metadata fetch,
    /// or delete.
    #[error("Storage adapter error: {message}")]
    AdapterError {
        /// Detailed error message from the adapter operation
        message: String,
    },

    /// A network fetch for remote file data did not succeed.
    #[error("Fetch failed for {url}: {message}")]
    FetchFailed {
        /// URL that was being fetched
        url: String,
        /// Failure description
        message: String,
    },

    /// The requested operation is not supported for this file or adapter.
    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation {
        /// Name of the unsupported operation
        operation: String,
    },
}

impl UploadError {
    /// Returns the stable machine-readable code for this error kind.
    ///
    /// Codes are attached to [`FileError`] details and event payloads so
    /// subscribers can branch on the failure category without parsing
    /// display strings.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::InvalidFileName { .. } => "INVALID_FILE_NAME",
            UploadError::NotFound { .. } => "NOT_FOUND",
            UploadError::ValidationFailed { .. } => "VALIDATION_FAILED",
            UploadError::PluginFailed { .. } => "PLUGIN_FAILED",
            UploadError::NoStorageAdapter => "NO_STORAGE_ADAPTER",
            UploadError::AdapterError { .. } => "ADAPTER_ERROR",
            UploadError::FetchFailed { .. } => "FETCH_FAILED",
            UploadError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
        }
    }

    /// Converts the error into the record attached to a tracked file.
    ///
    /// Validator details are preserved; every other variant records its
    /// stable code so UIs can distinguish failure categories.
    pub fn to_file_error(&self) -> FileError {
        let details = match self {
            UploadError::ValidationFailed {
                details: Some(details),
                ..
            } => json!({ "code": self.code(), "context": details }),
            _ => json!({ "code": self.code() }),
        };

        FileError {
            message: self.to_string(),
            details: Some(details),
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        UploadError::FetchFailed {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

/// Type alias for Results using the crate error type.
pub type UploadResult<T> = std::result::Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_per_variant() {
        assert_eq!(
            UploadError::InvalidFileName {
                name: "noext".into()
            }
            .code(),
            "INVALID_FILE_NAME"
        );
        assert_eq!(UploadError::NoStorageAdapter.code(), "NO_STORAGE_ADAPTER");
    }

    #[test]
    fn file_error_preserves_validation_details() {
        let err = UploadError::ValidationFailed {
            message: "too large".into(),
            details: Some(json!({ "limit": 500 })),
        };

        let file_error = err.to_file_error();
        let details = file_error.details.unwrap();
        assert_eq!(details["code"], "VALIDATION_FAILED");
        assert_eq!(details["context"]["limit"], 500);
    }

    #[test]
    fn file_error_records_code_for_adapter_failures() {
        let err = UploadError::AdapterError {
            message: "bucket unreachable".into(),
        };

        let file_error = err.to_file_error();
        assert!(file_error.message.contains("bucket unreachable"));
        assert_eq!(file_error.details.unwrap()["code"], "ADAPTER_ERROR");
    }
}
