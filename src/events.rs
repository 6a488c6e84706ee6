//! # Event Bus
//!
//! Typed publish/subscribe used by the manager and its plugins. Delivery is
//! synchronous with respect to the emitter: every handler registered before
//! an emission observes it before the emission returns, in registration
//! order.
//!
//! ## Event Name Format
//!
//! Core events use `<subject>:<action>` names (`file:added`,
//! `upload:progress`). Plugin-scoped events use `<pluginId>:<action>`;
//! subscribers match the exact fully-qualified name, so two plugins
//! emitting the same local action never collide.
//!
//! ## Failure Containment
//!
//! A panicking handler is caught and logged; remaining handlers for the
//! same emission still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::constants::PLUGIN_EVENT_SEPARATOR;
use crate::models::{FileError, TrackedFile};

/// A file entered the registry.
pub const FILE_ADDED: &str = "file:added";
/// A file left the registry.
pub const FILE_REMOVED: &str = "file:removed";
/// A file's data was replaced; carries the new file.
pub const FILE_REPLACED: &str = "file:replaced";
/// A terminal failure was recorded for a file.
pub const FILE_ERROR: &str = "file:error";
/// The registry order changed.
pub const FILES_REORDER: &str = "files:reorder";
/// An upload run started; carries the files about to be uploaded.
pub const UPLOAD_START: &str = "upload:start";
/// Progress for a single uploading file.
pub const UPLOAD_PROGRESS: &str = "upload:progress";
/// An upload run finished; carries the files completed by that run.
pub const UPLOAD_COMPLETE: &str = "upload:complete";
/// Every tracked file reached completion.
pub const FILES_UPLOADED: &str = "files:uploaded";
/// Initial file references resolved successfully.
pub const INITIAL_FILES_LOADED: &str = "initialFiles:loaded";
/// Initial file resolution failed.
pub const INITIAL_FILES_ERROR: &str = "initialFiles:error";

/// Payload delivered to event handlers.
///
/// Core events use the typed variants; plugin-scoped events carry opaque
/// JSON in `Custom`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// A single tracked file.
    File(TrackedFile),

    /// A file together with the failure recorded for it.
    FileError {
        file: TrackedFile,
        error: FileError,
    },

    /// An ordered sequence of tracked files.
    Files(Vec<TrackedFile>),

    /// Progress update for one uploading file.
    Progress { file: TrackedFile, progress: u8 },

    /// Registry reorder indices.
    Reorder { old_index: usize, new_index: usize },

    /// A plain message, used for failure causes.
    Message(String),

    /// Opaque plugin payload.
    Custom(Value),
}

impl EventPayload {
    /// Returns the file for single-file payloads.
    pub fn as_file(&self) -> Option<&TrackedFile> {
        match self {
            EventPayload::File(file)
            | EventPayload::FileError { file, .. }
            | EventPayload::Progress { file, .. } => Some(file),
            _ => None,
        }
    }

    /// Returns the file sequence for multi-file payloads.
    pub fn as_files(&self) -> Option<&[TrackedFile]> {
        match self {
            EventPayload::Files(files) => Some(files),
            _ => None,
        }
    }
}

/// Handler invoked synchronously on emission.
pub type EventHandler = Arc<dyn Fn(&EventPayload) + Send + Sync>;

/// Minimal subject:action publish/subscribe bus.
///
/// Subscription is additive; handlers for the same event run in
/// registration order. The bus holds no state beyond its handler map.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<EventHandler>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the fully-qualified name of a plugin-scoped event.
    pub fn scoped(plugin_id: &str, action: &str) -> String {
        format!("{}{}{}", plugin_id, PLUGIN_EVENT_SEPARATOR, action)
    }

    /// Registers a handler for an event name.
    ///
    /// Accepts both core names and fully-qualified plugin-scoped names.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers
            .entry(event.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Delivers a payload to every handler of the event, in registration
    /// order.
    ///
    /// Handler panics are contained and logged; delivery to the remaining
    /// handlers continues.
    pub fn emit(&self, event: &str, payload: EventPayload) {
        let subscribers: Vec<EventHandler> = {
            let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers.get(event).cloned().unwrap_or_default()
        };

        for handler in subscribers {
            if catch_unwind(AssertUnwindSafe(|| handler(&payload))).is_err() {
                tracing::error!(event, "event handler panicked during delivery");
            }
        }
    }

    /// Number of handlers registered for an event name.
    pub fn handler_count(&self, event: &str) -> usize {
        let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.get(event).map(|h| h.len()).unwrap_or(0)
    }
}
