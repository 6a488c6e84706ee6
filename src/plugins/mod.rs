//! # Plugin Contract
//!
//! Plugins extend the manager through lifecycle hooks sharing an id. The
//! manager invokes the hooks of every registered plugin at fixed stages:
//!
//! ```text
//! validate -> preprocess -> (at upload time) process -> upload -> complete
//! ```
//!
//! Plugins run in registration order within each stage. A hook observes the
//! file it operates on plus a context carrying a snapshot of the tracked
//! sequence, the active options, the storage adapter handle when one is
//! configured, and an emit function namespaced to the plugin's id.
//!
//! ## Stage Semantics
//!
//! - `validate` inspects the file and the current sequence; it fails by
//!   returning an error and must not transform the file.
//! - `preprocess` may produce UI-only side effects (previews); it must not
//!   mutate bytes or rename the file.
//! - `process` may transform bytes and replace `data`, `size`, `mime_type`
//!   and, on a format change, the id extension.
//! - `complete` performs post-upload side effects.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ManagerOptions;
use crate::errors::UploadResult;
use crate::events::EventPayload;
use crate::models::TrackedFile;
use crate::storage::StorageAdapter;

mod runner;

pub mod compression;
pub mod thumbnail;
pub mod validators;

pub use runner::PluginRunner;

/// Emit function bound to a plugin id; payloads reach the bus under
/// `<pluginId>:<action>`.
pub type EmitFn = Arc<dyn Fn(&str, EventPayload) + Send + Sync>;

/// Progress callback handed to the storage adapter during upload.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Context passed to every lifecycle hook.
pub struct PluginContext {
    /// Snapshot of the tracked sequence at the moment this plugin's hook
    /// executes. Plugins must not assume it reflects later mutations.
    pub files: Vec<TrackedFile>,

    /// Active manager options.
    pub options: Arc<ManagerOptions>,

    /// Storage adapter handle, when one is configured.
    pub storage: Option<Arc<dyn StorageAdapter>>,

    emit: EmitFn,
}

impl PluginContext {
    pub(crate) fn new(
        files: Vec<TrackedFile>,
        options: Arc<ManagerOptions>,
        storage: Option<Arc<dyn StorageAdapter>>,
        emit: EmitFn,
    ) -> Self {
        Self {
            files,
            options,
            storage,
            emit,
        }
    }

    /// Emits an event under this plugin's namespace.
    ///
    /// An action of `"skip"` emitted by the plugin registered as
    /// `imageCompression` reaches subscribers of `"imageCompression:skip"`.
    pub fn emit(&self, action: &str, payload: EventPayload) {
        (self.emit)(action, payload);
    }
}

/// Context passed to the storage adapter's upload operation.
///
/// Extends [`PluginContext`] with the progress callback the adapter must
/// invoke as the transfer advances.
pub struct UploadContext {
    /// The plugin-facing context.
    pub plugin: PluginContext,

    on_progress: ProgressFn,
}

impl UploadContext {
    pub(crate) fn new(plugin: PluginContext, on_progress: ProgressFn) -> Self {
        Self {
            plugin,
            on_progress,
        }
    }

    /// Reports transfer progress as a percentage in `[0, 100]`.
    ///
    /// Successive values must be non-decreasing; 100 must be reported at
    /// least once when the transfer completes.
    pub fn on_progress(&self, percentage: u8) {
        (self.on_progress)(percentage);
    }
}

impl std::ops::Deref for UploadContext {
    type Target = PluginContext;

    fn deref(&self) -> &Self::Target {
        &self.plugin
    }
}

/// Lifecycle stages a plugin can hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Preprocess,
    Process,
    Complete,
}

impl Stage {
    /// Lowercase stage name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Preprocess => "preprocess",
            Stage::Process => "process",
            Stage::Complete => "complete",
        }
    }
}

/// A bundle of lifecycle hooks sharing an id.
///
/// Every hook has a pass-through default, so implementations override only
/// the stages they participate in. The id must be non-empty; it prefixes
/// every event the plugin emits.
#[async_trait]
pub trait UploadPlugin: Send + Sync {
    /// Identifier used for event namespacing and failure logging.
    fn id(&self) -> &str;

    /// Inspects a file before admission; an error rejects it.
    async fn validate(&self, _file: &TrackedFile, _ctx: &PluginContext) -> UploadResult<()> {
        Ok(())
    }

    /// Produces UI-only side effects before admission.
    async fn preprocess(
        &self,
        file: TrackedFile,
        _ctx: &PluginContext,
    ) -> UploadResult<TrackedFile> {
        Ok(file)
    }

    /// Transforms the file's bytes before upload.
    async fn process(&self, file: TrackedFile, _ctx: &PluginContext) -> UploadResult<TrackedFile> {
        Ok(file)
    }

    /// Runs post-upload side effects.
    async fn complete(&self, _file: &TrackedFile, _ctx: &PluginContext) -> UploadResult<()> {
        Ok(())
    }
}
