//! # Upload Manager
//!
//! The public entry point tying the subsystems together: the event bus, the
//! file registry, the resource tracker, the plugin runner, and the storage
//! adapter port. A manager is constructed from a [`ManagerConfig`], installs
//! the built-in plugins ahead of any user-supplied ones, and resolves
//! initial file references in the background.
//!
//! ## Architecture
//!
//! - **Manager**: public API surface; cheap to clone (all state is shared)
//! - **Registry**: authoritative ordered file sequence with watch channels
//! - **Runner**: executes plugin hooks per lifecycle stage
//! - **Resources**: owns object URLs, released on every exit path
//! - **Bus**: synchronous pub/sub for core and plugin-scoped events
//!
//! ## Core Flow
//!
//! ```text
//! add_file -> validate -> preprocess -> waiting   (admission)
//! upload   -> process -> uploading -> complete    (per waiting file)
//! ```
//!
//! Construction requires a Tokio runtime context when initial files or
//! auto-upload are configured; everything spawned is a lightweight
//! single-task future.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::config::{ManagerConfig, ManagerOptions};
use crate::events::{EventBus, EventPayload, FILES_UPLOADED};
use crate::models::{FileStatus, ManagerStatus, TrackedFile};
use crate::plugins::compression::ImageCompressionPlugin;
use crate::plugins::thumbnail::ThumbnailPlugin;
use crate::plugins::validators::{
    AllowedFileTypesValidator, DuplicateFileValidator, MaxFileSizeValidator, MaxFilesValidator,
};
use crate::plugins::{PluginRunner, UploadPlugin};
use crate::registry::FileRegistry;
use crate::resources::ResourceTracker;
use crate::storage::StorageAdapter;

mod init;
mod operations;
mod uploader;

#[cfg(test)]
pub(crate) mod test_support;

pub use operations::FileStream;

pub(crate) struct Inner {
    pub(crate) options: Arc<ManagerOptions>,
    pub(crate) storage: Option<Arc<dyn StorageAdapter>>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) registry: Arc<FileRegistry>,
    pub(crate) resources: ResourceTracker,
    pub(crate) runner: PluginRunner,
    pub(crate) ready_tx: watch::Sender<bool>,
    pub(crate) status_tx: watch::Sender<ManagerStatus>,
    pub(crate) uploaded_latch: AtomicBool,
    pub(crate) init_latch: AtomicBool,
    pub(crate) active_uploads: Mutex<HashSet<String>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.resources.cleanup(None);
    }
}

/// Reactive, plugin-driven file upload manager.
///
/// Cloning is cheap and every clone addresses the same shared state, which
/// is what background scheduling (auto-upload, initialization) relies on.
#[derive(Clone)]
pub struct UploadManager {
    inner: Arc<Inner>,
}

impl UploadManager {
    /// Builds a manager, installs built-in plugins, and schedules initial
    /// file resolution.
    ///
    /// Built-ins run before user-supplied plugins in this order: max-files,
    /// max-file-size, allowed-types and duplicate validators, then the
    /// thumbnail and compression processors. Each consults the active
    /// options at hook time and passes when its feature is disabled.
    pub fn new(config: ManagerConfig) -> Self {
        let ManagerConfig {
            storage,
            plugins,
            initial_files,
            options,
        } = config;

        let options = Arc::new(options);
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(FileRegistry::new());

        let mut installed: Vec<Arc<dyn UploadPlugin>> = vec![
            Arc::new(MaxFilesValidator),
            Arc::new(MaxFileSizeValidator),
            Arc::new(AllowedFileTypesValidator),
            Arc::new(DuplicateFileValidator),
            Arc::new(ThumbnailPlugin),
            Arc::new(ImageCompressionPlugin),
        ];
        installed.extend(plugins);

        let runner = PluginRunner::new(
            bus.clone(),
            registry.clone(),
            options.clone(),
            storage.clone(),
            installed,
        );

        let (ready_tx, _) = watch::channel(initial_files.is_none());
        let (status_tx, _) = watch::channel(ManagerStatus::Idle);

        let manager = Self {
            inner: Arc::new(Inner {
                options,
                storage,
                bus,
                registry,
                resources: ResourceTracker::new(),
                runner,
                ready_tx,
                status_tx,
                uploaded_latch: AtomicBool::new(false),
                init_latch: AtomicBool::new(false),
                active_uploads: Mutex::new(HashSet::new()),
            }),
        };

        manager.spawn_initialization(initial_files);
        manager
    }

    /// Watch handle over the ordered file sequence.
    pub fn files(&self) -> watch::Receiver<Vec<TrackedFile>> {
        self.inner.registry.watch_files()
    }

    /// Watch handle over the derived total progress percentage.
    pub fn total_progress(&self) -> watch::Receiver<u8> {
        self.inner.registry.watch_progress()
    }

    /// Watch handle over the readiness flag.
    ///
    /// Readiness is false while configured initial file references are
    /// still being resolved, and set regardless of resolution outcome.
    pub fn is_ready(&self) -> watch::Receiver<bool> {
        self.inner.ready_tx.subscribe()
    }

    /// Watch handle over the aggregate manager status.
    pub fn status(&self) -> watch::Receiver<ManagerStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Current snapshot of the tracked files.
    pub fn files_snapshot(&self) -> Vec<TrackedFile> {
        self.inner.registry.list()
    }

    /// Subscribes a handler to a named event.
    ///
    /// Accepts both core names (`file:added`, `upload:progress`) and
    /// fully-qualified plugin-scoped names (`imageCompression:skip`).
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.inner.bus.on(event, handler);
    }

    /// Appends a plugin; it takes effect on subsequent file operations.
    pub fn add_plugin(&self, plugin: Arc<dyn UploadPlugin>) {
        tracing::debug!(plugin = plugin.id(), "registering plugin");
        self.inner.runner.add_plugin(plugin);
    }

    /// Number of object URLs currently tracked, for diagnostics.
    pub fn object_url_count(&self) -> usize {
        self.inner.resources.tracked_count()
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.inner.ready_tx.send_replace(ready);
    }

    /// Recomputes the aggregate status from the registry.
    pub(crate) fn refresh_status(&self) {
        let files = self.inner.registry.list();

        let status = if files.iter().any(|f| f.status == FileStatus::Uploading) {
            ManagerStatus::Uploading
        } else if !files.is_empty() && files.iter().all(|f| f.status == FileStatus::Complete) {
            ManagerStatus::Complete
        } else if files.iter().any(|f| f.status == FileStatus::Error) {
            ManagerStatus::Error
        } else {
            ManagerStatus::Idle
        };

        self.inner.status_tx.send_replace(status);
    }

    /// Re-arms the `files:uploaded` latch after a mutation reintroduced a
    /// non-complete file.
    pub(crate) fn clear_uploaded_latch(&self) {
        self.inner.uploaded_latch.store(false, Ordering::SeqCst);
    }

    /// Emits `files:uploaded` once per completion cycle when every tracked
    /// file is complete.
    pub(crate) fn maybe_emit_files_uploaded(&self) {
        if self.inner.registry.all_complete()
            && !self.inner.uploaded_latch.swap(true, Ordering::SeqCst)
        {
            self.inner.bus.emit(
                FILES_UPLOADED,
                EventPayload::Files(self.inner.registry.list()),
            );
        }
    }

}
