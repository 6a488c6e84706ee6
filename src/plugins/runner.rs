//! # Plugin Runner
//!
//! Executes one lifecycle stage across the registered plugin sequence for a
//! single file at a time. The runner owns the plugin list, builds a fresh
//! context per plugin invocation (files snapshot taken at that moment), and
//! caches one emit closure per plugin id for the manager's lifetime.
//!
//! ## Failure Containment
//!
//! - A failing `validate` hook aborts the stage; the triggering operation
//!   reports the rejection to its caller.
//! - A failing `preprocess` or `process` hook makes the runner broadcast
//!   `file:error` for the affected file, log the plugin id, and return the
//!   failure for the lifecycle controller to act on.
//! - `complete` hook failures are logged and never propagate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::config::ManagerOptions;
use crate::errors::{UploadError, UploadResult};
use crate::events::{EventBus, EventPayload, FILE_ERROR};
use crate::models::TrackedFile;
use crate::plugins::{EmitFn, PluginContext, ProgressFn, Stage, UploadContext, UploadPlugin};
use crate::registry::FileRegistry;
use crate::storage::StorageAdapter;

/// Stage executor over the registered plugin sequence.
pub struct PluginRunner {
    plugins: RwLock<Vec<Arc<dyn UploadPlugin>>>,
    emitters: Mutex<HashMap<String, EmitFn>>,
    bus: Arc<EventBus>,
    registry: Arc<FileRegistry>,
    options: Arc<ManagerOptions>,
    storage: Option<Arc<dyn StorageAdapter>>,
}

impl PluginRunner {
    /// Creates a runner over an initial plugin sequence.
    pub fn new(
        bus: Arc<EventBus>,
        registry: Arc<FileRegistry>,
        options: Arc<ManagerOptions>,
        storage: Option<Arc<dyn StorageAdapter>>,
        plugins: Vec<Arc<dyn UploadPlugin>>,
    ) -> Self {
        Self {
            plugins: RwLock::new(plugins),
            emitters: Mutex::new(HashMap::new()),
            bus,
            registry,
            options,
            storage,
        }
    }

    /// Appends a plugin; it participates in subsequent stage runs.
    pub fn add_plugin(&self, plugin: Arc<dyn UploadPlugin>) {
        let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
        plugins.push(plugin);
    }

    /// Snapshot of the registered plugins, in registration order.
    pub fn plugins(&self) -> Vec<Arc<dyn UploadPlugin>> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the cached emit closure for a plugin id, creating it on
    /// first use. The closure lives for the manager's lifetime.
    pub fn emitter_for(&self, plugin_id: &str) -> EmitFn {
        let mut emitters = self.emitters.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = emitters.get(plugin_id) {
            return existing.clone();
        }

        let bus = self.bus.clone();
        let prefix = plugin_id.to_string();
        let emit: EmitFn = Arc::new(move |action, payload| {
            bus.emit(&EventBus::scoped(&prefix, action), payload);
        });

        emitters.insert(plugin_id.to_string(), emit.clone());
        emit
    }

    /// Builds the hook context for a plugin, snapshotting the registry at
    /// this moment.
    pub fn context_for(&self, plugin_id: &str) -> PluginContext {
        PluginContext::new(
            self.registry.list(),
            self.options.clone(),
            self.storage.clone(),
            self.emitter_for(plugin_id),
        )
    }

    /// Builds the adapter-facing upload context.
    pub fn upload_context(&self, adapter_id: &str, on_progress: ProgressFn) -> UploadContext {
        UploadContext::new(self.context_for(adapter_id), on_progress)
    }

    /// Runs every `validate` hook; the first failure aborts the stage.
    pub async fn run_validate(&self, file: &TrackedFile) -> UploadResult<()> {
        for plugin in self.plugins() {
            let ctx = self.context_for(plugin.id());
            if let Err(err) = plugin.validate(file, &ctx).await {
                tracing::warn!(
                    plugin = plugin.id(),
                    file_id = %file.id,
                    stage = Stage::Validate.as_str(),
                    %err,
                    "validator rejected file"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    /// Folds the file through every `preprocess` hook.
    ///
    /// On failure, broadcasts `file:error` for the affected file and
    /// returns the failing plugin's id alongside the error.
    pub async fn run_preprocess(
        &self,
        file: TrackedFile,
    ) -> Result<TrackedFile, (String, UploadError)> {
        self.transform(Stage::Preprocess, file).await
    }

    /// Folds the file through every `process` hook.
    ///
    /// Hooks may replace the file's bytes and adjust its id extension. On
    /// failure, broadcasts `file:error` and returns the failing plugin's id
    /// alongside the error.
    pub async fn run_process(
        &self,
        file: TrackedFile,
    ) -> Result<TrackedFile, (String, UploadError)> {
        self.transform(Stage::Process, file).await
    }

    /// Runs every `complete` hook, logging failures without propagating.
    pub async fn run_complete(&self, file: &TrackedFile) {
        for plugin in self.plugins() {
            let ctx = self.context_for(plugin.id());
            if let Err(err) = plugin.complete(file, &ctx).await {
                tracing::warn!(
                    plugin = plugin.id(),
                    file_id = %file.id,
                    stage = Stage::Complete.as_str(),
                    %err,
                    "complete hook failed"
                );
            }
        }
    }

    async fn transform(
        &self,
        stage: Stage,
        mut file: TrackedFile,
    ) -> Result<TrackedFile, (String, UploadError)> {
        for plugin in self.plugins() {
            let ctx = self.context_for(plugin.id());
            let outcome = match stage {
                Stage::Preprocess => plugin.preprocess(file.clone(), &ctx).await,
                Stage::Process => plugin.process(file.clone(), &ctx).await,
                _ => unreachable!("transform only runs preprocess and process stages"),
            };

            match outcome {
                Ok(next) => file = next,
                Err(err) => {
                    tracing::warn!(
                        plugin = plugin.id(),
                        file_id = %file.id,
                        stage = stage.as_str(),
                        %err,
                        "hook failed"
                    );
                    self.bus.emit(
                        FILE_ERROR,
                        EventPayload::FileError {
                            file: file.clone(),
                            error: err.to_file_error(),
                        },
                    );
                    return Err((plugin.id().to_string(), err));
                }
            }
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TaggingPlugin {
        id: &'static str,
    }

    #[async_trait]
    impl UploadPlugin for TaggingPlugin {
        fn id(&self) -> &str {
            self.id
        }

        async fn preprocess(
            &self,
            mut file: TrackedFile,
            ctx: &PluginContext,
        ) -> UploadResult<TrackedFile> {
            file.meta
                .insert(self.id.to_string(), json!(ctx.files.len()));
            ctx.emit("tagged", EventPayload::Custom(json!({ "id": file.id })));
            Ok(file)
        }
    }

    struct FailingPlugin;

    #[async_trait]
    impl UploadPlugin for FailingPlugin {
        fn id(&self) -> &str {
            "failing"
        }

        async fn preprocess(
            &self,
            _file: TrackedFile,
            _ctx: &PluginContext,
        ) -> UploadResult<TrackedFile> {
            Err(UploadError::PluginFailed {
                plugin: "failing".into(),
                message: "boom".into(),
            })
        }
    }

    fn runner_with(plugins: Vec<Arc<dyn UploadPlugin>>) -> (PluginRunner, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let runner = PluginRunner::new(
            bus.clone(),
            Arc::new(FileRegistry::new()),
            Arc::new(ManagerOptions::default()),
            None,
            plugins,
        );
        (runner, bus)
    }

    fn sample_file() -> TrackedFile {
        TrackedFile::local("1-a.jpg", "a.jpg", "image/jpeg", Bytes::from_static(b"x"), None)
    }

    #[tokio::test]
    async fn transform_folds_through_plugins_in_registration_order() {
        let (runner, _bus) = runner_with(vec![
            Arc::new(TaggingPlugin { id: "first" }),
            Arc::new(TaggingPlugin { id: "second" }),
        ]);

        let out = runner.run_preprocess(sample_file()).await.unwrap();
        assert!(out.meta.contains_key("first"));
        assert!(out.meta.contains_key("second"));
    }

    #[tokio::test]
    async fn emit_closures_are_cached_per_plugin_id() {
        let (runner, _bus) = runner_with(vec![]);

        let a = runner.emitter_for("thumbnail");
        let b = runner.emitter_for("thumbnail");
        let other = runner.emitter_for("imageCompression");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn plugin_events_reach_only_their_namespace() {
        let (runner, bus) = runner_with(vec![Arc::new(TaggingPlugin { id: "tagger" })]);
        let scoped = Arc::new(AtomicUsize::new(0));
        let foreign = Arc::new(AtomicUsize::new(0));

        let counter = scoped.clone();
        bus.on("tagger:tagged", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = foreign.clone();
        bus.on("other:tagged", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        runner.run_preprocess(sample_file()).await.unwrap();

        assert_eq!(scoped.load(Ordering::SeqCst), 1);
        assert_eq!(foreign.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_preprocess_broadcasts_file_error() {
        let (runner, bus) = runner_with(vec![Arc::new(FailingPlugin)]);
        let errors = Arc::new(AtomicUsize::new(0));

        let counter = errors.clone();
        bus.on(FILE_ERROR, move |payload| {
            assert!(payload.as_file().is_some());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (plugin_id, err) = runner.run_preprocess(sample_file()).await.unwrap_err();
        assert_eq!(plugin_id, "failing");
        assert!(matches!(err, UploadError::PluginFailed { .. }));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validate_aborts_on_first_failure_without_file_error() {
        struct RejectingValidator;

        #[async_trait]
        impl UploadPlugin for RejectingValidator {
            fn id(&self) -> &str {
                "rejecting"
            }

            async fn validate(
                &self,
                _file: &TrackedFile,
                _ctx: &PluginContext,
            ) -> UploadResult<()> {
                Err(UploadError::ValidationFailed {
                    message: "no".into(),
                    details: None,
                })
            }
        }

        let (runner, bus) = runner_with(vec![Arc::new(RejectingValidator)]);
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        bus.on(FILE_ERROR, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = runner.run_validate(&sample_file()).await.unwrap_err();
        assert!(matches!(err, UploadError::ValidationFailed { .. }));
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }
}
