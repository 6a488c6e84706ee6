//! # Upload Orchestration
//!
//! Drives every waiting file through the process stage and the storage
//! adapter, sequentially and in registry order, so progress and completion
//! events are deterministic. Files whose status is not `waiting`, or that
//! another in-flight run already claimed, are skipped, which makes repeated
//! `upload()` calls idempotent.
//!
//! Per-file failures (process hooks, adapter errors) mark that file as
//! errored and never abort the remaining batch. A file removed mid-flight
//! has its late adapter result dropped silently.

use std::sync::Arc;

use crate::errors::{UploadError, UploadResult};
use crate::events::{EventPayload, FILE_ERROR, UPLOAD_COMPLETE, UPLOAD_PROGRESS, UPLOAD_START};
use crate::manager::UploadManager;
use crate::models::{FileStatus, Progress, TrackedFile};
use crate::plugins::ProgressFn;
use crate::storage::StorageAdapter;

impl UploadManager {
    /// Uploads every waiting file, in registry order.
    ///
    /// Emits `upload:start` with the snapshot of files about to be
    /// uploaded, `upload:progress` per adapter progress report, and
    /// `upload:complete` with the files that reached completion in this
    /// run. When afterwards every tracked file is complete,
    /// `files:uploaded` fires once per completion cycle.
    ///
    /// Returns the files completed by this run. A run with no eligible
    /// files returns an empty set without emitting. Fails with
    /// [`UploadError::NoStorageAdapter`] when files are eligible but no
    /// adapter is configured.
    pub async fn upload(&self) -> UploadResult<Vec<TrackedFile>> {
        let snapshot: Vec<TrackedFile> = {
            let mut active = self
                .inner
                .active_uploads
                .lock()
                .unwrap_or_else(|e| e.into_inner());

            let eligible: Vec<TrackedFile> = self
                .inner
                .registry
                .list()
                .into_iter()
                .filter(|f| f.status == FileStatus::Waiting && !active.contains(&f.id))
                .collect();

            for file in &eligible {
                active.insert(file.id.clone());
            }
            eligible
        };

        if snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let Some(adapter) = self.inner.storage.clone() else {
            let mut active = self
                .inner
                .active_uploads
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            for file in &snapshot {
                active.remove(&file.id);
            }
            return Err(UploadError::NoStorageAdapter);
        };

        self.inner
            .bus
            .emit(UPLOAD_START, EventPayload::Files(snapshot.clone()));

        let mut completed = Vec::new();
        for file in snapshot {
            let claimed = file.id.clone();
            let (final_id, done) = self.upload_one(&adapter, file).await;

            {
                let mut active = self
                    .inner
                    .active_uploads
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                active.remove(&claimed);
                active.remove(&final_id);
            }

            if let Some(file) = done {
                completed.push(file);
            }
        }

        self.inner
            .bus
            .emit(UPLOAD_COMPLETE, EventPayload::Files(completed.clone()));
        self.refresh_status();
        self.maybe_emit_files_uploaded();

        Ok(completed)
    }

    /// Drives one file through process, transfer, and completion.
    ///
    /// Returns the file's final id (processing may adjust the extension)
    /// and the completed file when the transfer succeeded.
    async fn upload_one(
        &self,
        adapter: &Arc<dyn StorageAdapter>,
        file: TrackedFile,
    ) -> (String, Option<TrackedFile>) {
        let original_id = file.id.clone();

        // Re-read the file: it may have been mutated or removed since the
        // snapshot was taken.
        let current = match self.inner.registry.by_id(&original_id) {
            Ok(f) if f.status == FileStatus::Waiting => f,
            _ => return (original_id, None),
        };

        let processed = match self.inner.runner.run_process(current).await {
            Ok(file) => file,
            Err((_plugin, err)) => {
                let _ = self
                    .inner
                    .registry
                    .update(&original_id, |f| f.mark_error(err.to_file_error()));
                self.refresh_status();
                return (original_id, None);
            }
        };

        // Processing may have replaced the payload; a cached object URL
        // would dangle over the old bytes.
        self.inner.resources.cleanup(Some(&original_id));

        let upload_id = processed.id.clone();
        let mut staged = processed.clone();
        staged.status = FileStatus::Uploading;
        staged.progress = Progress::zero();
        if self.inner.registry.replace(&original_id, staged).is_err() {
            return (original_id, None);
        }
        self.refresh_status();

        let progress_manager = self.clone();
        let progress_id = upload_id.clone();
        let on_progress: ProgressFn = Arc::new(move |percentage| {
            if let Ok(updated) = progress_manager
                .inner
                .registry
                .update(&progress_id, |f| f.set_progress(percentage))
            {
                let progress = updated.progress.percentage;
                progress_manager.inner.bus.emit(
                    UPLOAD_PROGRESS,
                    EventPayload::Progress {
                        file: updated,
                        progress,
                    },
                );
            }
        });

        let ctx = self.inner.runner.upload_context(adapter.id(), on_progress);

        match adapter.upload(&processed, &ctx).await {
            Ok(stored) => {
                let updated = self.inner.registry.update(&upload_id, |f| {
                    f.status = FileStatus::Complete;
                    f.set_progress(100);
                    f.remote_url = Some(stored.url.clone());
                    if stored.storage_key.is_some() {
                        f.storage_key = stored.storage_key.clone();
                    }
                    if f.preview.is_none() {
                        f.preview = Some(stored.url.clone());
                    }
                    f.upload_result = Some(stored.clone());
                    f.error = None;
                });

                match updated {
                    Ok(done) => {
                        self.inner.runner.run_complete(&done).await;
                        self.refresh_status();
                        (upload_id, Some(done))
                    }
                    // Removed mid-flight; the adapter result is dropped.
                    Err(_) => (upload_id, None),
                }
            }
            Err(err) => {
                let wrapped = match err {
                    err @ UploadError::AdapterError { .. } => err,
                    other => UploadError::AdapterError {
                        message: other.to_string(),
                    },
                };
                let record = wrapped.to_file_error();

                if let Ok(failed) = self
                    .inner
                    .registry
                    .update(&upload_id, |f| f.mark_error(record.clone()))
                {
                    self.inner.bus.emit(
                        FILE_ERROR,
                        EventPayload::FileError {
                            file: failed,
                            error: record,
                        },
                    );
                }
                self.refresh_status();
                (upload_id, None)
            }
        }
    }
}
