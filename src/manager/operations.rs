//! # File Operations
//!
//! The public operations of the manager: admission, removal, reordering,
//! data access, replacement, patching, and reset. Admission drives the
//! validate and preprocess stages; upload orchestration lives in the
//! uploader module.
//!
//! Batch operations never abort on an individual file's failure, and
//! adapter failures during removal never block the local registry
//! mutation.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};

use crate::constants::{LARGE_FILE_WARNING_BYTES, STREAM_CHUNK_SIZE};
use crate::errors::{UploadError, UploadResult};
use crate::events::{EventPayload, FILES_REORDER, FILE_ADDED, FILE_ERROR, FILE_REMOVED, FILE_REPLACED};
use crate::manager::UploadManager;
use crate::models::{FileInput, FilePatch, FileSource, RemoveOptions, TrackedFile};
use crate::utils::generate_file_id;

/// Byte stream over a tracked file's contents.
pub type FileStream = Pin<Box<dyn Stream<Item = UploadResult<Bytes>> + Send>>;

impl UploadManager {
    /// Admits a file into the manager.
    ///
    /// Derives a unique id preserving the source extension, runs every
    /// validator, then every preprocess hook, and pushes the file into the
    /// registry as `waiting`, emitting `file:added`. With auto-upload
    /// configured, an upload run is scheduled after the emission so
    /// subscribers observe the admission before `upload:start`.
    ///
    /// # Failure Modes
    ///
    /// - No derivable extension: fails with `InvalidFileName`, nothing is
    ///   added.
    /// - Validator rejection: the file is recorded with `status = error`
    ///   and a `file:error` emission so UIs can show it, and the rejection
    ///   is returned to the caller.
    /// - Preprocess hook failure: the file is still admitted, carrying
    ///   `status = error`.
    pub async fn add_file(&self, input: FileInput) -> UploadResult<TrackedFile> {
        let id = generate_file_id(&input.name)?;
        let file = TrackedFile::local(
            id,
            input.name,
            input.mime_type,
            input.data,
            input.last_modified,
        );

        if let Err(err) = self.inner.runner.run_validate(&file).await {
            let record = err.to_file_error();
            let mut rejected = file;
            rejected.mark_error(record.clone());
            self.inner.registry.push(rejected.clone());
            self.inner.bus.emit(
                FILE_ERROR,
                EventPayload::FileError {
                    file: rejected,
                    error: record,
                },
            );
            self.clear_uploaded_latch();
            self.refresh_status();
            return Err(err);
        }

        let admitted = file.clone();
        let file = match self.inner.runner.run_preprocess(file).await {
            Ok(file) => file,
            Err((_plugin, err)) => {
                // The runner already broadcast file:error for this file.
                let mut failed = admitted;
                failed.mark_error(err.to_file_error());
                failed
            }
        };

        self.inner.registry.push(file.clone());
        self.inner
            .bus
            .emit(FILE_ADDED, EventPayload::File(file.clone()));
        self.clear_uploaded_latch();
        self.refresh_status();

        if self.inner.options.auto_upload {
            self.schedule_upload();
        }

        Ok(file)
    }

    /// Admits a batch of files, never aborting on individual failures.
    ///
    /// Returns the files that were admitted; validator rejections and bad
    /// filenames are logged and excluded.
    pub async fn add_files(&self, inputs: Vec<FileInput>) -> Vec<TrackedFile> {
        let mut admitted = Vec::new();

        for input in inputs {
            let name = input.name.clone();
            match self.add_file(input).await {
                Ok(file) => admitted.push(file),
                Err(err) => {
                    tracing::warn!(file_name = %name, %err, "file not admitted");
                }
            }
        }

        admitted
    }

    /// Removes a file, optionally deleting its remote object.
    ///
    /// With the default policy the adapter's delete runs when the file
    /// carries a storage reference; adapter failures are logged and never
    /// block local removal. Unknown ids are a no-op.
    pub async fn remove_file(
        &self,
        id: &str,
        opts: RemoveOptions,
    ) -> UploadResult<Option<TrackedFile>> {
        let Ok(file) = self.inner.registry.by_id(id) else {
            tracing::debug!(id, "remove requested for unknown file");
            return Ok(None);
        };

        if opts.delete_from_storage.deletes_from_storage()
            && (file.storage_key.is_some() || file.remote_url.is_some())
        {
            if let Some(storage) = self.inner.storage.clone() {
                let ctx = self.inner.runner.context_for(storage.id());
                if let Err(err) = storage.remove(&file, &ctx).await {
                    tracing::warn!(id, %err, "storage delete failed; removing locally");
                }
            }
        }

        self.inner.resources.cleanup(Some(id));
        let removed = self.inner.registry.remove(id);
        if let Some(removed) = &removed {
            self.inner
                .bus
                .emit(FILE_REMOVED, EventPayload::File(removed.clone()));
            self.refresh_status();
        }

        Ok(removed)
    }

    /// Removes a batch of files locally, without contacting the adapter.
    pub fn remove_files(&self, ids: &[String]) -> Vec<TrackedFile> {
        let mut removed = Vec::new();

        for id in ids {
            self.inner.resources.cleanup(Some(id));
            if let Some(file) = self.inner.registry.remove(id) {
                self.inner
                    .bus
                    .emit(FILE_REMOVED, EventPayload::File(file.clone()));
                removed.push(file);
            }
        }

        self.refresh_status();
        removed
    }

    /// Removes every tracked file, emitting `file:removed` per file.
    pub fn clear_files(&self) {
        self.inner.resources.cleanup(None);

        for file in self.inner.registry.clear() {
            self.inner.bus.emit(FILE_REMOVED, EventPayload::File(file));
        }

        self.clear_uploaded_latch();
        self.refresh_status();
    }

    /// Moves the file at `old_index` to `new_index`, emitting
    /// `files:reorder`. Equal or out-of-bounds indices are ignored.
    pub fn reorder_file(&self, old_index: usize, new_index: usize) {
        if self.inner.registry.move_file(old_index, new_index) {
            self.inner.bus.emit(
                FILES_REORDER,
                EventPayload::Reorder {
                    old_index,
                    new_index,
                },
            );
        } else {
            tracing::debug!(old_index, new_index, "reorder ignored");
        }
    }

    /// Looks a file up by id.
    pub fn get_file(&self, id: &str) -> UploadResult<TrackedFile> {
        self.inner.registry.by_id(id)
    }

    /// Returns a file's bytes.
    ///
    /// Local files hand out their payload directly; remote files are
    /// fetched from their `remote_url`, failing when the response is not
    /// successful. Sizes above ~100 MB log a warning.
    pub async fn get_file_data(&self, id: &str) -> UploadResult<Bytes> {
        let file = self.inner.registry.by_id(id)?;

        if file.size > LARGE_FILE_WARNING_BYTES {
            tracing::warn!(id, size = file.size, "fetching large file into memory");
        }

        match &file.source {
            FileSource::Local { data } => Ok(data.clone()),
            FileSource::Storage => {
                let url = remote_url_of(&file)?;
                let response = reqwest::get(&url).await?;
                if !response.status().is_success() {
                    return Err(UploadError::FetchFailed {
                        message: format!("unexpected status {}", response.status()),
                        url,
                    });
                }
                Ok(response.bytes().await?)
            }
        }
    }

    /// Returns a URL addressing a file's contents.
    ///
    /// Local files get a tracked object URL (minted once, released with the
    /// file); remote files return their `remote_url`.
    pub fn get_file_url(&self, id: &str) -> UploadResult<String> {
        let file = self.inner.registry.by_id(id)?;

        match &file.source {
            FileSource::Local { data } => {
                Ok(self.inner.resources.create_url(&file.id, data.clone()))
            }
            FileSource::Storage => remote_url_of(&file),
        }
    }

    /// Streams a file's contents.
    ///
    /// Local files stream their bytes in fixed-size chunks; remote files
    /// stream the response body of their `remote_url`.
    pub async fn get_file_stream(&self, id: &str) -> UploadResult<FileStream> {
        let file = self.inner.registry.by_id(id)?;

        match &file.source {
            FileSource::Local { data } => {
                let chunks: Vec<UploadResult<Bytes>> = data
                    .chunks(STREAM_CHUNK_SIZE)
                    .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                    .collect();
                Ok(Box::pin(futures::stream::iter(chunks)))
            }
            FileSource::Storage => {
                let url = remote_url_of(&file)?;
                let response = reqwest::get(&url).await?;
                if !response.status().is_success() {
                    return Err(UploadError::FetchFailed {
                        message: format!("unexpected status {}", response.status()),
                        url,
                    });
                }
                Ok(Box::pin(response.bytes_stream().map_err(UploadError::from)))
            }
        }
    }

    /// Replaces a file's payload, returning it to the start of the
    /// lifecycle.
    ///
    /// The id is preserved; name and size update; remote location, upload
    /// result, and plugin meta are cleared; the cached object URL is
    /// released; preprocess re-runs. Emits `file:replaced` followed by
    /// `file:added` for subscribers that only track admissions. Uploads are
    /// rescheduled per `auto_upload`, overridable through the last
    /// argument.
    pub async fn replace_file_data(
        &self,
        id: &str,
        data: Bytes,
        name: Option<String>,
        auto_upload: Option<bool>,
    ) -> UploadResult<TrackedFile> {
        let existing = self.inner.registry.by_id(id)?;
        self.inner.resources.cleanup(Some(id));

        let file = TrackedFile::local(
            existing.id.clone(),
            name.unwrap_or_else(|| existing.name.clone()),
            existing.mime_type.clone(),
            data,
            existing.last_modified,
        );

        let admitted = file.clone();
        let file = match self.inner.runner.run_preprocess(file).await {
            Ok(file) => file,
            Err((_plugin, err)) => {
                let mut failed = admitted;
                failed.mark_error(err.to_file_error());
                failed
            }
        };

        let replaced = self.inner.registry.replace(id, file)?;
        self.inner
            .bus
            .emit(FILE_REPLACED, EventPayload::File(replaced.clone()));
        self.inner
            .bus
            .emit(FILE_ADDED, EventPayload::File(replaced.clone()));
        self.clear_uploaded_latch();
        self.refresh_status();

        if auto_upload.unwrap_or(self.inner.options.auto_upload) {
            self.schedule_upload();
        }

        Ok(replaced)
    }

    /// Shallow-merges a patch into a file. No events are emitted; watch
    /// subscribers still observe the new snapshot.
    pub fn update_file(&self, id: &str, patch: FilePatch) -> UploadResult<TrackedFile> {
        let updated = self.inner.registry.update(id, |file| patch.apply(file))?;
        self.refresh_status();
        Ok(updated)
    }

    /// Silently drops every tracked file and releases every object URL.
    pub fn reset(&self) {
        self.inner.resources.cleanup(None);
        self.inner.registry.clear();
        self.clear_uploaded_latch();
        self.refresh_status();
    }

    /// Schedules an upload run on the task horizon, so already-queued
    /// emissions are observed first.
    pub(crate) fn schedule_upload(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(err) = manager.upload().await {
                tracing::warn!(%err, "scheduled upload failed");
            }
        });
    }
}

fn remote_url_of(file: &TrackedFile) -> UploadResult<String> {
    file.remote_url
        .clone()
        .ok_or_else(|| UploadError::AdapterError {
            message: format!("remote file `{}` carries no URL", file.id),
        })
}
