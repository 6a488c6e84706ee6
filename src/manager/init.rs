//! # Initialization Protocol
//!
//! Resolves declarative initial-file references into tracked remote files.
//! Static references resolve in a background task at construction; a
//! reactive source is watched until a defined, non-empty value appears and
//! is then resolved exactly once (later changes are ignored). Readiness is
//! set regardless of resolution outcome so consumers never render against
//! a stuck flag.
//!
//! Resolution calls the storage adapter's metadata fetch per key, in
//! order. A file's id is its storage key; its display name derives from
//! the key's last path segment.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use crate::config::InitialFiles;
use crate::errors::{UploadError, UploadResult};
use crate::events::{EventPayload, FILE_ADDED, INITIAL_FILES_ERROR, INITIAL_FILES_LOADED};
use crate::manager::UploadManager;
use crate::models::TrackedFile;
use crate::utils::last_path_segment;

impl UploadManager {
    /// Schedules resolution of the configured initial files.
    ///
    /// Absent references mean immediate readiness. Static references spawn
    /// one resolution task; a reactive source spawns a watcher that fires
    /// resolution once.
    pub(crate) fn spawn_initialization(&self, initial: InitialFiles) {
        match initial {
            InitialFiles::None => {}
            InitialFiles::Single(key) => self.spawn_resolution(vec![key]),
            InitialFiles::Many(keys) => {
                if keys.is_empty() {
                    self.inner.init_latch.store(true, Ordering::SeqCst);
                    self.set_ready(true);
                } else {
                    self.spawn_resolution(keys);
                }
            }
            InitialFiles::Reactive(rx) => {
                let manager = self.clone();
                tokio::spawn(async move {
                    let mut rx = rx;
                    loop {
                        let value = rx.borrow_and_update().clone();
                        if let Some(keys) = value {
                            if !keys.is_empty() {
                                manager.resolve_initial(keys).await;
                                return;
                            }
                        }
                        if rx.changed().await.is_err() {
                            tracing::debug!(
                                "initial files source dropped before yielding a value"
                            );
                            manager.set_ready(true);
                            return;
                        }
                    }
                });
            }
        }
    }

    fn spawn_resolution(&self, keys: Vec<String>) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.resolve_initial(keys).await;
        });
    }

    /// Resolves the given keys exactly once, guarded by the one-shot
    /// latch.
    pub(crate) async fn resolve_initial(&self, keys: Vec<String>) {
        if self.inner.init_latch.swap(true, Ordering::SeqCst) {
            return;
        }

        match self.fetch_remote_files(&keys).await {
            Ok(files) => {
                for file in &files {
                    self.inner.registry.push(file.clone());
                }
                self.inner
                    .bus
                    .emit(INITIAL_FILES_LOADED, EventPayload::Files(files));
            }
            Err(err) => {
                tracing::error!(%err, "initial file resolution failed");
                self.inner
                    .bus
                    .emit(INITIAL_FILES_ERROR, EventPayload::Message(err.to_string()));
            }
        }

        self.set_ready(true);
        self.refresh_status();
    }

    /// Bulk-resolves remote references, replacing the current registry.
    ///
    /// The existing sequence is dropped silently (object URLs released),
    /// then each key is resolved and pushed. Emits `initialFiles:loaded`
    /// on success and `initialFiles:error` on failure; readiness is set
    /// either way.
    pub async fn initialize_existing_files(
        &self,
        refs: Vec<String>,
    ) -> UploadResult<Vec<TrackedFile>> {
        self.inner.resources.cleanup(None);
        self.inner.registry.clear();
        self.inner.init_latch.store(true, Ordering::SeqCst);

        let outcome = self.fetch_remote_files(&refs).await;
        match outcome {
            Ok(files) => {
                for file in &files {
                    self.inner.registry.push(file.clone());
                }
                self.inner
                    .bus
                    .emit(INITIAL_FILES_LOADED, EventPayload::Files(files.clone()));
                self.set_ready(true);
                self.refresh_status();
                Ok(files)
            }
            Err(err) => {
                self.inner
                    .bus
                    .emit(INITIAL_FILES_ERROR, EventPayload::Message(err.to_string()));
                self.set_ready(true);
                self.refresh_status();
                Err(err)
            }
        }
    }

    /// Resolves remote references and appends them, without replacing.
    ///
    /// Keys already tracked (by storage key) are skipped, the configured
    /// max-files limit is respected, and `file:added` fires per admitted
    /// file.
    pub async fn append_existing_files(
        &self,
        refs: Vec<String>,
    ) -> UploadResult<Vec<TrackedFile>> {
        let adapter = self
            .inner
            .storage
            .clone()
            .ok_or(UploadError::NoStorageAdapter)?;

        let mut known: HashSet<String> = self
            .inner
            .registry
            .list()
            .into_iter()
            .filter_map(|f| f.storage_key)
            .collect();

        let mut admitted = Vec::new();
        for key in refs.into_iter().filter(|k| !k.trim().is_empty()) {
            if known.contains(&key) {
                tracing::debug!(%key, "skipping already-tracked storage key");
                continue;
            }

            if let Some(limit) = self.inner.options.max_files {
                if self.inner.registry.len() as u32 >= limit {
                    tracing::warn!(%key, limit, "max files reached; remaining keys skipped");
                    break;
                }
            }

            let ctx = self.inner.runner.context_for(adapter.id());
            let metadata = adapter.get_remote_file(&key, &ctx).await?;
            let name = last_path_segment(&key).to_string();
            let file = TrackedFile::remote(key.clone(), name, key.clone(), metadata);

            self.inner.registry.push(file.clone());
            self.inner
                .bus
                .emit(FILE_ADDED, EventPayload::File(file.clone()));
            known.insert(key);
            admitted.push(file);
        }

        self.refresh_status();
        Ok(admitted)
    }

    /// Resolves each non-empty key through the adapter, in order.
    ///
    /// The first failure aborts resolution; nothing is pushed for a failed
    /// batch.
    async fn fetch_remote_files(&self, keys: &[String]) -> UploadResult<Vec<TrackedFile>> {
        let adapter = self
            .inner
            .storage
            .clone()
            .ok_or(UploadError::NoStorageAdapter)?;

        let mut files = Vec::new();
        for key in keys.iter().filter(|k| !k.trim().is_empty()) {
            let ctx = self.inner.runner.context_for(adapter.id());
            let metadata = adapter.get_remote_file(key, &ctx).await?;
            let name = last_path_segment(key).to_string();
            files.push(TrackedFile::remote(key.clone(), name, key.clone(), metadata));
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InitialFiles, ManagerConfig, ManagerOptions};
    use crate::manager::test_support::{manager_with, recorded};
    use crate::models::{FileSource, FileStatus, RemoteFileMetadata, StoredObject};
    use crate::plugins::{PluginContext, UploadContext};
    use crate::storage::StorageAdapter;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    /// Adapter resolving metadata from a fixed table.
    struct TableAdapter {
        table: HashMap<String, RemoteFileMetadata>,
    }

    impl TableAdapter {
        fn new(entries: &[(&str, u64, &str)]) -> Self {
            let table = entries
                .iter()
                .map(|(key, size, mime)| {
                    (
                        key.to_string(),
                        RemoteFileMetadata {
                            size: *size,
                            mime_type: mime.to_string(),
                            remote_url: format!("https://x/{key}"),
                            preview: None,
                            upload_result: Some(StoredObject::new(format!("https://x/{key}"))),
                        },
                    )
                })
                .collect();
            Self { table }
        }
    }

    #[async_trait]
    impl StorageAdapter for TableAdapter {
        fn id(&self) -> &str {
            "table"
        }

        async fn upload(
            &self,
            _file: &TrackedFile,
            _ctx: &UploadContext,
        ) -> UploadResult<StoredObject> {
            Err(UploadError::UnsupportedOperation {
                operation: "upload".into(),
            })
        }

        async fn get_remote_file(
            &self,
            storage_key: &str,
            _ctx: &PluginContext,
        ) -> UploadResult<RemoteFileMetadata> {
            self.table
                .get(storage_key)
                .cloned()
                .ok_or_else(|| UploadError::AdapterError {
                    message: format!("unknown key `{storage_key}`"),
                })
        }

        async fn remove(&self, _file: &TrackedFile, _ctx: &PluginContext) -> UploadResult<()> {
            Ok(())
        }
    }

    async fn settle(manager: &UploadManager) {
        let mut ready = manager.is_ready();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !*ready.borrow_and_update() {
                ready.changed().await.unwrap();
            }
        })
        .await
        .expect("manager became ready");
    }

    #[tokio::test]
    async fn absent_initial_files_mean_immediate_readiness() {
        let manager = manager_with(ManagerOptions::default(), None);
        assert!(*manager.is_ready().borrow());
    }

    #[tokio::test]
    async fn static_references_resolve_into_remote_files() {
        let adapter = Arc::new(TableAdapter::new(&[
            ("media/a.jpg", 2048, "image/png"),
            ("media/b.jpg", 4096, "image/jpeg"),
        ]));
        let manager = UploadManager::new(ManagerConfig {
            storage: Some(adapter),
            initial_files: InitialFiles::Many(vec!["media/a.jpg".into(), "media/b.jpg".into()]),
            ..Default::default()
        });
        let events = recorded(&manager, &[INITIAL_FILES_LOADED]);

        settle(&manager).await;

        let files = manager.files_snapshot();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.status == FileStatus::Complete));
        assert!(files
            .iter()
            .all(|f| matches!(f.source, FileSource::Storage)));
        assert_eq!(files[0].id, "media/a.jpg");
        assert_eq!(files[0].name, "a.jpg");
        assert_eq!(files[0].size, 2048);
        assert!(files[0].upload_result.is_some());
        assert_eq!(events.count(INITIAL_FILES_LOADED), 1);
    }

    #[tokio::test]
    async fn reactive_references_resolve_once_and_ignore_later_values() {
        let adapter = Arc::new(TableAdapter::new(&[("a.jpg", 2048, "image/png")]));
        let (tx, rx) = watch::channel(None::<Vec<String>>);

        let manager = UploadManager::new(ManagerConfig {
            storage: Some(adapter),
            initial_files: InitialFiles::Reactive(rx),
            ..Default::default()
        });
        let events = recorded(&manager, &[INITIAL_FILES_LOADED]);

        assert!(!*manager.is_ready().borrow());
        assert!(manager.files_snapshot().is_empty());

        tx.send(Some(vec!["a.jpg".into()])).unwrap();
        settle(&manager).await;

        let files = manager.files_snapshot();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].mime_type, "image/png");
        assert_eq!(files[0].remote_url.as_deref(), Some("https://x/a.jpg"));

        // A subsequent change is ignored by the one-shot latch.
        tx.send(Some(vec!["b.jpg".into(), "c.jpg".into()])).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(manager.files_snapshot().len(), 1);
        assert_eq!(events.count(INITIAL_FILES_LOADED), 1);
    }

    #[tokio::test]
    async fn missing_adapter_fails_initialization_but_sets_readiness() {
        let manager = UploadManager::new(ManagerConfig {
            initial_files: InitialFiles::Single("a.jpg".into()),
            ..Default::default()
        });
        let events = recorded(&manager, &[INITIAL_FILES_ERROR]);

        settle(&manager).await;

        assert!(manager.files_snapshot().is_empty());
        assert_eq!(events.count(INITIAL_FILES_ERROR), 1);
    }

    #[tokio::test]
    async fn resolution_failure_emits_error_and_sets_readiness() {
        let adapter = Arc::new(TableAdapter::new(&[("known.jpg", 10, "image/jpeg")]));
        let manager = UploadManager::new(ManagerConfig {
            storage: Some(adapter),
            initial_files: InitialFiles::Many(vec!["known.jpg".into(), "ghost.jpg".into()]),
            ..Default::default()
        });
        let events = recorded(&manager, &[INITIAL_FILES_LOADED, INITIAL_FILES_ERROR]);

        settle(&manager).await;

        // All-or-nothing: the failing key aborts the whole batch.
        assert!(manager.files_snapshot().is_empty());
        assert_eq!(events.count(INITIAL_FILES_LOADED), 0);
        assert_eq!(events.count(INITIAL_FILES_ERROR), 1);
    }

    #[tokio::test]
    async fn initialize_existing_files_replaces_the_registry() {
        let adapter = Arc::new(TableAdapter::new(&[
            ("x.jpg", 1, "image/jpeg"),
            ("y.jpg", 2, "image/jpeg"),
        ]));
        let manager = manager_with(ManagerOptions::default(), Some(adapter));

        manager
            .add_file(crate::models::FileInput::new(
                "local.jpg",
                "image/jpeg",
                vec![0u8; 4],
            ))
            .await
            .unwrap();
        assert_eq!(manager.files_snapshot().len(), 1);

        let resolved = manager
            .initialize_existing_files(vec!["x.jpg".into(), "y.jpg".into()])
            .await
            .unwrap();

        assert_eq!(resolved.len(), 2);
        let files = manager.files_snapshot();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.source.is_remote()));
    }

    #[tokio::test]
    async fn append_existing_files_dedupes_and_respects_max_files() {
        let adapter = Arc::new(TableAdapter::new(&[
            ("a.jpg", 1, "image/jpeg"),
            ("b.jpg", 2, "image/jpeg"),
            ("c.jpg", 3, "image/jpeg"),
        ]));
        let manager = manager_with(
            ManagerOptions {
                max_files: Some(2),
                ..Default::default()
            },
            Some(adapter),
        );
        let events = recorded(&manager, &[FILE_ADDED]);

        let first = manager
            .append_existing_files(vec!["a.jpg".into()])
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // `a.jpg` is deduplicated; `b.jpg` fits; `c.jpg` exceeds the limit.
        let second = manager
            .append_existing_files(vec!["a.jpg".into(), "b.jpg".into(), "c.jpg".into()])
            .await
            .unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "b.jpg");
        assert_eq!(manager.files_snapshot().len(), 2);
        assert_eq!(events.count(FILE_ADDED), 2);
    }
}
