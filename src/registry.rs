//! # File Registry
//!
//! The authoritative ordered sequence of tracked files, with reactive
//! observability so consumers can bind UIs to it. Every mutation notifies
//! `watch` subscribers with a fresh snapshot before the mutating call
//! returns; derived total progress is broadcast alongside.
//!
//! Lookup is by file id, the canonical addressing mechanism of the public
//! API. The registry holds no async state; mutations are short critical
//! sections guarded by a standard lock and are never held across await
//! points.

use std::sync::RwLock;

use tokio::sync::watch;

use crate::errors::{UploadError, UploadResult};
use crate::models::{FileStatus, TrackedFile};

/// Ordered collection of tracked files with snapshot broadcasting.
pub struct FileRegistry {
    files: RwLock<Vec<TrackedFile>>,
    files_tx: watch::Sender<Vec<TrackedFile>>,
    progress_tx: watch::Sender<u8>,
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FileRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (files_tx, _) = watch::channel(Vec::new());
        let (progress_tx, _) = watch::channel(0);

        Self {
            files: RwLock::new(Vec::new()),
            files_tx,
            progress_tx,
        }
    }

    /// Read-only snapshot of the current sequence.
    pub fn list(&self) -> Vec<TrackedFile> {
        self.files.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.files.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks a file up by id.
    pub fn by_id(&self, id: &str) -> UploadResult<TrackedFile> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| UploadError::NotFound { id: id.to_string() })
    }

    /// Position of a file in the sequence.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.iter().position(|f| f.id == id)
    }

    /// Appends a file and notifies subscribers.
    pub fn push(&self, file: TrackedFile) {
        let snapshot = {
            let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
            files.push(file);
            files.clone()
        };
        self.notify(snapshot);
    }

    /// Replaces the file at `id`'s position with `file` (whose id may
    /// differ, e.g. after a processing extension change).
    pub fn replace(&self, id: &str, file: TrackedFile) -> UploadResult<TrackedFile> {
        let (snapshot, replaced) = {
            let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
            let idx = files
                .iter()
                .position(|f| f.id == id)
                .ok_or_else(|| UploadError::NotFound { id: id.to_string() })?;
            files[idx] = file;
            (files.clone(), files[idx].clone())
        };
        self.notify(snapshot);
        Ok(replaced)
    }

    /// Applies a closure to the file with the given id and notifies
    /// subscribers. Returns the updated file.
    pub fn update<F>(&self, id: &str, mutate: F) -> UploadResult<TrackedFile>
    where
        F: FnOnce(&mut TrackedFile),
    {
        let (snapshot, updated) = {
            let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
            let idx = files
                .iter()
                .position(|f| f.id == id)
                .ok_or_else(|| UploadError::NotFound { id: id.to_string() })?;
            mutate(&mut files[idx]);
            (files.clone(), files[idx].clone())
        };
        self.notify(snapshot);
        Ok(updated)
    }

    /// Removes the file with the given id, returning it when present.
    pub fn remove(&self, id: &str) -> Option<TrackedFile> {
        let (snapshot, removed) = {
            let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
            let idx = files.iter().position(|f| f.id == id)?;
            let removed = files.remove(idx);
            (files.clone(), removed)
        };
        self.notify(snapshot);
        Some(removed)
    }

    /// Removes every file matching the predicate, returning them in their
    /// former order.
    pub fn remove_where<F>(&self, predicate: F) -> Vec<TrackedFile>
    where
        F: Fn(&TrackedFile) -> bool,
    {
        let (snapshot, removed) = {
            let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
            let mut removed = Vec::new();
            files.retain(|f| {
                if predicate(f) {
                    removed.push(f.clone());
                    false
                } else {
                    true
                }
            });
            (files.clone(), removed)
        };
        if !removed.is_empty() {
            self.notify(snapshot);
        }
        removed
    }

    /// Removes every file and returns them in their former order.
    pub fn clear(&self) -> Vec<TrackedFile> {
        let removed = {
            let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *files)
        };
        self.notify(Vec::new());
        removed
    }

    /// Moves the file at `old_index` to `new_index`.
    ///
    /// Returns false without mutating when the indices are equal or out of
    /// bounds.
    pub fn move_file(&self, old_index: usize, new_index: usize) -> bool {
        let snapshot = {
            let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
            if old_index == new_index || old_index >= files.len() || new_index >= files.len() {
                return false;
            }
            let file = files.remove(old_index);
            files.insert(new_index, file);
            files.clone()
        };
        self.notify(snapshot);
        true
    }

    /// Whether the registry is non-empty and every file is `Complete`.
    pub fn all_complete(&self) -> bool {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        !files.is_empty() && files.iter().all(|f| f.status == FileStatus::Complete)
    }

    /// Whether any file currently has the given status.
    pub fn any_with_status(&self, status: FileStatus) -> bool {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.iter().any(|f| f.status == status)
    }

    /// Watch handle broadcasting full snapshots on every mutation.
    pub fn watch_files(&self) -> watch::Receiver<Vec<TrackedFile>> {
        self.files_tx.subscribe()
    }

    /// Watch handle broadcasting derived total progress.
    pub fn watch_progress(&self) -> watch::Receiver<u8> {
        self.progress_tx.subscribe()
    }

    /// Rounded mean of `progress.percentage` across all files; 0 when
    /// empty. Errored files keep contributing their last percentage until
    /// removed.
    pub fn derived_total_progress(files: &[TrackedFile]) -> u8 {
        if files.is_empty() {
            return 0;
        }

        let sum: u64 = files.iter().map(|f| f.progress.percentage as u64).sum();
        ((sum as f64 / files.len() as f64).round() as u8).min(100)
    }

    fn notify(&self, snapshot: Vec<TrackedFile>) {
        self.progress_tx
            .send_replace(Self::derived_total_progress(&snapshot));
        self.files_tx.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn file(id: &str) -> TrackedFile {
        TrackedFile::local(id, "a.jpg", "image/jpeg", Bytes::from_static(b"xy"), None)
    }

    #[test]
    fn push_and_lookup_by_id() {
        let registry = FileRegistry::new();
        registry.push(file("one"));
        registry.push(file("two"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.by_id("two").unwrap().id, "two");
        assert!(matches!(
            registry.by_id("missing").unwrap_err(),
            UploadError::NotFound { .. }
        ));
    }

    #[test]
    fn update_mutates_in_place_and_returns_the_result() {
        let registry = FileRegistry::new();
        registry.push(file("one"));

        let updated = registry
            .update("one", |f| f.set_progress(40))
            .unwrap();

        assert_eq!(updated.progress.percentage, 40);
        assert_eq!(registry.by_id("one").unwrap().progress.percentage, 40);
    }

    #[test]
    fn replace_may_change_the_id() {
        let registry = FileRegistry::new();
        registry.push(file("one.png"));

        let mut renamed = file("one.jpg");
        renamed.mime_type = "image/jpeg".into();
        registry.replace("one.png", renamed).unwrap();

        assert!(registry.by_id("one.png").is_err());
        assert_eq!(registry.by_id("one.jpg").unwrap().id, "one.jpg");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn move_file_rejects_invalid_indices() {
        let registry = FileRegistry::new();
        registry.push(file("a"));
        registry.push(file("b"));
        registry.push(file("c"));

        assert!(!registry.move_file(1, 1));
        assert!(!registry.move_file(0, 3));
        assert!(registry.move_file(0, 2));

        let order: Vec<String> = registry.list().into_iter().map(|f| f.id).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn remove_where_takes_only_matching_files() {
        let registry = FileRegistry::new();
        registry.push(file("a"));
        registry.push(file("b"));
        registry
            .update("a", |f| f.status = FileStatus::Error)
            .unwrap();

        let removed = registry.remove_where(|f| f.status == FileStatus::Error);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "a");
        assert_eq!(registry.len(), 1);
        assert!(registry.by_id("b").is_ok());
    }

    #[test]
    fn total_progress_is_the_rounded_mean() {
        assert_eq!(FileRegistry::derived_total_progress(&[]), 0);

        let mut a = file("a");
        a.set_progress(100);
        let mut b = file("b");
        b.set_progress(50);
        let c = file("c");

        assert_eq!(FileRegistry::derived_total_progress(&[a, b, c]), 50);
    }

    #[test]
    fn watchers_observe_mutations_before_the_call_returns() {
        let registry = FileRegistry::new();
        let rx = registry.watch_files();
        let progress_rx = registry.watch_progress();

        let mut done = file("a");
        done.set_progress(100);
        registry.push(done);

        assert_eq!(rx.borrow().len(), 1);
        assert_eq!(*progress_rx.borrow(), 100);

        registry.clear();
        assert!(rx.borrow().is_empty());
        assert_eq!(*progress_rx.borrow(), 0);
    }

    #[test]
    fn all_complete_requires_a_non_empty_registry() {
        let registry = FileRegistry::new();
        assert!(!registry.all_complete());

        registry.push(file("a"));
        assert!(!registry.all_complete());

        registry
            .update("a", |f| f.status = FileStatus::Complete)
            .unwrap();
        assert!(registry.all_complete());
    }
}
