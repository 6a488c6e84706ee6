//! # Resource Tracker
//!
//! Ownership of every transient handle the manager mints, guaranteeing
//! release on all exit paths. The tracked resource is the object URL: an
//! opaque `memory://` identifier referencing in-memory bytes, handed to UIs
//! that need a stable address for a local file's payload.
//!
//! Release happens explicitly on file removal, data replacement, clear and
//! reset, and implicitly when the manager is torn down. URLs are minted at
//! most once per file id; repeated requests return the cached handle.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use uuid::Uuid;

use crate::constants::OBJECT_URL_SCHEME;

/// An object URL together with the bytes it dereferences to.
#[derive(Debug, Clone)]
struct ObjectUrl {
    url: String,
    data: Bytes,
}

/// Tracks the object URLs minted for local files.
///
/// The map is keyed by file id; a file has at most one live URL. Dropping
/// the tracker releases every outstanding handle.
#[derive(Default)]
pub struct ResourceTracker {
    urls: Mutex<HashMap<String, ObjectUrl>>,
}

impl ResourceTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the object URL for a file, minting one on first use.
    ///
    /// The returned URL stays dereferenceable until the file's handle is
    /// released.
    pub fn create_url(&self, file_id: &str, data: Bytes) -> String {
        let mut urls = self.urls.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = urls.get(file_id) {
            return existing.url.clone();
        }

        let url = format!("{}{}", OBJECT_URL_SCHEME, Uuid::new_v4());
        urls.insert(
            file_id.to_string(),
            ObjectUrl {
                url: url.clone(),
                data,
            },
        );

        tracing::debug!(file_id, %url, "minted object URL");
        url
    }

    /// Returns the cached URL for a file without minting.
    pub fn url_for(&self, file_id: &str) -> Option<String> {
        let urls = self.urls.lock().unwrap_or_else(|e| e.into_inner());
        urls.get(file_id).map(|u| u.url.clone())
    }

    /// Dereferences an object URL back to its bytes.
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        let urls = self.urls.lock().unwrap_or_else(|e| e.into_inner());
        urls.values().find(|u| u.url == url).map(|u| u.data.clone())
    }

    /// Releases one file's URL, or drains every tracked URL.
    pub fn cleanup(&self, file_id: Option<&str>) {
        let mut urls = self.urls.lock().unwrap_or_else(|e| e.into_inner());

        match file_id {
            Some(id) => {
                if urls.remove(id).is_some() {
                    tracing::debug!(file_id = id, "released object URL");
                }
            }
            None => {
                let released = urls.len();
                urls.clear();
                if released > 0 {
                    tracing::debug!(released, "released all object URLs");
                }
            }
        }
    }

    /// Number of URLs currently tracked.
    pub fn tracked_count(&self) -> usize {
        let urls = self.urls.lock().unwrap_or_else(|e| e.into_inner());
        urls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_minted_once_per_file() {
        let tracker = ResourceTracker::new();
        let data = Bytes::from_static(b"payload");

        let first = tracker.create_url("file-1", data.clone());
        let second = tracker.create_url("file-1", data);

        assert_eq!(first, second);
        assert!(first.starts_with(OBJECT_URL_SCHEME));
        assert_eq!(tracker.tracked_count(), 1);
    }

    #[test]
    fn urls_resolve_back_to_their_bytes() {
        let tracker = ResourceTracker::new();
        let url = tracker.create_url("file-1", Bytes::from_static(b"payload"));

        assert_eq!(tracker.resolve(&url).unwrap().as_ref(), b"payload");
        assert!(tracker.resolve("memory://unknown").is_none());
    }

    #[test]
    fn cleanup_releases_one_or_all() {
        let tracker = ResourceTracker::new();
        tracker.create_url("a", Bytes::new());
        tracker.create_url("b", Bytes::new());

        tracker.cleanup(Some("a"));
        assert_eq!(tracker.tracked_count(), 1);
        assert!(tracker.url_for("a").is_none());
        assert!(tracker.url_for("b").is_some());

        tracker.cleanup(None);
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn cleanup_of_unknown_id_is_a_no_op() {
        let tracker = ResourceTracker::new();
        tracker.create_url("a", Bytes::new());

        tracker.cleanup(Some("missing"));
        assert_eq!(tracker.tracked_count(), 1);
    }
}
