//! Shared helpers for manager tests: quick construction and ordered event
//! capture.

use std::sync::{Arc, Mutex};

use crate::config::{ManagerConfig, ManagerOptions};
use crate::events::EventPayload;
use crate::manager::UploadManager;
use crate::storage::StorageAdapter;

/// Ordered log of captured events.
#[derive(Clone)]
pub(crate) struct TestEvents {
    log: Arc<Mutex<Vec<(String, EventPayload)>>>,
}

impl TestEvents {
    /// Number of captured emissions of an event.
    pub fn count(&self, name: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }

    /// Event names in emission order.
    pub fn names(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Payloads captured for an event, in emission order.
    pub fn payloads(&self, name: &str) -> Vec<EventPayload> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

/// Builds a manager from options and an optional adapter.
pub(crate) fn manager_with(
    options: ManagerOptions,
    storage: Option<Arc<dyn StorageAdapter>>,
) -> UploadManager {
    UploadManager::new(ManagerConfig {
        storage,
        options,
        ..Default::default()
    })
}

/// Subscribes to the given event names, recording emissions in order.
pub(crate) fn recorded(manager: &UploadManager, names: &[&str]) -> TestEvents {
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in names {
        let name = name.to_string();
        let sink = log.clone();
        let key = name.clone();
        manager.on(name, move |payload| {
            sink.lock().unwrap().push((key.clone(), payload.clone()));
        });
    }

    TestEvents { log }
}
