//! Persistent per-browser device identity.

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

/// Storage key of the persisted device id.
pub const DEVICE_ID_KEY: &str = "VLAB_TRACKER_UUID";

/// Persisted key-value storage (`localStorage` in the browser).
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }
}

pub struct DeviceIdentity;

impl DeviceIdentity {
    /// The persisted device id, generated and stored on first use. Without
    /// storage the id lives only as long as the page.
    pub fn resolve(store: Option<&dyn KeyValueStore>) -> String {
        let Some(store) = store else {
            return Uuid::new_v4().to_string();
        };
        if let Some(existing) = store.get(DEVICE_ID_KEY).filter(|id| !id.is_empty()) {
            return existing;
        }
        let id = Uuid::new_v4().to_string();
        store.set(DEVICE_ID_KEY, &id);
        debug!(device_id = %id, "generated device id");
        id
    }
}
