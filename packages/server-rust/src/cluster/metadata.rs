//! Shared key/value metadata for the compute node group.
//!
//! Guarded by its own lock so metadata traffic never contends with
//! membership traffic on the registry lock. Entries never expire and the
//! store is not persisted.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MetadataStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites an entry. Last writer wins.
    pub fn write(&self, name: &str, value: Vec<u8>) {
        debug!(name, len = value.len(), "Metadata written");
        self.entries.write().insert(name.to_string(), value);
    }

    #[must_use]
    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        self.entries.read().get(name).cloned()
    }

    /// Removes an entry. Returns `false` if it did not exist.
    pub fn delete(&self, name: &str) -> bool {
        let removed = self.entries.write().remove(name).is_some();
        debug!(name, removed, "Metadata delete");
        removed
    }

    /// Number of stored entries, reported by the health endpoint.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}
