//! Process-local storage backend.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{OriginId, StorageBackend, StorageChange, StorageError};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// In-memory key-value store with a broadcast change feed.
///
/// Writing a value equal to the stored one is a no-op and emits nothing.
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, serde_json::Value>>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn write(
        &self,
        key: &str,
        value: serde_json::Value,
        origin: OriginId,
    ) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if entries.get(key) == Some(&value) {
            return Ok(());
        }
        entries.insert(key.to_string(), value.clone());

        // Sent under the lock so changes are broadcast in write order.
        // No receivers is fine: nobody else is watching yet.
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            value: Some(value),
            origin,
        });
        drop(entries);
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
