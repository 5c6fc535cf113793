//! Storage backend trait and the in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use pl_core::error::PlResult;

/// A keyed string store.
///
/// Implementations must be safe to call from concurrent tasks; every
/// operation is a small, independent read or write.
pub trait StorageBackend: Send + Sync {
    /// Read the value for a key, `None` if absent.
    fn get(&self, key: &str) -> PlResult<Option<String>>;

    /// Write the value for a key, replacing any existing value.
    fn set(&self, key: &str, value: &str) -> PlResult<()>;

    /// Delete a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> PlResult<()>;

    /// Probe whether the backend is usable at all on this device.
    fn probe(&self) -> bool {
        true
    }
}

/// Volatile backend used by tests and as a last-resort fallback.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the backend holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> PlResult<Option<String>> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PlResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PlResult<()> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
        Ok(())
    }
}
