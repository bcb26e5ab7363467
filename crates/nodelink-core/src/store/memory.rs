// # Memory Config Store
//
// In-memory implementation of ConfigStore.
//
// ## Purpose
//
// A volatile store for tests and for nodes that are provisioned from the
// environment on every start. Values are lost on restart.
//
// ## Failure Injection
//
// `set_read_only(true)` makes every subsequent save fail with a write error,
// which lets callers exercise their write-failure paths without a broken
// filesystem.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::{ConfigEntries, ConfigStore, value_as_entry};

/// In-memory config store implementation
///
/// Cloning yields a handle to the same entries.
///
/// # Example
///
/// ```rust,no_run
/// use nodelink_core::store::MemoryConfigStore;
/// use nodelink_core::traits::ConfigStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryConfigStore::new();
///
///     store.save("camID", "cam-7").await?;
///     assert_eq!(store.get("camID").await.as_deref(), Some("cam-7"));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<RwLock<ConfigEntries>>,
    read_only: Arc<AtomicBool>,
}

impl MemoryConfigStore {
    /// Create a new empty memory config store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with string entries
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
            read_only: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make saves fail (or succeed again)
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Get the number of entries in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str) -> Option<String> {
        let guard = self.inner.read().await;
        guard.get(key).and_then(value_as_entry)
    }

    async fn entries(&self) -> ConfigEntries {
        self.inner.read().await.clone()
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), Error> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(Error::write("memory store is read-only"));
        }
        let mut guard = self.inner.write().await;
        guard.insert(key.to_string(), Value::String(value.to_string()));
        Ok(())
    }

    async fn format(&self) -> Result<(), Error> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(Error::write("memory store is read-only"));
        }
        self.inner.write().await.clear();
        Ok(())
    }
}
