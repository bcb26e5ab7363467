// # Config Store Trait
//
// Defines the interface for durable key/value configuration.
//
// ## Purpose
//
// The config store keeps the handful of values a node must remember across
// reboots: network name, static addressing, peer identifiers, location.
// Everything is a flat string-to-string mapping persisted as one JSON object.
//
// ## Failure Model
//
// - A missing store is the normal first-boot state, not an error
// - A store that cannot be parsed reads as empty
// - Only a failed write is surfaced to the caller
//
// ## Usage
//
// ```rust,ignore
// use nodelink_core::ConfigStore;
//
// async fn remember(store: &dyn ConfigStore) -> nodelink_core::Result<()> {
//     if store.get("devLoc").await.is_none() {
//         store.save("devLoc", "kitchen").await?;
//     }
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde_json::{Map, Value};

/// All entries of a config store, as the JSON object it is persisted as
pub type ConfigEntries = Map<String, Value>;

/// Trait for config store implementations
///
/// Implementations must be safe to share between the node and any external
/// component (for example a provisioning UI) that reads or writes settings.
///
/// ## Implementation Guidelines
///
/// - **Read-merge-write**: `save` must start from the current persisted
///   object so that no other key is lost
/// - **Whole-object replace**: the persisted object is replaced as a unit,
///   never appended to
/// - **Graceful reads**: `get` and `entries` never fail; unreadable or
///   malformed data reads as absent
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Get the value stored under `key`
    ///
    /// # Returns
    ///
    /// - `Some(value)`: the key is present
    /// - `None`: the store is missing, unreadable, malformed, or lacks the key
    async fn get(&self, key: &str) -> Option<String>;

    /// Get every entry currently persisted
    ///
    /// Returns an empty map when the store is missing or malformed.
    async fn entries(&self) -> ConfigEntries;

    /// Store `value` under `key`, preserving all other keys
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the merged object was persisted
    /// - `Err(Error::Write)`: the store could not be written
    async fn save(&self, key: &str, value: &str) -> Result<(), crate::Error>;

    /// Erase every entry
    ///
    /// After a successful format the store behaves as on first boot.
    async fn format(&self) -> Result<(), crate::Error>;
}

/// Render a persisted JSON value as a config entry string
///
/// Strings are returned verbatim, other scalars and containers as their JSON
/// text. `null` counts as absent.
pub fn value_as_entry(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
