// # File Config Store
//
// File-based implementation of ConfigStore.
//
// ## Purpose
//
// Persists node settings across reboots in a single JSON document on the
// flash filesystem (or any filesystem on a host).
//
// ## Write Strategy
//
// - Read-merge-write: every save reloads the file and merges into it
// - Atomic replace: the merged object goes to a temp file which is then
//   renamed over the config file
// - Corrupt files read as empty and are overwritten by the next save
//
// ## File Format
//
// ```json
// {
//   "devLoc": "kitchen",
//   "lightID": "lb-01",
//   "ssid": "home"
// }
// ```

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::{ConfigEntries, ConfigStore, DebugRelay, TracingRelay, value_as_entry};

/// Sender id used for diagnostics from the config store
const SENDER_ID: &str = "CONFIG";

/// File-based config store
///
/// Every operation goes to the file; nothing is cached, so values written by
/// another component sharing the file are seen on the next read.
///
/// # Example
///
/// ```rust,no_run
/// use nodelink_core::store::FileConfigStore;
/// use nodelink_core::traits::ConfigStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileConfigStore::new("/var/lib/nodelink/config.json").await?;
///
///     store.save("devLoc", "kitchen").await?;
///     assert_eq!(store.get("devLoc").await.as_deref(), Some("kitchen"));
///
///     Ok(())
/// }
/// ```
pub struct FileConfigStore {
    path: PathBuf,
    relay: Arc<dyn DebugRelay>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for FileConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigStore")
            .field("path", &self.path)
            .finish()
    }
}

impl FileConfigStore {
    /// Create a file config store
    ///
    /// The file itself is created lazily on the first save. Parent
    /// directories are created here if needed.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::write(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            path,
            relay: Arc::new(TracingRelay),
            write_lock: Mutex::new(()),
        })
    }

    /// Report diagnostics through `relay` instead of the local log only
    pub fn with_relay(mut self, relay: Arc<dyn DebugRelay>) -> Self {
        self.relay = relay;
        self
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted object, degrading every failure to "empty"
    async fn load(&self) -> ConfigEntries {
        if !self.path.exists() {
            tracing::debug!("Config file does not exist: {}", self.path.display());
            return ConfigEntries::new();
        }

        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", self.path.display(), e);
                return ConfigEntries::new();
            }
        };

        match serde_json::from_slice::<Value>(&content) {
            Ok(Value::Object(entries)) => entries,
            Ok(_) => {
                tracing::warn!(
                    "Config file {} is not a JSON object, treating as empty",
                    self.path.display()
                );
                ConfigEntries::new()
            }
            Err(e) => {
                tracing::warn!(
                    "Config file {} could not be parsed, treating as empty: {}",
                    self.path.display(),
                    e
                );
                ConfigEntries::new()
            }
        }
    }

    /// Write the full object atomically, returning the serialized text
    async fn write_entries(&self, entries: &ConfigEntries) -> Result<String, Error> {
        let json = serde_json::to_string(entries)
            .map_err(|e| Error::write(format!("Failed to serialize config: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::write(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::write(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::write(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::write(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            )));
        }

        tracing::trace!("Config written to file: {}", self.path.display());
        Ok(json)
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.load().await.get(key).and_then(value_as_entry)
    }

    async fn entries(&self) -> ConfigEntries {
        self.load().await
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await;
        entries.insert(key.to_string(), Value::String(value.to_string()));

        match self.write_entries(&entries).await {
            Ok(json) => {
                self.relay.report(&json, SENDER_ID).await;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to save config entry {}: {}", key, e);
                self.relay
                    .report("failed to open config file for writing", SENDER_ID)
                    .await;
                Err(e)
            }
        }
    }

    async fn format(&self) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let started = Instant::now();
        self.relay.report("Config store format started", SENDER_ID).await;

        let mut result = Ok(());
        for path in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    result = Err(Error::write(format!(
                        "Failed to remove {}: {}",
                        path.display(),
                        e
                    )));
                    break;
                }
            }
        }

        let outcome = if result.is_ok() {
            "Config store formatted"
        } else {
            "Config store format failed"
        };
        self.relay.report(outcome, SENDER_ID).await;
        self.relay
            .report(
                &format!("Formatting took {}ms", started.elapsed().as_millis()),
                SENDER_ID,
            )
            .await;

        result
    }
}
