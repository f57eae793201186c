//! Quota-safe key/value persistence
//!
//! Values are serialized to JSON inside a versioned envelope and written through a
//! pluggable [`StorageBackend`]. Writes larger than the configured quota are refused;
//! a backend quota failure evicts one low-priority key and retries once. Reads never
//! fail: a missing or unreadable value yields the caller's default.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::debounce::{lock, Debouncer};
use super::keys;

/// Envelope version written by this build
pub const SCHEMA_VERSION: u64 = 1;

/// Keys sacrificed, in order, when the backend runs out of room
pub const EVICTION_ORDER: &[&str] = &[keys::HISTORY, keys::TOPICS, keys::VOCABULARY];

/// Disk-full and filesystem-quota failures count as running out of room
fn classify_io(e: std::io::Error) -> StorageError {
    match e.kind() {
        std::io::ErrorKind::StorageFull | std::io::ErrorKind::QuotaExceeded => StorageError::QuotaExceeded,
        _ => StorageError::Io(e),
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw string storage underneath the quota-safe layer
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Vec<String>;
}

/// In-process backend with an optional total byte capacity
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
    capacity: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            capacity: Some(capacity),
        }
    }

    pub fn used_bytes(&self) -> usize {
        lock(&self.entries).values().map(String::len).sum()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries);
        if let Some(capacity) = self.capacity {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + value.len() > capacity {
                return Err(StorageError::QuotaExceeded);
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }
}

/// One JSON file per key under a directory, with a total byte capacity
pub struct FileBackend {
    dir: PathBuf,
    capacity: usize,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, capacity })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    fn used_bytes_except(&self, key: &str) -> usize {
        let skip = self.path_for(key);
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path() != skip)
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len() as usize)
                    .sum()
            })
            .unwrap_or(0)
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.used_bytes_except(key) + value.len() > self.capacity {
            return Err(StorageError::QuotaExceeded);
        }
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, value).and_then(|()| std::fs::rename(&tmp, &path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(classify_io(e));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Vec<String> {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| {
                        let name = e.file_name().to_string_lossy().to_string();
                        name.strip_suffix(".json").map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

struct StoreInner {
    backend: Arc<dyn StorageBackend>,
    quota_bytes: usize,
}

impl StoreInner {
    fn write_value(&self, key: &str, value: &Value) -> bool {
        let envelope = json!({
            "version": SCHEMA_VERSION,
            "savedAt": Utc::now(),
            "data": value,
        });
        let serialized = match serde_json::to_string(&envelope) {
            Ok(s) => s,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize value");
                return false;
            }
        };

        if serialized.len() > self.quota_bytes {
            warn!(
                key,
                size = serialized.len(),
                quota = self.quota_bytes,
                "Refusing write larger than storage quota"
            );
            return false;
        }

        match self.backend.set(key, &serialized) {
            Ok(()) => {
                debug!(key, size = serialized.len(), "Stored value");
                true
            }
            Err(StorageError::QuotaExceeded) => {
                let Some(evicted) = self.evict_one(key) else {
                    warn!(key, "Storage full and nothing left to evict, dropping write");
                    return false;
                };
                info!(key, evicted = %evicted, "Storage full, evicted key and retrying");
                match self.backend.set(key, &serialized) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(key, error = %e, "Write failed after eviction, dropping it");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(key, error = %e, "Storage write failed");
                false
            }
        }
    }

    /// Remove the first present key in eviction order, never the one being written
    fn evict_one(&self, writing: &str) -> Option<String> {
        let present = self.backend.keys();
        let victim = EVICTION_ORDER
            .iter()
            .filter(|k| **k != writing)
            .find(|k| present.iter().any(|p| p == *k))?;
        match self.backend.remove(victim) {
            Ok(()) => Some(victim.to_string()),
            Err(e) => {
                warn!(key = *victim, error = %e, "Failed to evict key");
                None
            }
        }
    }
}

/// Durable key/value persistence that never throws into the conversational flow
pub struct QuotaSafeStore {
    inner: Arc<StoreInner>,
    debounce_wait: Duration,
    writers: Mutex<HashMap<String, Debouncer<Value>>>,
}

impl QuotaSafeStore {
    pub fn new(backend: Arc<dyn StorageBackend>, quota_bytes: usize, debounce_wait: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner { backend, quota_bytes }),
            debounce_wait,
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory store without a backend capacity, mostly for tests and dry runs
    pub fn in_memory(quota_bytes: usize) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), quota_bytes, Duration::from_millis(1000))
    }

    /// File-backed store built from configuration
    ///
    /// Each value is bounded by `storage.quota_mb`; all keys together share the
    /// `storage.capacity_mb` budget, past which the eviction path runs.
    pub fn from_config(config: &crate::config::Config) -> anyhow::Result<Self> {
        use anyhow::Context;

        let dir = config.data_dir()?.join("state");
        let backend = FileBackend::new(&dir, config.storage.capacity_bytes())
            .with_context(|| format!("Failed to open state directory {}", dir.display()))?;
        Ok(Self::new(
            Arc::new(backend),
            config.storage.quota_bytes(),
            Duration::from_millis(config.storage.debounce_ms),
        ))
    }

    /// Serialize and write `value`; false when refused or failed
    pub fn set_safe<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.inner.write_value(key, &value),
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize value");
                false
            }
        }
    }

    /// Read `key`, falling back to `default` on a missing or unreadable value
    pub fn get_safe<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let raw = match self.inner.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "No stored value, using default");
                return default;
            }
            Err(e) => {
                warn!(key, error = %e, "Storage read failed, using default");
                return default;
            }
        };

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Stored value is not valid JSON, using default");
                return default;
            }
        };

        let Some(data) = migrate(key, parsed) else {
            return default;
        };

        match serde_json::from_value(data) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Stored value does not match schema, using default");
                default
            }
        }
    }

    /// Coalesce writes to `key`; the last value of a burst is written
    pub fn set_debounced<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize value");
                return;
            }
        };

        let mut writers = lock(&self.writers);
        let writer = writers.entry(key.to_string()).or_insert_with(|| {
            let inner = Arc::clone(&self.inner);
            let key = key.to_string();
            Debouncer::new(self.debounce_wait, move |value: Value| {
                inner.write_value(&key, &value);
            })
        });
        writer.call(value);
    }

    /// Write every pending debounced value now
    pub fn flush(&self) {
        for writer in lock(&self.writers).values() {
            writer.flush();
        }
    }

    /// Remove a key, dropping any pending debounced write for it
    pub fn remove(&self, key: &str) -> bool {
        if let Some(writer) = lock(&self.writers).get(key) {
            writer.cancel();
        }
        match self.inner.backend.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Failed to remove key");
                false
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.inner.backend.get(key), Ok(Some(_)))
    }

    pub fn quota_bytes(&self) -> usize {
        self.inner.quota_bytes
    }
}

/// Unwrap a stored envelope, migrating older layouts
fn migrate(key: &str, stored: Value) -> Option<Value> {
    let is_envelope = stored.get("version").is_some_and(Value::is_u64) && stored.get("data").is_some();
    if !is_envelope {
        // Written before envelopes existed: the bare value is the data
        debug!(key, "Migrating unversioned value");
        return Some(stored);
    }

    let version = stored.get("version").and_then(Value::as_u64).unwrap_or(0);
    if version > SCHEMA_VERSION {
        warn!(key, version, "Stored value has a newer schema version, ignoring it");
        return None;
    }
    stored.get("data").cloned()
}
