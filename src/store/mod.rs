//! Persisted key-value store.
//!
//! Both halves of the engine persist through this narrow interface: one key
//! per cache namespace, one for the schedule state and one for the debug
//! offset. Values are opaque strings (JSON in practice).

mod sqlite;

use async_trait::async_trait;
use color_eyre::Result;
use std::collections::HashMap;
use std::sync::Mutex;

pub use sqlite::SqliteStore;

/// Trait for persisted key-value backends.
#[async_trait]
pub trait KvStore: Send + Sync {
  /// Read the value stored under `key`.
  async fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  async fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove every key.
  async fn clear(&self) -> Result<()>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl KvStore for MemoryStore {
  async fn get(&self, key: &str) -> Result<Option<String>> {
    let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    Ok(entries.get(key).cloned())
  }

  async fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  async fn clear(&self) -> Result<()> {
    let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    entries.clear();
    Ok(())
  }
}
