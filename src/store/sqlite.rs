//! SQLite implementation of the key-value store.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::KvStore;

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed store.
///
/// The connection lives behind a mutex and every statement runs on the
/// blocking pool, so callers on the async runtime never wait on disk I/O
/// while holding the lock across an await.
#[derive(Clone)]
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  /// Open the store at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Arc::new(Mutex::new(conn)),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("meeqat.db"))
  }

  /// Run database migrations.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }

  /// Run `f` against the connection on the blocking pool.
  async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let conn = conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
      f(&conn)
    })
    .await
    .map_err(|e| eyre!("Store task failed: {}", e))?
  }
}

#[async_trait]
impl KvStore for SqliteStore {
  async fn get(&self, key: &str) -> Result<Option<String>> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        conn
          .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
            row.get(0)
          })
          .optional()
          .map_err(|e| eyre!("Failed to read key {}: {}", key, e))
      })
      .await
  }

  async fn set(&self, key: &str, value: &str) -> Result<()> {
    let key = key.to_string();
    let value = value.to_string();
    self
      .with_conn(move |conn| {
        conn
          .execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
            params![key, value],
          )
          .map_err(|e| eyre!("Failed to write key {}: {}", key, e))?;
        Ok(())
      })
      .await
  }

  async fn clear(&self) -> Result<()> {
    self
      .with_conn(|conn| {
        conn
          .execute("DELETE FROM kv", [])
          .map_err(|e| eyre!("Failed to clear store: {}", e))?;
        Ok(())
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_sqlite_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(Some(&dir.path().join("kv.db"))).unwrap();

    assert_eq!(store.get("schedule_state").await.unwrap(), None);
    store.set("schedule_state", "{}").await.unwrap();
    assert_eq!(
      store.get("schedule_state").await.unwrap().as_deref(),
      Some("{}")
    );
  }

  #[tokio::test]
  async fn test_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("kv.db");

    {
      let store = SqliteStore::open(Some(&path)).unwrap();
      store.set("debug_offset_ms", "3600000").await.unwrap();
    }

    let reopened = SqliteStore::open(Some(&path)).unwrap();
    assert_eq!(
      reopened.get("debug_offset_ms").await.unwrap().as_deref(),
      Some("3600000")
    );
  }

  #[tokio::test]
  async fn test_sqlite_clear() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(Some(&dir.path().join("kv.db"))).unwrap();

    store.set("a", "1").await.unwrap();
    store.set("b", "2").await.unwrap();
    store.clear().await.unwrap();

    assert_eq!(store.get("a").await.unwrap(), None);
    assert_eq!(store.get("b").await.unwrap(), None);
  }
}
