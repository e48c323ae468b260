//! Per-namespace store of daily prayer-time snapshots.

use chrono::{Days, NaiveDate};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::key::{parse_date_key, OptionsKey};
use crate::provider::ProviderDay;
use crate::store::KvStore;

/// Version of the persisted cache blob.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// One day's prayer times as fetched from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedDay {
  /// Prayer name -> local time string
  pub timings: BTreeMap<String, String>,
  pub date_readable: String,
  pub timezone: String,
  pub method_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hijri_date: Option<String>,
  /// When the day was fetched, epoch ms
  pub saved_at: i64,
}

impl CachedDay {
  pub fn from_provider(day: ProviderDay, saved_at: i64) -> Self {
    Self {
      timings: day.timings,
      date_readable: day.date_readable,
      timezone: day.timezone,
      method_name: day.method_name,
      hijri_date: day.hijri_date,
      saved_at,
    }
  }

  /// Whether the snapshot is older than `threshold`.
  ///
  /// Staleness only ever triggers a refresh; stale days are still served.
  pub fn is_stale(&self, now_ms: i64, threshold: chrono::Duration) -> bool {
    now_ms - self.saved_at > threshold.num_milliseconds()
  }
}

/// `YYYY-MM-DD` -> day, for one namespace.
pub type CacheMap = BTreeMap<String, CachedDay>;

/// On-disk shape of a [`CacheMap`].
#[derive(Debug, Serialize, Deserialize)]
struct PersistedCacheMap {
  version: u32,
  /// Canonical options key the blob was written for
  options: String,
  days: CacheMap,
}

/// Day-indexed cache on top of a key-value store.
///
/// Writes read the whole namespace, mutate it and write it back. Two writers
/// touching different dates of the same namespace at the same moment can
/// therefore lose one of the updates; the next fetch of the lost date
/// repairs it.
#[derive(Clone)]
pub struct DayCache {
  store: Arc<dyn KvStore>,
}

impl DayCache {
  pub fn new(store: Arc<dyn KvStore>) -> Self {
    Self { store }
  }

  /// Load every cached day of a namespace.
  ///
  /// A blob that does not parse, has another schema version or was written
  /// for a different namespace is treated as empty.
  pub async fn load(&self, key: &OptionsKey) -> Result<CacheMap> {
    let raw = match self.store.get(&key.store_key()).await? {
      Some(raw) => raw,
      None => return Ok(CacheMap::new()),
    };

    let persisted: PersistedCacheMap = match serde_json::from_str(&raw) {
      Ok(persisted) => persisted,
      Err(e) => {
        warn!(options = %key.canonical(), error = %e, "Discarding malformed cache blob");
        return Ok(CacheMap::new());
      }
    };

    if persisted.version != CACHE_SCHEMA_VERSION {
      warn!(
        options = %key.canonical(),
        version = persisted.version,
        "Discarding cache blob with unknown schema version"
      );
      return Ok(CacheMap::new());
    }

    if persisted.options != key.canonical() {
      warn!(
        options = %key.canonical(),
        found = %persisted.options,
        "Discarding cache blob written for another namespace"
      );
      return Ok(CacheMap::new());
    }

    Ok(persisted.days)
  }

  async fn save(&self, key: &OptionsKey, days: CacheMap) -> Result<()> {
    let persisted = PersistedCacheMap {
      version: CACHE_SCHEMA_VERSION,
      options: key.canonical(),
      days,
    };
    let raw =
      serde_json::to_string(&persisted).map_err(|e| eyre!("Failed to serialize cache: {}", e))?;
    self.store.set(&key.store_key(), &raw).await
  }

  /// Get one cached day.
  pub async fn get(&self, key: &OptionsKey, date_key: &str) -> Result<Option<CachedDay>> {
    let mut days = self.load(key).await?;
    Ok(days.remove(date_key))
  }

  /// Store one day, replacing any previous snapshot for that date.
  pub async fn set(&self, key: &OptionsKey, date_key: &str, day: CachedDay) -> Result<()> {
    self.set_many(key, vec![(date_key.to_string(), day)]).await
  }

  /// Store several days with a single read-modify-write.
  pub async fn set_many(&self, key: &OptionsKey, entries: Vec<(String, CachedDay)>) -> Result<()> {
    if entries.is_empty() {
      return Ok(());
    }

    let mut days = self.load(key).await?;
    let count = entries.len();
    days.extend(entries);
    self.save(key, days).await?;

    debug!(options = %key.canonical(), count, "Stored cached days");
    Ok(())
  }

  /// Remove days dated strictly before `today - days_to_keep`.
  ///
  /// Keys that are not valid dates are left alone. Returns how many days
  /// were removed; nothing is written when that is zero.
  pub async fn cleanup(&self, key: &OptionsKey, days_to_keep: u32, today: NaiveDate) -> Result<usize> {
    let cutoff = match today.checked_sub_days(Days::new(u64::from(days_to_keep))) {
      Some(cutoff) => cutoff,
      None => return Ok(0),
    };

    let mut days = self.load(key).await?;
    let before = days.len();
    days.retain(|date_key, _| match parse_date_key(date_key) {
      Some(date) => date >= cutoff,
      None => true,
    });
    let removed = before - days.len();

    if removed > 0 {
      self.save(key, days).await?;
    }

    Ok(removed)
  }

  /// Drop everything in the underlying store.
  pub async fn clear(&self) -> Result<()> {
    self.store.clear().await
  }
}
