//! Result types describing where served data came from.

use super::day_cache::CachedDay;

/// Result of a day lookup, including the data and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
  /// `YYYY-MM-DD` of the served day
  pub date_key: String,
  /// The served day
  pub day: CachedDay,
  /// Where the data came from
  pub source: CacheSource,
}

/// Indicates where served data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network (cache miss)
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache, considered stale; a background refresh was started
  CacheStale,
  /// Offline mode - network unavailable, serving cached data
  Offline,
}

impl CacheSource {
  pub fn is_cached(self) -> bool {
    !matches!(self, CacheSource::Network)
  }
}
