//! Stale-while-revalidate cache of daily prayer times.
//!
//! Days are grouped into namespaces keyed by [`OptionsKey`]; each namespace
//! is one blob in the key-value store holding a `YYYY-MM-DD -> CachedDay`
//! map. Stale days are always served, freshness only decides whether a
//! background refresh is started.

mod day_cache;
mod key;
mod traits;

pub use day_cache::{CacheMap, CachedDay, DayCache};
pub use key::{date_key, parse_date_key, provider_date, OptionsKey};
pub use traits::{CacheSource, FetchOutcome};
