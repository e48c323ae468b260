//! Wall clock abstraction.
//!
//! Every time-dependent component reads "now" through an [`OffsetClock`] it
//! owns. The debug offset lets time keep flowing naturally while shifted:
//! an offset of `+3_600_000` means "pretend it is one hour later". Offsets
//! are never shared between components; whoever changes one must hand the
//! new value to each component explicitly.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
  /// Milliseconds since the Unix epoch, without any debug offset.
  fn now_ms(&self) -> i64;
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_ms(&self) -> i64 {
    Utc::now().timestamp_millis()
  }
}

/// A base clock shifted by a component-local debug offset.
pub struct OffsetClock {
  base: Arc<dyn Clock>,
  offset_ms: AtomicI64,
}

impl OffsetClock {
  pub fn new(base: Arc<dyn Clock>, offset_ms: i64) -> Self {
    Self {
      base,
      offset_ms: AtomicI64::new(offset_ms),
    }
  }

  /// Offset-adjusted epoch milliseconds.
  pub fn now_ms(&self) -> i64 {
    self.base.now_ms().saturating_add(self.offset_ms())
  }

  /// Offset-adjusted time in `zone`.
  pub fn now_in<Z: TimeZone>(&self, zone: &Z) -> DateTime<Z> {
    zoned_from_ms(zone, self.now_ms())
  }

  /// Offset-adjusted calendar date in `zone`.
  pub fn today_in<Z: TimeZone>(&self, zone: &Z) -> NaiveDate {
    self.now_in(zone).date_naive()
  }

  pub fn offset_ms(&self) -> i64 {
    self.offset_ms.load(Ordering::Relaxed)
  }

  pub fn set_offset_ms(&self, offset_ms: i64) {
    self.offset_ms.store(offset_ms, Ordering::Relaxed);
  }
}

/// Convert epoch milliseconds into local time.
pub fn local_from_ms(ms: i64) -> DateTime<Local> {
  zoned_from_ms(&Local, ms)
}

pub fn zoned_from_ms<Z: TimeZone>(zone: &Z, ms: i64) -> DateTime<Z> {
  DateTime::from_timestamp_millis(ms)
    .unwrap_or_default()
    .with_timezone(zone)
}

/// Milliseconds from `now_ms` until the next midnight in `zone`.
///
/// A midnight skipped by a DST transition counts as one hour later.
pub fn ms_until_next_day<Z: TimeZone>(zone: &Z, now_ms: i64) -> i64 {
  let midnight = zoned_from_ms(zone, now_ms)
    .date_naive()
    .succ_opt()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .and_then(|naive| {
      zone
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| zone.from_local_datetime(&(naive + Duration::hours(1))).earliest())
    });

  match midnight {
    Some(at) => (at.timestamp_millis() - now_ms).max(0),
    None => 86_400_000,
  }
}

#[cfg(test)]
pub mod testing {
  //! Clocks for tests.

  use super::Clock;
  use std::sync::atomic::{AtomicI64, Ordering};

  /// A clock that only moves when told to.
  #[derive(Debug, Default)]
  pub struct ManualClock {
    now_ms: AtomicI64,
  }

  impl ManualClock {
    pub fn at(now_ms: i64) -> Self {
      Self {
        now_ms: AtomicI64::new(now_ms),
      }
    }

    pub fn advance(&self, delta_ms: i64) {
      self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
  }

  impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
      self.now_ms.load(Ordering::SeqCst)
    }
  }

  /// A clock driven by tokio's (pausable) time source.
  ///
  /// Under `#[tokio::test(start_paused = true)]` sleeps complete instantly
  /// and this clock advances by exactly the slept amount.
  #[derive(Debug)]
  pub struct TokioClock {
    base_ms: i64,
    started: tokio::time::Instant,
  }

  impl TokioClock {
    pub fn starting_at(base_ms: i64) -> Self {
      Self {
        base_ms,
        started: tokio::time::Instant::now(),
      }
    }
  }

  impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
      let elapsed = tokio::time::Instant::now().duration_since(self.started);
      self.base_ms + elapsed.as_millis() as i64
    }
  }
}

#[cfg(test)]
mod tests {
  use super::testing::ManualClock;
  use super::*;

  #[test]
  fn test_offset_shifts_time() {
    let base = Arc::new(ManualClock::at(1_000));
    let clock = OffsetClock::new(base.clone(), 0);
    assert_eq!(clock.now_ms(), 1_000);

    clock.set_offset_ms(3_600_000);
    assert_eq!(clock.now_ms(), 3_601_000);

    base.advance(500);
    assert_eq!(clock.now_ms(), 3_601_500);
  }

  #[test]
  fn test_today_follows_the_given_zone() {
    // 2026-10-14 20:00 UTC is already the 15th in Tokyo
    let base = Arc::new(ManualClock::at(1_792_008_000_000));
    let clock = OffsetClock::new(base, 0);

    assert_eq!(clock.today_in(&Utc), NaiveDate::from_ymd_opt(2026, 10, 14).unwrap());
    assert_eq!(
      clock.today_in(&chrono_tz::Asia::Tokyo),
      NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    );
  }

  #[test]
  fn test_ms_until_next_day() {
    // 20:00 UTC
    let now = 1_792_008_000_000;
    assert_eq!(ms_until_next_day(&Utc, now), 4 * 3_600_000);
    // 05:00 in Tokyo
    assert_eq!(ms_until_next_day(&chrono_tz::Asia::Tokyo, now), 19 * 3_600_000);
  }

  #[test]
  fn test_offsets_are_independent() {
    let base: Arc<dyn Clock> = Arc::new(ManualClock::at(10_000));
    let data_layer = OffsetClock::new(Arc::clone(&base), 0);
    let scheduler = OffsetClock::new(base, 0);

    data_layer.set_offset_ms(-5_000);
    assert_eq!(data_layer.now_ms(), 5_000);
    assert_eq!(scheduler.now_ms(), 10_000);
  }
}
