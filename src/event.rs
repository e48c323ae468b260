use chrono::{NaiveDate, Offset};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::{local_from_ms, Clock};
use crate::schedule::AlarmKind;

/// Why the scheduler woke up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
  /// Process start
  Boot,
  /// A new schedule was pushed
  Pushed,
  /// One of our own alarms fired
  Alarm(AlarmKind),
  /// Wall clock jumped relative to monotonic time
  TimeChanged,
  /// Local UTC offset changed
  TimezoneChanged,
  /// Local calendar date changed
  DateChanged,
  /// Debug offset was changed
  OffsetChanged,
  /// A display surface was attached
  DisplayAttached,
}

impl WakeReason {
  /// Wakes that require rebuilding state from storage before anything else.
  pub fn needs_recovery(self) -> bool {
    matches!(
      self,
      WakeReason::Boot
        | WakeReason::TimeChanged
        | WakeReason::TimezoneChanged
        | WakeReason::DateChanged
    )
  }

  /// Clock events after which today's prayer times may belong to another day.
  pub fn needs_resync(self) -> bool {
    matches!(
      self,
      WakeReason::TimeChanged | WakeReason::TimezoneChanged | WakeReason::DateChanged
    )
  }
}

/// Point-in-time reading of the clocks the watcher compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
  pub wall_ms: i64,
  pub mono_ms: i64,
  pub utc_offset_secs: i32,
  pub date: NaiveDate,
}

impl ClockSample {
  pub fn take(clock: &dyn Clock, started: Instant) -> Self {
    let wall_ms = clock.now_ms();
    let local = local_from_ms(wall_ms);
    Self {
      wall_ms,
      mono_ms: started.elapsed().as_millis() as i64,
      utc_offset_secs: local.offset().fix().local_minus_utc(),
      date: local.date_naive(),
    }
  }
}

/// Compare two samples and report the most significant change.
///
/// A zone change wins over a clock jump, and a clock jump over a plain date
/// rollover.
pub fn detect_change(prev: &ClockSample, next: &ClockSample, tolerance_ms: i64) -> Option<WakeReason> {
  if prev.utc_offset_secs != next.utc_offset_secs {
    return Some(WakeReason::TimezoneChanged);
  }

  let wall_delta = next.wall_ms - prev.wall_ms;
  let mono_delta = next.mono_ms - prev.mono_ms;
  if (wall_delta - mono_delta).abs() > tolerance_ms {
    return Some(WakeReason::TimeChanged);
  }

  if prev.date != next.date {
    return Some(WakeReason::DateChanged);
  }

  None
}

/// Watches the wall clock for jumps, zone changes and date rollovers.
pub struct ClockWatcher;

impl ClockWatcher {
  pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
  pub const DEFAULT_TOLERANCE_MS: i64 = 2_000;

  /// Spawn the watcher; it exits once `tx` has no receiver.
  pub fn spawn(
    clock: Arc<dyn Clock>,
    tx: mpsc::UnboundedSender<WakeReason>,
    interval: Duration,
    tolerance_ms: i64,
  ) -> JoinHandle<()> {
    tokio::spawn(async move {
      let started = Instant::now();
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      ticker.tick().await;

      let mut prev = ClockSample::take(clock.as_ref(), started);
      loop {
        ticker.tick().await;
        let next = ClockSample::take(clock.as_ref(), started);

        if let Some(reason) = detect_change(&prev, &next, tolerance_ms) {
          tracing::info!(?reason, "Clock change detected");
          if tx.send(reason).is_err() {
            break;
          }
        }
        if tx.is_closed() {
          break;
        }
        prev = next;
      }
    })
  }
}
