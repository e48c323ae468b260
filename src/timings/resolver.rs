//! Next/previous prayer resolution.
//!
//! Everything here is pure: callers pass "now" as seconds since local
//! midnight with their own debug offset already applied.

use super::entry::{label_for, PrayerTimeEntry, CANONICAL_PRAYERS};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Flagged entries plus the index of the next prayer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  pub entries: Vec<PrayerTimeEntry>,
  /// `None` only when there are no entries
  pub next_index: Option<usize>,
  /// Every prayer today has passed; the next one is tomorrow's first
  pub wrapped: bool,
}

impl Resolution {
  pub fn next(&self) -> Option<&PrayerTimeEntry> {
    self.next_index.and_then(|i| self.entries.get(i))
  }
}

/// Flag `entries` against `now_seconds`.
///
/// The next prayer is the first one strictly in the future; when none is,
/// the index wraps to 0 (tomorrow's first prayer). While wrapped, an entry
/// is past only if its time is strictly before now.
pub fn resolve(entries: &[PrayerTimeEntry], now_seconds: i64) -> Resolution {
  if entries.is_empty() {
    return Resolution {
      entries: Vec::new(),
      next_index: None,
      wrapped: false,
    };
  }

  let found = entries.iter().position(|e| e.seconds_of_day() > now_seconds);
  let wrapped = found.is_none();
  let next = found.unwrap_or(0);

  let entries = entries
    .iter()
    .enumerate()
    .map(|(idx, entry)| {
      let is_past =
        (idx < next && next != 0) || (next == 0 && entry.seconds_of_day() < now_seconds);
      PrayerTimeEntry {
        is_past,
        is_next: idx == next,
        ..entry.clone()
      }
    })
    .collect();

  Resolution {
    entries,
    next_index: Some(next),
    wrapped,
  }
}

/// Seconds until the next prayer, rolling over to tomorrow when wrapped.
pub fn seconds_until_next(resolution: &Resolution, now_seconds: i64) -> Option<i64> {
  let next = resolution.next()?;
  let mut diff = next.seconds_of_day() - now_seconds;
  if resolution.wrapped || diff < 0 {
    diff += SECONDS_PER_DAY;
  }
  Some(diff)
}

/// The most recently passed prayer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousPrayer {
  pub key: String,
  pub label: String,
  pub elapsed_seconds: i64,
}

/// Find the most recently passed prayer, ignoring Sunrise.
///
/// Before today's first prayer this is yesterday's Isha, approximated by
/// today's Isha time minus one day. Returns `None` when there is no Isha to
/// fall back to.
pub fn previous_prayer_info(entries: &[PrayerTimeEntry], now_seconds: i64) -> Option<PreviousPrayer> {
  let passed = entries
    .iter()
    .filter(|e| CANONICAL_PRAYERS.contains(&e.key.as_str()))
    .filter(|e| e.seconds_of_day() <= now_seconds)
    .max_by_key(|e| e.seconds_of_day());

  if let Some(entry) = passed {
    return Some(PreviousPrayer {
      key: entry.key.clone(),
      label: entry.label.clone(),
      elapsed_seconds: now_seconds - entry.seconds_of_day(),
    });
  }

  let isha = entries.iter().find(|e| e.key == "Isha")?;
  Some(PreviousPrayer {
    key: isha.key.clone(),
    label: label_for(&isha.key),
    elapsed_seconds: now_seconds - (isha.seconds_of_day() - SECONDS_PER_DAY),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn day() -> Vec<PrayerTimeEntry> {
    [
      ("Fajr", 300),
      ("Dhuhr", 720),
      ("Asr", 900),
      ("Maghrib", 1080),
      ("Isha", 1200),
    ]
    .into_iter()
    .map(|(k, m)| PrayerTimeEntry::new(k, m))
    .collect()
  }

  fn flags(resolution: &Resolution) -> Vec<(bool, bool)> {
    resolution
      .entries
      .iter()
      .map(|e| (e.is_past, e.is_next))
      .collect()
  }

  #[test]
  fn test_after_isha_wraps_to_first_prayer() {
    let now = 1250 * 60;
    let resolution = resolve(&day(), now);

    assert_eq!(resolution.next_index, Some(0));
    assert!(resolution.wrapped);
    assert_eq!(
      flags(&resolution),
      vec![(true, true), (true, false), (true, false), (true, false), (true, false)]
    );

    let previous = previous_prayer_info(&day(), now).unwrap();
    assert_eq!(previous.key, "Isha");
    assert_eq!(previous.elapsed_seconds, 50 * 60);
  }

  #[test]
  fn test_midday_flags() {
    let resolution = resolve(&day(), 800 * 60);

    assert_eq!(resolution.next_index, Some(2));
    assert!(!resolution.wrapped);
    assert_eq!(
      flags(&resolution),
      vec![(true, false), (true, false), (false, true), (false, false), (false, false)]
    );
    assert_eq!(seconds_until_next(&resolution, 800 * 60), Some(100 * 60));
  }

  #[test]
  fn test_before_fajr_is_not_wrapped() {
    let resolution = resolve(&day(), 60 * 60);

    assert_eq!(resolution.next_index, Some(0));
    assert!(!resolution.wrapped);
    assert!(resolution.entries.iter().all(|e| !e.is_past));

    let previous = previous_prayer_info(&day(), 60 * 60).unwrap();
    assert_eq!(previous.key, "Isha");
    // yesterday's Isha at 20:00, now 01:00
    assert_eq!(previous.elapsed_seconds, 5 * 3600);
  }

  #[test]
  fn test_prayer_at_exact_now_is_previous_not_next() {
    let now = 720 * 60;
    let resolution = resolve(&day(), now);
    assert_eq!(resolution.next().map(|e| e.key.as_str()), Some("Asr"));

    let previous = previous_prayer_info(&day(), now).unwrap();
    assert_eq!(previous.key, "Dhuhr");
    assert_eq!(previous.elapsed_seconds, 0);
  }

  #[test]
  fn test_sunrise_is_never_previous() {
    let mut entries = day();
    entries.insert(1, PrayerTimeEntry::new("Sunrise", 400));

    let previous = previous_prayer_info(&entries, 500 * 60).unwrap();
    assert_eq!(previous.key, "Fajr");
  }

  #[test]
  fn test_wrapped_countdown_rolls_to_tomorrow() {
    let now = 1250 * 60;
    let resolution = resolve(&day(), now);
    // 20:50 until 05:00 tomorrow
    assert_eq!(seconds_until_next(&resolution, now), Some((1440 - 1250 + 300) * 60));
  }

  #[test]
  fn test_empty_day() {
    let resolution = resolve(&[], 0);
    assert_eq!(resolution.next_index, None);
    assert_eq!(seconds_until_next(&resolution, 0), None);
    assert_eq!(previous_prayer_info(&[], 0), None);
  }
}
