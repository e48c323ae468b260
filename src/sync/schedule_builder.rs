//! Conversion from cached days into an absolute-time schedule.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::cache::CachedDay;
use crate::provider::Location;
use crate::schedule::{PrayerSlot, ScheduleState};
use crate::timings::{entries_from_timings, PrayerTimeEntry};

const MS_PER_DAY: i64 = 86_400_000;

/// Epoch milliseconds of `minutes` past midnight on `date` in `tz`.
///
/// A time that falls into a DST gap is moved forward by an hour.
fn instant_ms<Tz: TimeZone>(tz: &Tz, date: NaiveDate, minutes: u32) -> Option<i64> {
  let time = NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0)?;
  let naive = NaiveDateTime::new(date, time);
  tz.from_local_datetime(&naive)
    .earliest()
    .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
    .map(|dt| dt.timestamp_millis())
}

fn slots<Tz: TimeZone>(tz: &Tz, date: NaiveDate, entries: &[PrayerTimeEntry]) -> Vec<PrayerSlot> {
  entries
    .iter()
    .filter_map(|entry| {
      Some(PrayerSlot {
        name: entry.key.clone(),
        label: entry.label.clone(),
        time_ms: instant_ms(tz, date, entry.minutes_of_day)?,
      })
    })
    .collect()
}

/// Build the schedule for `date` from its cached day.
///
/// `tomorrow` supplies the next-day prayer when cached; otherwise today's
/// first prayer one day later stands in for it.
pub fn build_schedule<Tz: TimeZone>(
  tz: &Tz,
  date: NaiveDate,
  today: &CachedDay,
  tomorrow: Option<&CachedDay>,
  now_ms: i64,
  location: &Location,
) -> ScheduleState {
  let mut prayers = slots(tz, date, &entries_from_timings(&today.timings));
  prayers.sort_by_key(|p| p.time_ms);

  let next_day_prayer = tomorrow
    .and_then(|day| {
      let next_date = date.succ_opt()?;
      slots(tz, next_date, &entries_from_timings(&day.timings))
        .into_iter()
        .next()
    })
    .or_else(|| {
      prayers.first().map(|first| PrayerSlot {
        time_ms: first.time_ms + MS_PER_DAY,
        ..first.clone()
      })
    });

  let next_prayer_index = prayers
    .iter()
    .position(|p| p.time_ms > now_ms)
    .unwrap_or(prayers.len().saturating_sub(1));

  ScheduleState {
    next_day_prayer,
    hijri_date: today.hijri_date.clone(),
    gregorian_date: Some(today.date_readable.clone()),
    city: Some(location.city.clone()),
    country_code: location.country_code.clone(),
    ..ScheduleState::new(prayers, next_prayer_index)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use std::collections::BTreeMap;

  fn day(times: &[(&str, &str)]) -> CachedDay {
    CachedDay {
      timings: times
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>(),
      date_readable: "14 Oct 2026".to_string(),
      timezone: "UTC".to_string(),
      method_name: None,
      hijri_date: Some("03 Jumādá al-ūlá 1448".to_string()),
      saved_at: 0,
    }
  }

  fn location() -> Location {
    Location {
      city: "Makkah".to_string(),
      country: "Saudi Arabia".to_string(),
      country_code: Some("SA".to_string()),
    }
  }

  fn at(date: NaiveDate, h: u32, m: u32) -> i64 {
    date.and_hms_opt(h, m, 0).unwrap().and_utc().timestamp_millis()
  }

  #[test]
  fn test_schedule_uses_absolute_instants_and_next_index() {
    let date = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
    let today = day(&[
      ("Fajr", "05:00"),
      ("Sunrise", "06:20"),
      ("Dhuhr", "12:00"),
      ("Asr", "15:30"),
      ("Maghrib", "18:00"),
      ("Isha", "19:30"),
    ]);

    let state = build_schedule(&Utc, date, &today, None, at(date, 13, 0), &location());

    assert_eq!(state.prayers.len(), 6);
    assert_eq!(state.prayers[0].time_ms, at(date, 5, 0));
    assert_eq!(state.prayers[state.next_prayer_index].name, "Asr");
    assert_eq!(state.city.as_deref(), Some("Makkah"));
    assert_eq!(state.country_code.as_deref(), Some("SA"));
    assert_eq!(state.gregorian_date.as_deref(), Some("14 Oct 2026"));
    assert!(state.validate().is_ok());

    let next_day = state.next_day_prayer.unwrap();
    assert_eq!(next_day.name, "Fajr");
    assert_eq!(next_day.time_ms, at(date, 5, 0) + MS_PER_DAY);
  }

  #[test]
  fn test_next_day_prayer_prefers_tomorrows_cache() {
    let date = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
    let today = day(&[("Fajr", "05:00"), ("Isha", "19:30")]);
    let tomorrow = day(&[("Fajr", "05:01"), ("Isha", "19:29")]);

    let state = build_schedule(&Utc, date, &today, Some(&tomorrow), at(date, 21, 0), &location());

    assert_eq!(state.next_prayer_index, 1);
    let next_day = state.next_day_prayer.unwrap();
    assert_eq!(next_day.time_ms, at(date.succ_opt().unwrap(), 5, 1));
  }
}
