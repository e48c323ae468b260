use std::collections::BTreeMap;

/// Prayer keys in chronological order.
pub const PRAYER_ORDER: [&str; 6] = ["Fajr", "Sunrise", "Dhuhr", "Asr", "Maghrib", "Isha"];

/// Prayers that can be "the previous prayer" (Sunrise is not a prayer).
pub const CANONICAL_PRAYERS: [&str; 5] = ["Fajr", "Dhuhr", "Asr", "Maghrib", "Isha"];

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// One resolved prayer time for a day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrayerTimeEntry {
  pub key: String,
  pub label: String,
  pub minutes_of_day: u32,
  pub is_past: bool,
  pub is_next: bool,
}

impl PrayerTimeEntry {
  pub fn new(key: &str, minutes_of_day: u32) -> Self {
    Self {
      key: key.to_string(),
      label: label_for(key),
      minutes_of_day,
      is_past: false,
      is_next: false,
    }
  }

  pub fn seconds_of_day(&self) -> i64 {
    i64::from(self.minutes_of_day) * 60
  }
}

/// Display label for a prayer key.
pub fn label_for(key: &str) -> String {
  key.to_string()
}

/// Parse a provider time string into minutes since midnight.
///
/// Accepts `HH:MM`, `H:MM`, trailing annotations such as `05:12 (BST)` and
/// 12-hour `H:MM AM` / `H:MM PM`.
pub fn parse_time_to_minutes(raw: &str) -> Option<u32> {
  let raw = raw.trim();
  let (clock, rest) = raw.split_at(raw.find(|c: char| c.is_whitespace()).unwrap_or(raw.len()));

  let (hours, minutes) = clock.split_once(':')?;
  let hours: u32 = hours.parse().ok()?;
  let minutes: u32 = minutes.get(..2)?.parse().ok()?;
  if minutes >= 60 {
    return None;
  }

  let meridiem = rest
    .split_whitespace()
    .next()
    .map(|m| m.to_ascii_uppercase());

  let hours = match meridiem.as_deref() {
    Some("AM") | Some("PM") if !(1..=12).contains(&hours) => return None,
    Some("AM") => hours % 12,
    Some("PM") => hours % 12 + 12,
    _ => hours,
  };

  let total = hours * 60 + minutes;
  (total < MINUTES_PER_DAY).then_some(total)
}

/// Build the ordered entry list from a provider timings map.
///
/// Entries are emitted in [`PRAYER_ORDER`]; keys that are missing or whose
/// time does not parse are skipped.
pub fn entries_from_timings(timings: &BTreeMap<String, String>) -> Vec<PrayerTimeEntry> {
  PRAYER_ORDER
    .iter()
    .filter_map(|key| {
      let minutes = parse_time_to_minutes(timings.get(*key)?)?;
      Some(PrayerTimeEntry::new(key, minutes))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_24h_formats() {
    assert_eq!(parse_time_to_minutes("05:12"), Some(312));
    assert_eq!(parse_time_to_minutes("5:12"), Some(312));
    assert_eq!(parse_time_to_minutes("23:59"), Some(1439));
    assert_eq!(parse_time_to_minutes("05:12 (BST)"), Some(312));
  }

  #[test]
  fn test_parse_12h_formats() {
    assert_eq!(parse_time_to_minutes("5:12 AM"), Some(312));
    assert_eq!(parse_time_to_minutes("12:05 am"), Some(5));
    assert_eq!(parse_time_to_minutes("12:30 PM"), Some(750));
    assert_eq!(parse_time_to_minutes("7:45 PM"), Some(1185));
  }

  #[test]
  fn test_parse_rejects_garbage() {
    assert_eq!(parse_time_to_minutes(""), None);
    assert_eq!(parse_time_to_minutes("noon"), None);
    assert_eq!(parse_time_to_minutes("24:00"), None);
    assert_eq!(parse_time_to_minutes("10:75"), None);
    assert_eq!(parse_time_to_minutes("13:00 PM"), None);
  }

  #[test]
  fn test_entries_follow_prayer_order_and_skip_bad_times() {
    let timings: BTreeMap<String, String> = [
      ("Isha", "19:28"),
      ("Fajr", "04:58"),
      ("Dhuhr", "12:06"),
      ("Asr", "??"),
      ("Maghrib", "17:58"),
      ("Imsak", "04:48"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let keys: Vec<String> = entries_from_timings(&timings)
      .into_iter()
      .map(|e| e.key)
      .collect();
    assert_eq!(keys, vec!["Fajr", "Dhuhr", "Maghrib", "Isha"]);
  }
}
