//! Passive display surfaces and the frame they render.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Timelike};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

use super::state::{PrayerSlot, ScheduleState};
use crate::timings::{countdown_text, elapsed_text, format_minutes, TimeFormat, CANONICAL_PRAYERS};

const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Error)]
pub enum DisplayError {
  #[error("display {0} is not permitted to update")]
  PermissionDenied(String),
  #[error("display write failed: {0}")]
  Io(#[from] std::io::Error),
  #[error("display encoding failed: {0}")]
  Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRow {
  pub label: String,
  pub time: String,
}

/// Everything a display shows at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderFrame {
  pub next_label: String,
  pub next_time: String,
  pub countdown_text: String,
  pub previous_label: Option<String>,
  pub elapsed_text: Option<String>,
  pub day_list: Vec<DayRow>,
  /// Row of the next prayer; `None` while tomorrow's first prayer is shown
  pub highlighted_index: Option<usize>,
  pub hijri_date: Option<String>,
  pub gregorian_date: Option<String>,
  pub city: Option<String>,
  pub country_code: Option<String>,
}

impl RenderFrame {
  /// Placeholder shown before any schedule exists.
  pub fn loading() -> Self {
    Self {
      next_label: "Loading".to_string(),
      next_time: "--:--".to_string(),
      countdown_text: String::new(),
      previous_label: None,
      elapsed_text: None,
      day_list: Vec::new(),
      highlighted_index: None,
      hijri_date: None,
      gregorian_date: None,
      city: None,
      country_code: None,
    }
  }

  /// Single status line, e.g. `Asr 15:28 in 2h 5m | Dhuhr 1h 10m ago`.
  pub fn status_line(&self) -> String {
    let mut line = format!("{} {}", self.next_label, self.next_time);
    if !self.countdown_text.is_empty() {
      line.push_str(&format!(" in {}", self.countdown_text));
    }
    if let (Some(label), Some(elapsed)) = (&self.previous_label, &self.elapsed_text) {
      line.push_str(&format!(" | {} {}", label, elapsed));
    }
    line
  }
}

fn clock_time<Tz: TimeZone>(tz: &Tz, time_ms: i64, format: TimeFormat) -> String {
  match DateTime::from_timestamp_millis(time_ms) {
    Some(utc) => {
      let local = utc.with_timezone(tz);
      format_minutes(local.hour() * 60 + local.minute(), format)
    }
    None => "--:--".to_string(),
  }
}

/// Most recent passed prayer other than Sunrise, or yesterday's Isha.
fn previous_slot(prayers: &[PrayerSlot], now_ms: i64) -> Option<(String, i64)> {
  let canonical = |p: &&PrayerSlot| CANONICAL_PRAYERS.contains(&p.name.as_str());

  if let Some(passed) = prayers
    .iter()
    .filter(canonical)
    .filter(|p| p.time_ms <= now_ms)
    .max_by_key(|p| p.time_ms)
  {
    return Some((passed.label.clone(), passed.time_ms));
  }

  prayers
    .iter()
    .find(|p| p.name == "Isha")
    .map(|isha| (isha.label.clone(), isha.time_ms - MS_PER_DAY))
}

/// Build the frame for `state` at `now_ms`.
///
/// The highlighted row and the countdown target follow the state's next
/// prayer index, so a clock moved backwards never moves the display back.
pub fn build_frame<Tz: TimeZone>(
  state: &ScheduleState,
  now_ms: i64,
  tz: &Tz,
  format: TimeFormat,
) -> RenderFrame {
  if state.is_empty() {
    return RenderFrame::loading();
  }

  let highlighted_index = state.highlighted_index(now_ms);
  let target = state
    .next_target(now_ms)
    .or(state.prayers.last())
    .cloned();

  let (next_label, next_time, countdown) = match target {
    Some(slot) => (
      slot.label.clone(),
      clock_time(tz, slot.time_ms, format),
      countdown_text(slot.time_ms - now_ms),
    ),
    None => ("--".to_string(), "--:--".to_string(), String::new()),
  };

  let previous = previous_slot(&state.prayers, now_ms);

  RenderFrame {
    next_label,
    next_time,
    countdown_text: countdown,
    previous_label: previous.as_ref().map(|(label, _)| label.clone()),
    elapsed_text: previous.map(|(_, at)| elapsed_text(now_ms - at)),
    day_list: state
      .prayers
      .iter()
      .map(|p| DayRow {
        label: p.label.clone(),
        time: clock_time(tz, p.time_ms, format),
      })
      .collect(),
    highlighted_index,
    hijri_date: state.hijri_date.clone(),
    gregorian_date: state.gregorian_date.clone(),
    city: state.city.clone(),
    country_code: state.country_code.clone(),
  }
}

/// A passive consumer of render frames.
#[async_trait]
pub trait DisplaySurface: Send + Sync {
  fn name(&self) -> &str;

  async fn render(&self, frame: &RenderFrame) -> Result<(), DisplayError>;
}

/// Prints one status line per frame.
#[derive(Debug, Default)]
pub struct StdoutDisplay;

#[async_trait]
impl DisplaySurface for StdoutDisplay {
  fn name(&self) -> &str {
    "stdout"
  }

  async fn render(&self, frame: &RenderFrame) -> Result<(), DisplayError> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", frame.status_line())?;
    out.flush()?;
    Ok(())
  }
}

/// Writes each frame as JSON, for status bars and widgets to poll.
#[derive(Debug, Clone)]
pub struct StatusFileDisplay {
  path: PathBuf,
}

impl StatusFileDisplay {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

#[async_trait]
impl DisplaySurface for StatusFileDisplay {
  fn name(&self) -> &str {
    "status-file"
  }

  async fn render(&self, frame: &RenderFrame) -> Result<(), DisplayError> {
    let json = serde_json::to_vec_pretty(frame)?;
    let tmp = self.path.with_extension("json.tmp");

    let written = async {
      tokio::fs::write(&tmp, &json).await?;
      tokio::fs::rename(&tmp, &self.path).await
    }
    .await;

    written.map_err(|e| match e.kind() {
      std::io::ErrorKind::PermissionDenied => {
        DisplayError::PermissionDenied(self.path.display().to_string())
      }
      _ => DisplayError::Io(e),
    })
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{NaiveDate, Utc};

  fn at(h: u32, m: u32, s: u32) -> i64 {
    NaiveDate::from_ymd_opt(2026, 10, 14)
      .unwrap()
      .and_hms_opt(h, m, s)
      .unwrap()
      .and_utc()
      .timestamp_millis()
  }

  fn slot(name: &str, time_ms: i64) -> PrayerSlot {
    PrayerSlot {
      name: name.to_string(),
      label: name.to_string(),
      time_ms,
    }
  }

  fn state() -> ScheduleState {
    let mut state = ScheduleState::new(
      vec![
        slot("Fajr", at(5, 0, 0)),
        slot("Sunrise", at(6, 20, 0)),
        slot("Dhuhr", at(12, 0, 0)),
        slot("Asr", at(15, 30, 0)),
        slot("Maghrib", at(18, 0, 0)),
        slot("Isha", at(19, 30, 0)),
      ],
      0,
    );
    state.next_day_prayer = Some(slot("Fajr", at(5, 0, 0) + MS_PER_DAY));
    state.hijri_date = Some("03 Jumādá al-ūlá 1448".to_string());
    state
  }

  #[test]
  fn test_empty_state_renders_loading() {
    let frame = build_frame(&ScheduleState::default(), 0, &Utc, TimeFormat::H24);
    assert_eq!(frame, RenderFrame::loading());
  }

  #[test]
  fn test_midday_frame() {
    let frame = build_frame(&state(), at(13, 10, 0), &Utc, TimeFormat::H24);

    assert_eq!(frame.next_label, "Asr");
    assert_eq!(frame.next_time, "15:30");
    assert_eq!(frame.countdown_text, "2h 20m");
    assert_eq!(frame.previous_label.as_deref(), Some("Dhuhr"));
    assert_eq!(frame.elapsed_text.as_deref(), Some("1h 10m ago"));
    assert_eq!(frame.highlighted_index, Some(3));
    assert_eq!(frame.day_list.len(), 6);
    assert_eq!(frame.day_list[1].time, "06:20");
  }

  #[test]
  fn test_sunrise_is_skipped_for_previous() {
    let frame = build_frame(&state(), at(7, 0, 0), &Utc, TimeFormat::H12);
    assert_eq!(frame.previous_label.as_deref(), Some("Fajr"));
    assert_eq!(frame.next_time, "12:00 PM");
  }

  #[test]
  fn test_before_fajr_previous_is_yesterdays_isha() {
    let frame = build_frame(&state(), at(1, 0, 0), &Utc, TimeFormat::H24);
    assert_eq!(frame.previous_label.as_deref(), Some("Isha"));
    assert_eq!(frame.elapsed_text.as_deref(), Some("5h 30m ago"));
  }

  #[test]
  fn test_after_isha_shows_next_day_without_highlight() {
    let frame = build_frame(&state(), at(22, 0, 0), &Utc, TimeFormat::H24);

    assert_eq!(frame.next_label, "Fajr");
    assert_eq!(frame.countdown_text, "7h 0m");
    assert_eq!(frame.highlighted_index, None);
  }

  #[test]
  fn test_frame_follows_stored_index_when_clock_is_behind() {
    let mut state = state();
    state.next_prayer_index = 5;

    let frame = build_frame(&state, at(15, 5, 0), &Utc, TimeFormat::H24);
    assert_eq!(frame.highlighted_index, Some(5));
    assert_eq!(frame.next_label, "Isha");
    assert_eq!(frame.countdown_text, "4h 25m");
  }

  #[test]
  fn test_frame_times_use_the_given_zone() {
    let frame = build_frame(&state(), at(13, 10, 0), &chrono_tz::Asia::Tokyo, TimeFormat::H24);
    // 15:30 UTC is 00:30 the next day in Tokyo
    assert_eq!(frame.next_time, "00:30");
    assert_eq!(frame.day_list[0].time, "14:00");
  }

  #[test]
  fn test_last_seconds_countdown() {
    let frame = build_frame(&state(), at(17, 59, 15), &Utc, TimeFormat::H24);
    assert_eq!(frame.countdown_text, "45s");
    assert_eq!(frame.status_line(), "Maghrib 18:00 in 45s | Asr 2h 29m ago");
  }

  #[tokio::test]
  async fn test_status_file_is_replaced_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("status.json");
    let display = StatusFileDisplay::new(&path);

    let frame = build_frame(&state(), at(13, 10, 0), &Utc, TimeFormat::H24);
    display.render(&frame).await.unwrap();

    let written: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["nextLabel"], "Asr");
    assert_eq!(written["highlightedIndex"], 3);
    assert!(!path.with_extension("json.tmp").exists());
  }

  #[tokio::test]
  async fn test_status_file_missing_directory_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let display = StatusFileDisplay::new(dir.path().join("missing").join("status.json"));

    let err = display.render(&RenderFrame::loading()).await.unwrap_err();
    assert!(matches!(err, DisplayError::Io(_)));
  }
}
