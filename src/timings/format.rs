const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;

/// How clock times are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TimeFormat {
  #[default]
  #[serde(rename = "24h")]
  H24,
  #[serde(rename = "12h")]
  H12,
}

/// `HH:MM:SS` for a non-negative number of seconds.
pub fn format_hms(total_seconds: i64) -> String {
  let total_seconds = total_seconds.max(0);
  format!(
    "{:02}:{:02}:{:02}",
    total_seconds / 3600,
    (total_seconds % 3600) / 60,
    total_seconds % 60
  )
}

/// Short countdown to a target `diff_ms` in the future.
pub fn countdown_text(diff_ms: i64) -> String {
  if diff_ms <= 0 {
    return "Now".to_string();
  }

  let hours = diff_ms / MS_PER_HOUR;
  let minutes = (diff_ms % MS_PER_HOUR) / MS_PER_MINUTE;
  let seconds = (diff_ms % MS_PER_MINUTE) / MS_PER_SECOND;

  if hours > 0 {
    format!("{}h {}m", hours, minutes)
  } else if minutes >= 1 {
    format!("{}m", minutes)
  } else {
    format!("{}s", seconds)
  }
}

/// Short "time since" text for something `diff_ms` in the past.
pub fn elapsed_text(diff_ms: i64) -> String {
  if diff_ms <= 0 {
    return "now".to_string();
  }

  let hours = diff_ms / MS_PER_HOUR;
  let minutes = (diff_ms % MS_PER_HOUR) / MS_PER_MINUTE;

  if hours > 0 {
    format!("{}h {}m ago", hours, minutes)
  } else {
    format!("{}m ago", minutes)
  }
}

/// Format minutes since midnight as a clock time.
pub fn format_minutes(minutes_of_day: u32, format: TimeFormat) -> String {
  let hours = (minutes_of_day / 60) % 24;
  let minutes = minutes_of_day % 60;
  match format {
    TimeFormat::H24 => format!("{:02}:{:02}", hours, minutes),
    TimeFormat::H12 => {
      let suffix = if hours < 12 { "AM" } else { "PM" };
      let hours = match hours % 12 {
        0 => 12,
        h => h,
      };
      format!("{}:{:02} {}", hours, minutes, suffix)
    }
  }
}
