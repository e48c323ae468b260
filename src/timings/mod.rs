//! Prayer-time parsing, formatting and next/previous resolution.

mod entry;
mod format;
mod resolver;

pub use entry::{
  entries_from_timings, label_for, parse_time_to_minutes, PrayerTimeEntry, CANONICAL_PRAYERS,
  MINUTES_PER_DAY, PRAYER_ORDER,
};
pub use format::{countdown_text, elapsed_text, format_hms, format_minutes, TimeFormat};
pub use resolver::{
  previous_prayer_info, resolve, seconds_until_next, PreviousPrayer, Resolution, SECONDS_PER_DAY,
};
