//! Subcommands and their argument parsing

use chrono::NaiveDate;
use clap::Subcommand;

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
  /// Show prayer times for today (or --date)
  Today {
    /// Date as YYYY-MM-DD
    #[arg(long)]
    date: Option<NaiveDate>,
  },
  /// Keep displays updated in the background until interrupted
  Daemon,
  /// Show the persisted schedule as the scheduler sees it
  Status,
  /// Inspect or shift the debug clock offset
  DebugOffset {
    #[command(subcommand)]
    action: OffsetAction,
  },
  /// Maintain the prayer-time cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

impl Default for Command {
  fn default() -> Self {
    Command::Today { date: None }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum OffsetAction {
  Get,
  /// Set the offset, e.g. `90m`, `-2h`, `30s` or plain milliseconds
  Set {
    #[arg(allow_hyphen_values = true, value_parser = parse_offset)]
    offset: i64,
  },
  Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CacheAction {
  /// Drop days older than the retention window
  Cleanup,
  /// Delete everything stored, including the schedule
  Clear,
}

/// Parse a signed offset into milliseconds.
///
/// Accepts an optional `h`, `m` or `s` suffix; bare numbers are
/// milliseconds.
pub fn parse_offset(input: &str) -> Result<i64, String> {
  let input = input.trim();
  let (number, unit_ms) = match input.chars().last() {
    Some('h') => (&input[..input.len() - 1], 3_600_000),
    Some('m') => (&input[..input.len() - 1], 60_000),
    Some('s') => (&input[..input.len() - 1], 1_000),
    _ => (input, 1),
  };

  let value: i64 = number
    .trim()
    .parse()
    .map_err(|_| format!("invalid offset '{}'", input))?;
  value
    .checked_mul(unit_ms)
    .ok_or_else(|| format!("offset '{}' is out of range", input))
}
