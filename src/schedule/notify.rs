//! Athan and Iqama reminders.
//!
//! Two alerts per prayer: one a few minutes before the Athan, one the same
//! number of minutes after it to get ready for Iqama. Each fires at most
//! once per prayer instance.

use async_trait::async_trait;
use std::collections::HashSet;
use std::io::Write;

use super::display::DisplayError;
use super::state::{PrayerSlot, ScheduleState};
use crate::timings::CANONICAL_PRAYERS;

pub const DEFAULT_ALERT_LEAD_MINUTES: u32 = 5;

const MINUTE_MS: i64 = 60_000;
const FORGET_AFTER_MS: i64 = 2 * 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
  /// Minutes before the Athan
  BeforeAthan,
  /// Minutes after the Athan, ahead of Iqama
  BeforeIqama,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
  pub kind: AlertKind,
  pub prayer: String,
  pub title: String,
  pub body: String,
  /// Instant of the prayer the alert is about
  pub prayer_ms: i64,
}

impl Alert {
  fn new(kind: AlertKind, slot: &PrayerSlot, lead_minutes: u32) -> Self {
    let body = match kind {
      AlertKind::BeforeAthan => format!("Athan for {} in {} minutes", slot.label, lead_minutes),
      AlertKind::BeforeIqama => format!("Get ready for Iqama for {}", slot.label),
    };
    Self {
      kind,
      prayer: slot.name.clone(),
      title: "Meeqat".to_string(),
      body,
      prayer_ms: slot.time_ms,
    }
  }
}

/// Decides which alerts are due and remembers the ones already sent.
#[derive(Debug)]
pub struct AlertLedger {
  lead_minutes: u32,
  fired: HashSet<(AlertKind, i64)>,
}

impl AlertLedger {
  pub fn new(lead_minutes: u32) -> Self {
    Self {
      lead_minutes,
      fired: HashSet::new(),
    }
  }

  /// Alerts whose one-minute window contains `now_ms` and that have not
  /// fired yet. Returned alerts count as fired.
  pub fn take_due(&mut self, state: &ScheduleState, now_ms: i64) -> Vec<Alert> {
    self.fired.retain(|(_, at)| *at > now_ms - FORGET_AFTER_MS);

    let lead_ms = i64::from(self.lead_minutes) * MINUTE_MS;
    let slots = state
      .prayers
      .iter()
      .chain(state.next_day_prayer.iter())
      .filter(|p| CANONICAL_PRAYERS.contains(&p.name.as_str()));

    let mut due = Vec::new();
    for slot in slots {
      for (kind, opens_at) in [
        (AlertKind::BeforeAthan, slot.time_ms - lead_ms),
        (AlertKind::BeforeIqama, slot.time_ms + lead_ms),
      ] {
        let in_window = now_ms >= opens_at && now_ms < opens_at + MINUTE_MS;
        if in_window && self.fired.insert((kind, slot.time_ms)) {
          due.push(Alert::new(kind, slot, self.lead_minutes));
        }
      }
    }
    due
  }
}

/// Something that can show a user-visible alert.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
  fn name(&self) -> &str;

  async fn notify(&self, alert: &Alert) -> Result<(), DisplayError>;
}

/// Prints alerts next to the status lines.
#[derive(Debug, Default)]
pub struct StdoutNotifier;

#[async_trait]
impl NotificationSurface for StdoutNotifier {
  fn name(&self) -> &str {
    "stdout"
  }

  async fn notify(&self, alert: &Alert) -> Result<(), DisplayError> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "[{}] {}", alert.title, alert.body)?;
    out.flush()?;
    Ok(())
  }
}

/// Runs an external program with the title and body appended as arguments,
/// e.g. `notify-send`.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
  program: String,
  args: Vec<String>,
}

impl CommandNotifier {
  /// `None` for an empty command line.
  pub fn from_command_line(command: &[String]) -> Option<Self> {
    let (program, args) = command.split_first()?;
    Some(Self {
      program: program.clone(),
      args: args.to_vec(),
    })
  }
}

#[async_trait]
impl NotificationSurface for CommandNotifier {
  fn name(&self) -> &str {
    &self.program
  }

  async fn notify(&self, alert: &Alert) -> Result<(), DisplayError> {
    let status = tokio::process::Command::new(&self.program)
      .args(&self.args)
      .arg(&alert.title)
      .arg(&alert.body)
      .status()
      .await
      .map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DisplayError::PermissionDenied(self.program.clone()),
        _ => DisplayError::Io(e),
      })?;

    if status.success() {
      Ok(())
    } else {
      Err(DisplayError::Io(std::io::Error::other(format!(
        "{} exited with {}",
        self.program, status
      ))))
    }
  }
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use std::sync::Mutex;

  #[derive(Default)]
  pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
  }

  impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
      self.alerts.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl NotificationSurface for RecordingNotifier {
    fn name(&self) -> &str {
      "recording"
    }

    async fn notify(&self, alert: &Alert) -> Result<(), DisplayError> {
      self.alerts.lock().unwrap().push(alert.clone());
      Ok(())
    }
  }
}
