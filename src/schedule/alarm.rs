//! One-shot wake alarms.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::event::WakeReason;

/// The two independent alarms the scheduler keeps armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmKind {
  /// Next wall-clock minute boundary
  MinuteBoundary,
  /// 60 seconds before the next prayer
  Escalation,
}

/// An alarm to arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmRequest {
  pub kind: AlarmKind,
  /// Target instant on the scheduler's (offset) clock
  pub at_ms: i64,
  /// How long to sleep from now
  pub delay: Duration,
}

impl AlarmRequest {
  pub fn new(kind: AlarmKind, at_ms: i64, now_ms: i64) -> Self {
    Self {
      kind,
      at_ms,
      delay: Duration::from_millis((at_ms - now_ms).max(0) as u64),
    }
  }
}

/// Exact one-shot alarms, at most one armed per kind.
pub trait AlarmService: Send + Sync {
  /// Arm `request`, replacing any alarm of the same kind.
  fn set_exact(&self, request: AlarmRequest);

  fn cancel(&self, kind: AlarmKind);

  fn cancel_all(&self);
}

/// Alarms backed by sleeping tokio tasks that post one wake and exit.
pub struct TokioAlarms {
  tx: mpsc::UnboundedSender<WakeReason>,
  armed: Mutex<HashMap<AlarmKind, JoinHandle<()>>>,
}

impl TokioAlarms {
  pub fn new(tx: mpsc::UnboundedSender<WakeReason>) -> Self {
    Self {
      tx,
      armed: Mutex::new(HashMap::new()),
    }
  }
}

impl AlarmService for TokioAlarms {
  fn set_exact(&self, request: AlarmRequest) {
    let tx = self.tx.clone();
    let handle = tokio::spawn(async move {
      tokio::time::sleep(request.delay).await;
      let _ = tx.send(WakeReason::Alarm(request.kind));
    });

    let mut armed = self.armed.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(previous) = armed.insert(request.kind, handle) {
      previous.abort();
    }
    debug!(kind = ?request.kind, at_ms = request.at_ms, "Alarm armed");
  }

  fn cancel(&self, kind: AlarmKind) {
    let mut armed = self.armed.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(handle) = armed.remove(&kind) {
      handle.abort();
    }
  }

  fn cancel_all(&self) {
    let mut armed = self.armed.lock().unwrap_or_else(|e| e.into_inner());
    for (_, handle) in armed.drain() {
      handle.abort();
    }
  }
}

impl Drop for TokioAlarms {
  fn drop(&mut self) {
    self.cancel_all();
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_alarm_fires_once_after_delay() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let alarms = TokioAlarms::new(tx);

    let started = tokio::time::Instant::now();
    alarms.set_exact(AlarmRequest::new(AlarmKind::MinuteBoundary, 30_000, 0));

    assert_eq!(rx.recv().await, Some(WakeReason::Alarm(AlarmKind::MinuteBoundary)));
    assert_eq!(started.elapsed(), Duration::from_secs(30));
  }

  #[tokio::test(start_paused = true)]
  async fn test_rearming_replaces_previous_alarm() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let alarms = TokioAlarms::new(tx);

    alarms.set_exact(AlarmRequest::new(AlarmKind::Escalation, 10_000, 0));
    alarms.set_exact(AlarmRequest::new(AlarmKind::Escalation, 20_000, 0));
    alarms.set_exact(AlarmRequest::new(AlarmKind::MinuteBoundary, 5_000, 0));
    alarms.cancel(AlarmKind::MinuteBoundary);

    let started = tokio::time::Instant::now();
    assert_eq!(rx.recv().await, Some(WakeReason::Alarm(AlarmKind::Escalation)));
    assert_eq!(started.elapsed(), Duration::from_secs(20));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_all_silences_everything() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let alarms = TokioAlarms::new(tx);

    alarms.set_exact(AlarmRequest::new(AlarmKind::Escalation, 10_000, 0));
    alarms.set_exact(AlarmRequest::new(AlarmKind::MinuteBoundary, 1_000, 0));
    alarms.cancel_all();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(rx.try_recv().is_err());
  }

  #[test]
  fn test_request_in_the_past_fires_immediately() {
    let request = AlarmRequest::new(AlarmKind::MinuteBoundary, 1_000, 5_000);
    assert_eq!(request.delay, Duration::ZERO);
  }
}
