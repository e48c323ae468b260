//! Wake-driven background updates of the passive displays.
//!
//! The scheduler is a single task that sleeps on its command and wake
//! channels. Each wake re-derives the next prayer from the persisted
//! schedule, renders, and arms two independent alarms: the next minute
//! boundary, and a point 60 seconds before the next prayer. A wake that
//! lands inside that final minute switches to a per-second countdown until
//! the prayer time passes.

use chrono_tz::Tz;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::alarm::{AlarmKind, AlarmRequest, AlarmService};
use super::display::{build_frame, DisplayError, DisplaySurface};
use super::notify::{AlertLedger, NotificationSurface, DEFAULT_ALERT_LEAD_MINUTES};
use super::state::{ScheduleState, ScheduleStore};
use super::wake_lock::WakeLock;
use crate::clock::{Clock, OffsetClock};
use crate::event::WakeReason;
use crate::timings::TimeFormat;

/// Length of the per-second countdown before each prayer.
pub const ESCALATION_WINDOW_MS: i64 = 60_000;

const MINUTE_MS: i64 = 60_000;
const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
  /// No displays attached, no alarms armed
  Dormant,
  /// Minute-boundary and escalation alarms armed
  PeriodicPolling,
  /// Per-second updates during the final minute
  CountdownEscalated,
}

pub type DisplayId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStatus {
  pub mode: SchedulerMode,
  pub next_prayer_index: usize,
  pub prayers: usize,
  pub displays: usize,
  pub debug_offset_ms: i64,
}

pub enum SchedulerCommand {
  PushSchedule {
    state: ScheduleState,
    reply: oneshot::Sender<Result<()>>,
  },
  IsActive {
    reply: oneshot::Sender<bool>,
  },
  SetDebugOffset {
    offset_ms: i64,
    reply: oneshot::Sender<()>,
  },
  GetDebugOffset {
    reply: oneshot::Sender<i64>,
  },
  AttachDisplay {
    surface: Arc<dyn DisplaySurface>,
    reply: oneshot::Sender<DisplayId>,
  },
  DetachDisplay {
    id: DisplayId,
    reply: oneshot::Sender<()>,
  },
  Status {
    reply: oneshot::Sender<SchedulerStatus>,
  },
  Shutdown,
}

/// What the loop does after applying a command.
pub(super) enum Flow {
  Continue,
  Wake(WakeReason),
  Shutdown,
}

/// Cloneable command surface of a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
  tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
  async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand) -> Result<T> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(make(reply))
      .await
      .map_err(|_| eyre!("Scheduler is not running"))?;
    rx.await.map_err(|_| eyre!("Scheduler stopped before replying"))
  }

  /// Persist `state` and, when displays are attached, wake on it.
  pub async fn push_schedule(&self, state: ScheduleState) -> Result<()> {
    self
      .request(|reply| SchedulerCommand::PushSchedule { state, reply })
      .await?
  }

  /// Whether alarms are armed or a countdown is running.
  pub async fn is_active(&self) -> Result<bool> {
    self.request(|reply| SchedulerCommand::IsActive { reply }).await
  }

  pub async fn set_debug_offset(&self, offset_ms: i64) -> Result<()> {
    self
      .request(|reply| SchedulerCommand::SetDebugOffset { offset_ms, reply })
      .await
  }

  pub async fn get_debug_offset(&self) -> Result<i64> {
    self
      .request(|reply| SchedulerCommand::GetDebugOffset { reply })
      .await
  }

  pub async fn attach_display(&self, surface: Arc<dyn DisplaySurface>) -> Result<DisplayId> {
    self
      .request(|reply| SchedulerCommand::AttachDisplay { surface, reply })
      .await
  }

  pub async fn detach_display(&self, id: DisplayId) -> Result<()> {
    self
      .request(|reply| SchedulerCommand::DetachDisplay { id, reply })
      .await
  }

  pub async fn status(&self) -> Result<SchedulerStatus> {
    self.request(|reply| SchedulerCommand::Status { reply }).await
  }

  pub async fn shutdown(&self) -> Result<()> {
    self
      .tx
      .send(SchedulerCommand::Shutdown)
      .await
      .map_err(|_| eyre!("Scheduler is not running"))
  }
}

pub struct BackgroundUpdateScheduler {
  pub(super) states: ScheduleStore,
  pub(super) clock: OffsetClock,
  pub(super) alarms: Arc<dyn AlarmService>,
  pub(super) wake_lock: WakeLock,
  pub(super) displays: Vec<(DisplayId, Arc<dyn DisplaySurface>)>,
  next_display_id: DisplayId,
  notifiers: Vec<Arc<dyn NotificationSurface>>,
  alerts: AlertLedger,
  pub(super) mode: SchedulerMode,
  pub(super) state: ScheduleState,
  time_format: TimeFormat,
  zone: Tz,
}

impl BackgroundUpdateScheduler {
  pub fn new(states: ScheduleStore, clock: Arc<dyn Clock>, alarms: Arc<dyn AlarmService>) -> Self {
    Self {
      states,
      clock: OffsetClock::new(clock, 0),
      alarms,
      wake_lock: WakeLock::new(
        "meeqat:scheduler",
        WakeLock::DEFAULT_ACQUIRE_TIMEOUT,
        WakeLock::DEFAULT_MAX_HOLD,
      ),
      displays: Vec::new(),
      next_display_id: 1,
      notifiers: Vec::new(),
      alerts: AlertLedger::new(DEFAULT_ALERT_LEAD_MINUTES),
      mode: SchedulerMode::Dormant,
      state: ScheduleState::default(),
      time_format: TimeFormat::default(),
      zone: Tz::UTC,
    }
  }

  pub fn with_time_format(mut self, time_format: TimeFormat) -> Self {
    self.time_format = time_format;
    self
  }

  /// Zone the rendered clock times are shown in.
  pub fn with_zone(mut self, zone: Tz) -> Self {
    self.zone = zone;
    self
  }

  /// Send Athan and Iqama alerts to `notifier`; alerts keep the scheduler
  /// awake even without displays.
  pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSurface>) -> Self {
    self.notifiers.push(notifier);
    self
  }

  pub fn with_alert_lead(mut self, minutes: u32) -> Self {
    self.alerts = AlertLedger::new(minutes);
    self
  }

  pub(super) fn has_consumers(&self) -> bool {
    !self.displays.is_empty() || !self.notifiers.is_empty()
  }

  /// Start the scheduler task.
  ///
  /// `wakes` carries alarm firings and clock-change signals; the task
  /// begins with a recovery wake and exits on shutdown or once every
  /// handle has been dropped.
  pub fn spawn(self, wakes: mpsc::UnboundedReceiver<WakeReason>) -> (SchedulerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(self.run(rx, wakes));
    (SchedulerHandle { tx }, task)
  }

  async fn run(
    mut self,
    mut commands: mpsc::Receiver<SchedulerCommand>,
    mut wakes: mpsc::UnboundedReceiver<WakeReason>,
  ) {
    let mut running = self.handle_wake(WakeReason::Boot, &mut commands).await;

    while running {
      running = tokio::select! {
        cmd = commands.recv() => match cmd {
          Some(cmd) => match self.apply_command(cmd).await {
            Flow::Continue => true,
            Flow::Wake(reason) => self.handle_wake(reason, &mut commands).await,
            Flow::Shutdown => false,
          },
          None => false,
        },
        Some(reason) = wakes.recv() => self.handle_wake(reason, &mut commands).await,
      };
    }

    self.alarms.cancel_all();
    info!("Scheduler stopped");
  }

  /// Rebuild working state from storage: debug offset, then schedule.
  pub(super) async fn recover(&mut self) {
    match self.states.load_debug_offset().await {
      Ok(offset_ms) => self.clock.set_offset_ms(offset_ms),
      Err(e) => warn!(error = %e, "Failed to load debug offset"),
    }
    self.reload_state().await;
    info!(
      prayers = self.state.prayers.len(),
      offset_ms = self.clock.offset_ms(),
      "Recovered schedule"
    );
  }

  async fn reload_state(&mut self) {
    match self.states.load().await {
      Ok(state) => self.state = state,
      Err(e) => warn!(error = %e, "Failed to load schedule, keeping previous"),
    }
  }

  /// Handle one wake. Returns `false` once shutdown was requested.
  pub(super) async fn handle_wake(
    &mut self,
    reason: WakeReason,
    commands: &mut mpsc::Receiver<SchedulerCommand>,
  ) -> bool {
    debug!(?reason, "Wake");
    if reason.needs_recovery() {
      self.recover().await;
    }

    if !self.has_consumers() {
      self.mode = SchedulerMode::Dormant;
      return true;
    }

    if self.perform_wake().await {
      return self.run_countdown(commands).await;
    }
    true
  }

  /// One bounded wake under the wake lock. Returns whether to escalate.
  async fn perform_wake(&mut self) -> bool {
    let guard = match self.wake_lock.acquire().await {
      Ok(guard) => guard,
      Err(e) => {
        warn!(error = %e, "Skipping wake");
        let now = self.clock.now_ms();
        self.schedule_alarms(now, self.state.time_to_next_ms(now));
        return false;
      }
    };

    let max_hold = self.wake_lock.max_hold();
    let escalate = match tokio::time::timeout(max_hold, self.wake_body()).await {
      Ok(escalate) => escalate,
      Err(_) => {
        warn!(?max_hold, "Wake exceeded its hold limit");
        let now = self.clock.now_ms();
        self.schedule_alarms(now, self.state.time_to_next_ms(now));
        false
      }
    };
    drop(guard);
    escalate
  }

  async fn wake_body(&mut self) -> bool {
    self.reload_state().await;
    let now = self.clock.now_ms();
    self.advance_and_persist(now).await;
    self.render(now).await;
    self.send_due_alerts(now).await;

    match self.state.time_to_next_ms(now) {
      Some(ttn) if ttn > 0 && ttn <= ESCALATION_WINDOW_MS => {
        self.alarms.cancel_all();
        true
      }
      ttn => {
        self.schedule_alarms(now, ttn);
        false
      }
    }
  }

  /// Recompute the next prayer index and persist it when it moved.
  pub(super) async fn advance_and_persist(&mut self, now_ms: i64) {
    let index = self.state.advance_index(now_ms);
    if index == self.state.next_prayer_index {
      return;
    }

    debug!(from = self.state.next_prayer_index, to = index, "Next prayer advanced");
    self.state.next_prayer_index = index;
    if let Err(e) = self.states.save(&self.state).await {
      warn!(error = %e, "Failed to persist schedule");
    }
  }

  pub(super) async fn render(&self, now_ms: i64) {
    let frame = build_frame(&self.state, now_ms, &self.zone, self.time_format);
    for (id, surface) in &self.displays {
      match surface.render(&frame).await {
        Ok(()) => {}
        Err(DisplayError::PermissionDenied(reason)) => {
          warn!(display = surface.name(), id, %reason, "Display update not permitted");
        }
        Err(e) => warn!(display = surface.name(), id, error = %e, "Display update failed"),
      }
    }
  }

  pub(super) async fn send_due_alerts(&mut self, now_ms: i64) {
    if self.notifiers.is_empty() {
      return;
    }
    for alert in self.alerts.take_due(&self.state, now_ms) {
      info!(prayer = %alert.prayer, kind = ?alert.kind, "Sending alert");
      for notifier in &self.notifiers {
        match notifier.notify(&alert).await {
          Ok(()) => {}
          Err(DisplayError::PermissionDenied(reason)) => {
            warn!(notifier = notifier.name(), %reason, "Alert not permitted, skipped");
          }
          Err(e) => warn!(notifier = notifier.name(), error = %e, "Alert failed"),
        }
      }
    }
  }

  /// Arm the minute-boundary alarm, plus the escalation alarm when the next
  /// prayer is more than a minute away.
  pub(super) fn schedule_alarms(&mut self, now_ms: i64, ttn_ms: Option<i64>) {
    let next_minute = (now_ms.div_euclid(MINUTE_MS) + 1) * MINUTE_MS;
    self
      .alarms
      .set_exact(AlarmRequest::new(AlarmKind::MinuteBoundary, next_minute, now_ms));

    match ttn_ms {
      Some(ttn) if ttn > ESCALATION_WINDOW_MS => {
        let at_ms = now_ms + ttn - ESCALATION_WINDOW_MS;
        self
          .alarms
          .set_exact(AlarmRequest::new(AlarmKind::Escalation, at_ms, now_ms));
      }
      _ => self.alarms.cancel(AlarmKind::Escalation),
    }

    self.mode = SchedulerMode::PeriodicPolling;
  }

  /// Apply a command without running a wake.
  pub(super) async fn apply_command(&mut self, cmd: SchedulerCommand) -> Flow {
    match cmd {
      SchedulerCommand::PushSchedule { state, reply } => {
        let saved = match state.validate() {
          Ok(()) => self.states.save(&state).await,
          Err(e) => Err(e),
        };
        let accepted = saved.is_ok();
        if accepted {
          self.state = state;
        }
        let _ = reply.send(saved);
        if accepted {
          Flow::Wake(WakeReason::Pushed)
        } else {
          Flow::Continue
        }
      }
      SchedulerCommand::IsActive { reply } => {
        let _ = reply.send(self.mode != SchedulerMode::Dormant);
        Flow::Continue
      }
      SchedulerCommand::SetDebugOffset { offset_ms, reply } => {
        self.clock.set_offset_ms(offset_ms);
        if let Err(e) = self.states.save_debug_offset(offset_ms).await {
          warn!(error = %e, "Failed to persist debug offset");
        }
        let _ = reply.send(());
        Flow::Wake(WakeReason::OffsetChanged)
      }
      SchedulerCommand::GetDebugOffset { reply } => {
        let _ = reply.send(self.clock.offset_ms());
        Flow::Continue
      }
      SchedulerCommand::AttachDisplay { surface, reply } => {
        let id = self.next_display_id;
        self.next_display_id += 1;
        info!(display = surface.name(), id, "Display attached");
        self.displays.push((id, surface));
        let _ = reply.send(id);
        Flow::Wake(WakeReason::DisplayAttached)
      }
      SchedulerCommand::DetachDisplay { id, reply } => {
        self.displays.retain(|(existing, _)| *existing != id);
        if !self.has_consumers() {
          self.alarms.cancel_all();
          self.mode = SchedulerMode::Dormant;
          info!("Last display detached, going dormant");
        }
        let _ = reply.send(());
        Flow::Continue
      }
      SchedulerCommand::Status { reply } => {
        let _ = reply.send(SchedulerStatus {
          mode: self.mode,
          next_prayer_index: self.state.next_prayer_index,
          prayers: self.state.prayers.len(),
          displays: self.displays.len(),
          debug_offset_ms: self.clock.offset_ms(),
        });
        Flow::Continue
      }
      SchedulerCommand::Shutdown => Flow::Shutdown,
    }
  }
}
