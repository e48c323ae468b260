//! Background scheduling of the passive display surfaces.
//!
//! The data layer pushes a [`ScheduleState`] through a [`SchedulerHandle`];
//! from then on the [`BackgroundUpdateScheduler`] keeps the displays current
//! on its own, surviving restarts through the persisted state.

mod alarm;
mod countdown;
mod display;
mod notify;
mod scheduler;
mod state;
mod wake_lock;

pub use alarm::{AlarmKind, AlarmRequest, AlarmService, TokioAlarms};
pub use display::{
  build_frame, DayRow, DisplayError, DisplaySurface, RenderFrame, StatusFileDisplay, StdoutDisplay,
};
pub use notify::{
  Alert, AlertKind, AlertLedger, CommandNotifier, NotificationSurface, StdoutNotifier,
  DEFAULT_ALERT_LEAD_MINUTES,
};
pub use scheduler::{
  BackgroundUpdateScheduler, DisplayId, SchedulerHandle, SchedulerMode, SchedulerStatus,
  ESCALATION_WINDOW_MS,
};
pub use state::{PrayerSlot, ScheduleState, ScheduleStore, DEBUG_OFFSET_KEY, SCHEDULE_STATE_KEY};
pub use wake_lock::{WakeGuard, WakeLock, WakeLockError};
