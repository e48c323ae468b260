use chrono::NaiveDate;
use chrono_tz::Tz;
use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::{CacheSource, DayCache};
use crate::clock::{ms_until_next_day, Clock, OffsetClock, SystemClock};
use crate::commands::{CacheAction, Command, OffsetAction};
use crate::config::Config;
use crate::event::ClockWatcher;
use crate::provider::{AladhanClient, NetworkStatus, StaticNetwork, TcpProbe};
use crate::schedule::{
  build_frame, BackgroundUpdateScheduler, CommandNotifier, DisplaySurface, NotificationSurface,
  RenderFrame, ScheduleStore, SchedulerHandle, StatusFileDisplay, StdoutDisplay, StdoutNotifier,
  TokioAlarms,
};
use crate::store::{KvStore, SqliteStore};
use crate::sync::{SyncController, TodayView};
use crate::timings::{elapsed_text, entries_from_timings, format_hms, format_minutes};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Wires storage, provider, sync and scheduling together for one run.
pub struct App {
  config: Config,
  store: Arc<dyn KvStore>,
  clock: Arc<dyn Clock>,
  zone: Tz,
  controller: SyncController,
  states: ScheduleStore,
}

impl App {
  pub async fn new(config: Config) -> Result<Self> {
    let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open(Some(config.database_path()?.as_path()))?);
    let states = ScheduleStore::new(Arc::clone(&store));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let zone = config.calculation.zone()?;

    let client = AladhanClient::new()?;
    let network: Arc<dyn NetworkStatus> = if config.sync.offline {
      Arc::new(StaticNetwork::new(false))
    } else {
      Arc::new(TcpProbe::for_url(client.base_url(), PROBE_TIMEOUT))
    };

    let offset_ms = states.load_debug_offset().await?;
    let controller = SyncController::new(
      DayCache::new(Arc::clone(&store)),
      Arc::new(client),
      network,
      OffsetClock::new(Arc::clone(&clock), offset_ms),
      zone,
      config.sync.policy(),
    );

    Ok(Self {
      config,
      store,
      clock,
      zone,
      controller,
      states,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Today { date } => self.today(date).await,
      Command::Daemon => self.run_daemon().await,
      Command::Status => self.status().await,
      Command::DebugOffset { action } => self.debug_offset(action).await,
      Command::Cache { action } => self.cache(action).await,
    }
  }

  async fn today(&self, date: Option<NaiveDate>) -> Result<()> {
    let location = self.config.require_location()?;
    let options = &self.config.calculation;
    let today = self.controller.today();
    let date = date.unwrap_or(today);

    let outcome = self.controller.fetch_for_date(location, options, date).await?;
    let day = &outcome.day;

    println!("{}, {} | {}", location.city, location.country, day.date_readable);
    if let Some(hijri) = &day.hijri_date {
      println!("{}", hijri);
    }
    if let Some(method) = &day.method_name {
      println!("{}", method);
    }
    println!();

    if date == today {
      if let Some(view) = self.controller.today_entries() {
        self.print_today(&view);
      }
      if let Some(state) = self.controller.build_schedule(location, options, date).await? {
        self.states.save(&state).await?;
      }
    } else {
      for entry in entries_from_timings(&day.timings) {
        println!(
          "  {:<8} {}",
          entry.label,
          format_minutes(entry.minutes_of_day, self.config.display.time_format)
        );
      }
    }

    match outcome.source {
      CacheSource::Network => {}
      CacheSource::CacheFresh => println!("\n(cached)"),
      CacheSource::CacheStale => println!("\n(cached, refreshing)"),
      CacheSource::Offline => println!("\n(offline, cached)"),
    }

    // Let refresh and prefetch finish before the process exits
    self.controller.settle().await;
    Ok(())
  }

  fn print_today(&self, view: &TodayView) {
    let format = self.config.display.time_format;
    for entry in &view.resolution.entries {
      let marker = if entry.is_next {
        ">"
      } else if entry.is_past {
        "-"
      } else {
        " "
      };
      println!(
        "{} {:<8} {}",
        marker,
        entry.label,
        format_minutes(entry.minutes_of_day, format)
      );
    }

    if let (Some(next), Some(seconds)) = (view.resolution.next(), view.seconds_to_next) {
      println!("\nNext: {} in {}", next.label, format_hms(seconds));
    }
    if let Some(previous) = &view.previous {
      println!(
        "Previous: {} {}",
        previous.label,
        elapsed_text(previous.elapsed_seconds * 1_000)
      );
    }
  }

  async fn status(&self) -> Result<()> {
    let state = self.states.load().await?;
    let now = self.controller.now_ms();
    let frame: RenderFrame = build_frame(&state, now, &self.zone, self.config.display.time_format);

    println!("{}", frame.status_line());
    for (i, row) in frame.day_list.iter().enumerate() {
      let marker = if frame.highlighted_index == Some(i) { ">" } else { " " };
      println!("{} {:<8} {}", marker, row.label, row.time);
    }

    let offset = self.controller.debug_offset();
    if offset != 0 {
      println!("\nDebug offset: {} ms", offset);
    }
    Ok(())
  }

  async fn debug_offset(&self, action: OffsetAction) -> Result<()> {
    match action {
      OffsetAction::Get => println!("{}", self.states.load_debug_offset().await?),
      OffsetAction::Set { offset } => {
        self.states.save_debug_offset(offset).await?;
        info!(offset_ms = offset, "Debug offset set");
        println!("Debug offset set to {} ms", offset);
      }
      OffsetAction::Clear => {
        self.states.save_debug_offset(0).await?;
        println!("Debug offset cleared");
      }
    }
    Ok(())
  }

  async fn cache(&self, action: CacheAction) -> Result<()> {
    match action {
      CacheAction::Cleanup => {
        let location = self.config.require_location()?;
        let removed = self
          .controller
          .cleanup(location, &self.config.calculation)
          .await?;
        println!("Removed {} cached day(s)", removed);
      }
      CacheAction::Clear => {
        self.store.clear().await?;
        println!("Cache cleared");
      }
    }
    Ok(())
  }

  fn displays(&self) -> Vec<Arc<dyn DisplaySurface>> {
    let mut displays: Vec<Arc<dyn DisplaySurface>> = Vec::new();
    if self.config.display.stdout {
      displays.push(Arc::new(StdoutDisplay));
    }
    if let Some(path) = &self.config.display.status_file {
      displays.push(Arc::new(StatusFileDisplay::new(path)));
    }
    displays
  }

  fn notifiers(&self) -> Vec<Arc<dyn NotificationSurface>> {
    let config = &self.config.notifications;
    let mut notifiers: Vec<Arc<dyn NotificationSurface>> = Vec::new();
    if !config.enabled {
      return notifiers;
    }
    if self.config.display.stdout {
      notifiers.push(Arc::new(StdoutNotifier));
    }
    if let Some(command) = CommandNotifier::from_command_line(&config.command) {
      notifiers.push(Arc::new(command));
    }
    notifiers
  }

  /// Run the scheduler, clock watcher and periodic sync until Ctrl-C.
  ///
  /// Clock events are forwarded to the scheduler; the ones that can move
  /// today's date also trigger a sync, as does midnight in the configured
  /// zone.
  async fn run_daemon(&self) -> Result<()> {
    let location = self.config.require_location()?;

    let (wake_tx, wake_rx) = mpsc::unbounded_channel();
    let alarms = Arc::new(TokioAlarms::new(wake_tx.clone()));
    let mut scheduler = BackgroundUpdateScheduler::new(self.states.clone(), Arc::clone(&self.clock), alarms)
      .with_time_format(self.config.display.time_format)
      .with_zone(self.zone)
      .with_alert_lead(self.config.notifications.lead_minutes);
    let notifiers = self.notifiers();
    for notifier in &notifiers {
      scheduler = scheduler.with_notifier(Arc::clone(notifier));
    }
    let (handle, task) = scheduler.spawn(wake_rx);

    let (clock_tx, mut clock_rx) = mpsc::unbounded_channel();
    let watcher = ClockWatcher::spawn(
      Arc::clone(&self.clock),
      clock_tx,
      ClockWatcher::DEFAULT_INTERVAL,
      ClockWatcher::DEFAULT_TOLERANCE_MS,
    );

    let displays = self.displays();
    if displays.is_empty() && notifiers.is_empty() {
      warn!("No display or notifier configured, scheduler stays dormant");
    }
    for display in displays {
      handle.attach_display(display).await?;
    }

    info!(city = %location.city, "Daemon started");
    let mut ticker = tokio::time::interval(Duration::from_secs(
      self.config.sync.refresh_interval_secs.max(1),
    ));

    loop {
      tokio::select! {
        _ = ticker.tick() => {
          if let Err(e) = self.sync_once(&handle).await {
            warn!(error = %e, "Sync failed");
          }
        }
        Some(reason) = clock_rx.recv() => {
          if wake_tx.send(reason).is_err() {
            warn!("Scheduler stopped, ignoring clock event");
            break;
          }
          if reason.needs_resync() {
            if let Err(e) = self.sync_once(&handle).await {
              warn!(error = %e, ?reason, "Sync after clock change failed");
            }
          }
        }
        _ = tokio::time::sleep(self.until_next_day()) => {
          info!("New day, syncing");
          if let Err(e) = self.sync_once(&handle).await {
            warn!(error = %e, "Sync failed");
          }
        }
        _ = tokio::signal::ctrl_c() => {
          info!("Interrupted, shutting down");
          break;
        }
      }
    }

    handle.shutdown().await?;
    if let Err(e) = task.await {
      warn!(error = %e, "Scheduler task ended abnormally");
    }
    watcher.abort();
    self.controller.settle().await;
    Ok(())
  }

  /// Time until just after the next midnight in the configured zone.
  fn until_next_day(&self) -> Duration {
    let ms = ms_until_next_day(&self.zone, self.controller.now_ms());
    Duration::from_millis(ms.max(0) as u64) + Duration::from_secs(1)
  }

  /// Bring today's schedule up to date and hand it to the scheduler.
  ///
  /// The persisted debug offset is handed to each half separately.
  async fn sync_once(&self, handle: &SchedulerHandle) -> Result<()> {
    let offset_ms = self.states.load_debug_offset().await?;
    if offset_ms != self.controller.debug_offset() {
      self.controller.set_debug_offset(offset_ms);
      handle.set_debug_offset(offset_ms).await?;
    }

    let location = self.config.require_location()?;
    let options = &self.config.calculation;
    let date = self.controller.today();

    if let Err(e) = self.controller.fetch_for_date(location, options, date).await {
      warn!(error = %e, "No prayer times for today");
      return Ok(());
    }

    if let Some(state) = self.controller.build_schedule(location, options, date).await? {
      handle.push_schedule(state).await?;
    }
    Ok(())
  }
}
