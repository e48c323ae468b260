//! Stale-while-revalidate orchestration over the day cache.

use chrono::{Days, NaiveDate, Timelike};
use chrono_tz::Tz;
use futures::future::{join_all, BoxFuture, Shared};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::SyncError;
use super::schedule_builder;
use super::single_flight::SingleFlight;
use crate::cache::{date_key, CacheSource, CachedDay, DayCache, FetchOutcome, OptionsKey};
use crate::clock::OffsetClock;
use crate::provider::{
  CalculationOptions, DayRequest, Location, NetworkStatus, PrayerTimeProvider,
};
use crate::schedule::ScheduleState;
use crate::timings::{
  entries_from_timings, previous_prayer_info, resolve, seconds_until_next, PreviousPrayer,
  Resolution,
};

/// Freshness, retention and prefetch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
  /// Age after which a cached day is refreshed in the background
  pub stale_after: chrono::Duration,
  /// Days in the past kept by cleanup
  pub retention_days: u32,
  /// Days after the requested date to prefetch
  pub prefetch_days: u32,
  /// Concurrent fetches per prefetch batch
  pub prefetch_batch: usize,
}

impl Default for SyncPolicy {
  fn default() -> Self {
    Self {
      stale_after: chrono::Duration::hours(24),
      retention_days: 7,
      prefetch_days: 30,
      prefetch_batch: 5,
    }
  }
}

/// What the controller is doing for the displayed day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
  Idle,
  ServingCached,
  RefreshingSilently,
  FetchingBlocking,
  Error(SyncError),
}

/// The day currently shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayedDay {
  pub date_key: String,
  pub day: CachedDay,
}

/// The displayed day resolved against the controller's clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodayView {
  pub date_key: String,
  pub resolution: Resolution,
  pub previous: Option<PreviousPrayer>,
  pub seconds_to_next: Option<i64>,
}

type FetchResult = Result<CachedDay, String>;

struct Inner {
  cache: DayCache,
  provider: Arc<dyn PrayerTimeProvider>,
  network: Arc<dyn NetworkStatus>,
  clock: OffsetClock,
  zone: Tz,
  policy: SyncPolicy,
  fetches: SingleFlight<FetchResult>,
  prefetches: SingleFlight<()>,
  state_tx: watch::Sender<SyncState>,
  displayed_tx: watch::Sender<Option<DisplayedDay>>,
  background: Mutex<Vec<JoinHandle<()>>>,
}

/// Serves cached days instantly and keeps them fresh in the background.
///
/// Cheap to clone; clones share the same cache, guards and channels.
#[derive(Clone)]
pub struct SyncController {
  inner: Arc<Inner>,
}

impl SyncController {
  pub fn new(
    cache: DayCache,
    provider: Arc<dyn PrayerTimeProvider>,
    network: Arc<dyn NetworkStatus>,
    clock: OffsetClock,
    zone: Tz,
    policy: SyncPolicy,
  ) -> Self {
    let (state_tx, _) = watch::channel(SyncState::Idle);
    let (displayed_tx, _) = watch::channel(None);
    Self {
      inner: Arc::new(Inner {
        cache,
        provider,
        network,
        clock,
        zone,
        policy,
        fetches: SingleFlight::new(),
        prefetches: SingleFlight::new(),
        state_tx,
        displayed_tx,
        background: Mutex::new(Vec::new()),
      }),
    }
  }

  /// Serve prayer times for `date`.
  ///
  /// A cached day is returned immediately, whatever its age. Only a cache
  /// miss waits on the network, and only when the network is reachable.
  pub async fn fetch_for_date(
    &self,
    location: &Location,
    options: &CalculationOptions,
    date: NaiveDate,
  ) -> Result<FetchOutcome, SyncError> {
    let inner = &self.inner;
    let key = OptionsKey::new(location, options);
    let dk = date_key(date);
    let request = DayRequest::new(location, options, date);

    let cached = inner.cache.get(&key, &dk).await.unwrap_or_else(|e| {
      warn!(date = %dk, error = %e, "Failed to read cache, treating as miss");
      None
    });
    let online = inner.network.is_online().await;

    if let Some(day) = cached {
      inner.show(&dk, day.clone());
      let stale = day.is_stale(inner.clock.now_ms(), inner.policy.stale_after);

      let source = match (stale, online) {
        (true, true) => {
          inner.state_tx.send_replace(SyncState::RefreshingSilently);
          inner.spawn_refresh(key, request);
          CacheSource::CacheStale
        }
        (false, true) => {
          inner.state_tx.send_replace(SyncState::ServingCached);
          inner.spawn_prefetch(key, request);
          CacheSource::CacheFresh
        }
        (_, false) => {
          inner.state_tx.send_replace(SyncState::ServingCached);
          CacheSource::Offline
        }
      };

      debug!(date = %dk, ?source, "Served cached day");
      return Ok(FetchOutcome {
        date_key: dk,
        day,
        source,
      });
    }

    if !online {
      let err = SyncError::OfflineNoCache { date };
      inner.fail(err.clone());
      return Err(err);
    }

    inner.state_tx.send_replace(SyncState::FetchingBlocking);
    match inner.fetch_remote(&key, request.clone()).await {
      Ok(day) => {
        if let Err(e) = inner.cache.set(&key, &dk, day.clone()).await {
          warn!(date = %dk, error = %e, "Failed to persist fetched day");
        }
        inner.show(&dk, day.clone());
        inner.state_tx.send_replace(SyncState::ServingCached);
        inner.spawn_prefetch(key.clone(), request);
        inner.spawn_cleanup(key);

        info!(date = %dk, "Fetched prayer times");
        Ok(FetchOutcome {
          date_key: dk,
          day,
          source: CacheSource::Network,
        })
      }
      Err(reason) => {
        let err = SyncError::BlockingFetchFailed { date, reason };
        inner.fail(err.clone());
        Err(err)
      }
    }
  }

  /// Remove days older than the retention window from `location`'s namespace.
  pub async fn cleanup(
    &self,
    location: &Location,
    options: &CalculationOptions,
  ) -> color_eyre::Result<usize> {
    let key = OptionsKey::new(location, options);
    self
      .inner
      .cache
      .cleanup(&key, self.inner.policy.retention_days, self.today())
      .await
  }

  /// Wait until every background refresh, prefetch and cleanup has finished.
  pub async fn settle(&self) {
    loop {
      let handles: Vec<JoinHandle<()>> = {
        let mut background = self
          .inner
          .background
          .lock()
          .unwrap_or_else(|e| e.into_inner());
        background.drain(..).collect()
      };
      if handles.is_empty() {
        return;
      }
      join_all(handles).await;
    }
  }

  /// Today's date on this controller's clock, in the prayer-time zone.
  pub fn today(&self) -> NaiveDate {
    self.inner.clock.today_in(&self.inner.zone)
  }

  /// Zone the provider's wall-clock times are read in.
  pub fn zone(&self) -> Tz {
    self.inner.zone
  }

  pub fn now_ms(&self) -> i64 {
    self.inner.clock.now_ms()
  }

  pub fn set_debug_offset(&self, offset_ms: i64) {
    self.inner.clock.set_offset_ms(offset_ms);
  }

  pub fn debug_offset(&self) -> i64 {
    self.inner.clock.offset_ms()
  }

  pub fn state(&self) -> SyncState {
    self.inner.state_tx.borrow().clone()
  }

  pub fn displayed(&self) -> Option<DisplayedDay> {
    self.inner.displayed_tx.borrow().clone()
  }

  pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
    self.inner.state_tx.subscribe()
  }

  pub fn subscribe_displayed(&self) -> watch::Receiver<Option<DisplayedDay>> {
    self.inner.displayed_tx.subscribe()
  }

  /// Resolve the displayed day at the current (offset) time.
  pub fn today_entries(&self) -> Option<TodayView> {
    let displayed = self.displayed()?;
    let entries = entries_from_timings(&displayed.day.timings);
    let now_seconds = i64::from(self.inner.clock.now_in(&self.inner.zone).num_seconds_from_midnight());

    let resolution = resolve(&entries, now_seconds);
    let seconds_to_next = seconds_until_next(&resolution, now_seconds);
    Some(TodayView {
      date_key: displayed.date_key,
      previous: previous_prayer_info(&entries, now_seconds),
      seconds_to_next,
      resolution,
    })
  }

  /// Build the schedule for `date` from cached data only.
  ///
  /// Returns `None` when `date` itself is not cached.
  pub async fn build_schedule(
    &self,
    location: &Location,
    options: &CalculationOptions,
    date: NaiveDate,
  ) -> color_eyre::Result<Option<ScheduleState>> {
    let key = OptionsKey::new(location, options);
    let days = self.inner.cache.load(&key).await?;

    let today = match days.get(&date_key(date)) {
      Some(day) => day,
      None => return Ok(None),
    };
    let tomorrow = date.succ_opt().and_then(|d| days.get(&date_key(d)));

    Ok(Some(schedule_builder::build_schedule(
      &self.inner.zone,
      date,
      today,
      tomorrow,
      self.inner.clock.now_ms(),
      location,
    )))
  }
}

impl Inner {
  fn show(&self, date_key: &str, day: CachedDay) {
    self.displayed_tx.send_replace(Some(DisplayedDay {
      date_key: date_key.to_string(),
      day,
    }));
  }

  /// Replace the displayed day only if `date_key` is still the one shown.
  fn show_if_current(&self, date_key: &str, day: &CachedDay) {
    self.displayed_tx.send_if_modified(|displayed| match displayed {
      Some(current) if current.date_key == date_key => {
        current.day = day.clone();
        true
      }
      _ => false,
    });
  }

  fn fail(&self, err: SyncError) {
    warn!(error = %err, "Prayer times unavailable");
    self.displayed_tx.send_replace(None);
    self.state_tx.send_replace(SyncState::Error(err));
  }

  fn track(&self, handle: JoinHandle<()>) {
    let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
    background.retain(|h| !h.is_finished());
    background.push(handle);
  }

  /// Network fetch for one date, joined per namespace and date.
  ///
  /// Callers persist the result themselves.
  fn fetch_remote(
    self: &Arc<Self>,
    key: &OptionsKey,
    request: DayRequest,
  ) -> Shared<BoxFuture<'static, FetchResult>> {
    let flight_key = format!("{}|{}", key.canonical(), date_key(request.date));
    let inner = Arc::clone(self);
    self.fetches.join(&flight_key, move || async move {
      inner
        .provider
        .fetch(&request)
        .await
        .map(|day| CachedDay::from_provider(day, inner.clock.now_ms()))
        .map_err(|e| e.to_string())
    })
  }

  fn spawn_refresh(self: &Arc<Self>, key: OptionsKey, request: DayRequest) {
    let dk = date_key(request.date);
    let fetch = self.fetch_remote(&key, request);
    let inner = Arc::clone(self);

    let handle = tokio::spawn(async move {
      match fetch.await {
        Ok(day) => {
          if let Err(e) = inner.cache.set(&key, &dk, day.clone()).await {
            warn!(date = %dk, error = %e, "Failed to persist refreshed day");
            return;
          }
          inner.show_if_current(&dk, &day);
          inner.state_tx.send_replace(SyncState::ServingCached);
          debug!(date = %dk, "Refreshed stale day");
          inner.spawn_cleanup(key);
        }
        Err(reason) => {
          warn!(date = %dk, %reason, "Background refresh failed, keeping cached day");
          inner.state_tx.send_replace(SyncState::ServingCached);
        }
      }
    });
    self.track(handle);
  }

  fn spawn_prefetch(self: &Arc<Self>, key: OptionsKey, base: DayRequest) {
    let inner = Arc::clone(self);
    let prefetch_key = key.canonical();
    let run = self
      .prefetches
      .join(&prefetch_key, move || async move { inner.prefetch(key, base).await });
    let handle = tokio::spawn(run);
    self.track(handle);
  }

  /// Fetch missing or stale days after `base.date`, a batch at a time.
  async fn prefetch(self: Arc<Self>, key: OptionsKey, base: DayRequest) {
    if !self.network.is_online().await {
      debug!("Skipping prefetch while offline");
      return;
    }

    let cached = self.cache.load(&key).await.unwrap_or_else(|e| {
      warn!(error = %e, "Failed to read cache for prefetch");
      Default::default()
    });
    let now = self.clock.now_ms();

    let dates: Vec<NaiveDate> = (1..=u64::from(self.policy.prefetch_days))
      .filter_map(|offset| base.date.checked_add_days(Days::new(offset)))
      .filter(|date| match cached.get(&date_key(*date)) {
        Some(day) => day.is_stale(now, self.policy.stale_after),
        None => true,
      })
      .collect();

    if dates.is_empty() {
      return;
    }
    debug!(count = dates.len(), "Prefetching prayer times");

    for batch in dates.chunks(self.policy.prefetch_batch.max(1)) {
      let results = join_all(
        batch
          .iter()
          .map(|date| self.fetch_remote(&key, base.for_date(*date))),
      )
      .await;

      let entries: Vec<(String, CachedDay)> = batch
        .iter()
        .zip(results)
        .filter_map(|(date, result)| match result {
          Ok(day) => Some((date_key(*date), day)),
          Err(reason) => {
            warn!(date = %date, %reason, "Prefetch failed");
            None
          }
        })
        .collect();

      if let Err(e) = self.cache.set_many(&key, entries).await {
        warn!(error = %e, "Failed to persist prefetched days");
      }
    }
  }

  fn spawn_cleanup(self: &Arc<Self>, key: OptionsKey) {
    let inner = Arc::clone(self);
    let handle = tokio::spawn(async move {
      let today = inner.clock.today_in(&inner.zone);
      match inner
        .cache
        .cleanup(&key, inner.policy.retention_days, today)
        .await
      {
        Ok(0) => {}
        Ok(removed) => debug!(removed, "Removed expired cached days"),
        Err(e) => warn!(error = %e, "Cache cleanup failed"),
      }
    });
    self.track(handle);
  }
}
