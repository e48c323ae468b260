//! Persisted schedule shared between the data layer and the scheduler.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::store::KvStore;

pub const SCHEDULE_STATE_KEY: &str = "schedule_state";
pub const DEBUG_OFFSET_KEY: &str = "debug_offset_ms";
pub const SCHEDULE_STATE_VERSION: u32 = 1;

/// One prayer at an absolute instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerSlot {
  pub name: String,
  pub label: String,
  pub time_ms: i64,
}

/// Today's schedule as the scheduler sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleState {
  pub version: u32,
  /// Ascending by `time_ms`
  pub prayers: Vec<PrayerSlot>,
  pub next_prayer_index: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hijri_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gregorian_date: Option<String>,
  /// Tomorrow's first prayer, shown once everything today has passed
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_day_prayer: Option<PrayerSlot>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub city: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub country_code: Option<String>,
}

impl Default for ScheduleState {
  fn default() -> Self {
    Self {
      version: SCHEDULE_STATE_VERSION,
      prayers: Vec::new(),
      next_prayer_index: 0,
      hijri_date: None,
      gregorian_date: None,
      next_day_prayer: None,
      city: None,
      country_code: None,
    }
  }
}

impl ScheduleState {
  pub fn new(prayers: Vec<PrayerSlot>, next_prayer_index: usize) -> Self {
    Self {
      prayers,
      next_prayer_index,
      ..Self::default()
    }
  }

  /// Check the shape constraints a loaded state must satisfy.
  pub fn validate(&self) -> Result<()> {
    if self.version != SCHEDULE_STATE_VERSION {
      return Err(eyre!("Unsupported schedule version {}", self.version));
    }
    if self.prayers.windows(2).any(|w| w[0].time_ms > w[1].time_ms) {
      return Err(eyre!("Schedule prayers are not in ascending order"));
    }
    if !self.prayers.is_empty() && self.next_prayer_index >= self.prayers.len() {
      return Err(eyre!(
        "Next prayer index {} out of range for {} prayers",
        self.next_prayer_index,
        self.prayers.len()
      ));
    }
    Ok(())
  }

  pub fn is_empty(&self) -> bool {
    self.prayers.is_empty()
  }

  pub fn all_passed(&self, now_ms: i64) -> bool {
    self.prayers.iter().all(|p| p.time_ms <= now_ms)
  }

  /// The prayer being counted down to: the one at the (advanced) next
  /// prayer index, or the next-day prayer once all of today's have passed.
  ///
  /// Following the index rather than the clock keeps the target from moving
  /// back when the clock does.
  pub fn next_target(&self, now_ms: i64) -> Option<&PrayerSlot> {
    if self.all_passed(now_ms) {
      return self.next_day_prayer.as_ref();
    }
    self.prayers.get(self.advance_index(now_ms))
  }

  /// Row to highlight, or `None` while the next-day prayer is the target.
  pub fn highlighted_index(&self, now_ms: i64) -> Option<usize> {
    (!self.all_passed(now_ms)).then(|| self.advance_index(now_ms))
  }

  /// Milliseconds until [`next_target`](Self::next_target).
  pub fn time_to_next_ms(&self, now_ms: i64) -> Option<i64> {
    self.next_target(now_ms).map(|p| p.time_ms - now_ms)
  }

  /// Recompute the next prayer index for `now_ms`.
  ///
  /// The stored index is kept while its prayer is still in the future;
  /// otherwise the first future prayer wins, and once everything has passed
  /// the index rests on the last prayer. Because prayers are ascending, the
  /// index never moves backwards as time advances.
  pub fn advance_index(&self, now_ms: i64) -> usize {
    if self.prayers.is_empty() {
      return 0;
    }

    if let Some(stored) = self.prayers.get(self.next_prayer_index) {
      if stored.time_ms > now_ms {
        return self.next_prayer_index;
      }
    }

    self
      .prayers
      .iter()
      .position(|p| p.time_ms > now_ms)
      .unwrap_or(self.prayers.len() - 1)
  }
}

/// Load and save the schedule and the scheduler's debug offset.
#[derive(Clone)]
pub struct ScheduleStore {
  store: Arc<dyn KvStore>,
}

impl ScheduleStore {
  pub fn new(store: Arc<dyn KvStore>) -> Self {
    Self { store }
  }

  /// Load the persisted schedule.
  ///
  /// Missing or malformed state loads as an empty schedule with index 0.
  pub async fn load(&self) -> Result<ScheduleState> {
    let raw = match self.store.get(SCHEDULE_STATE_KEY).await? {
      Some(raw) => raw,
      None => return Ok(ScheduleState::default()),
    };

    let state: ScheduleState = match serde_json::from_str(&raw) {
      Ok(state) => state,
      Err(e) => {
        warn!(error = %e, "Discarding malformed schedule state");
        return Ok(ScheduleState::default());
      }
    };

    if let Err(e) = state.validate() {
      warn!(error = %e, "Discarding invalid schedule state");
      return Ok(ScheduleState::default());
    }

    Ok(state)
  }

  pub async fn save(&self, state: &ScheduleState) -> Result<()> {
    let raw =
      serde_json::to_string(state).map_err(|e| eyre!("Failed to serialize schedule: {}", e))?;
    self.store.set(SCHEDULE_STATE_KEY, &raw).await
  }

  pub async fn load_debug_offset(&self) -> Result<i64> {
    let raw = self.store.get(DEBUG_OFFSET_KEY).await?;
    Ok(raw.and_then(|r| r.trim().parse().ok()).unwrap_or(0))
  }

  pub async fn save_debug_offset(&self, offset_ms: i64) -> Result<()> {
    self.store.set(DEBUG_OFFSET_KEY, &offset_ms.to_string()).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  fn slot(name: &str, time_ms: i64) -> PrayerSlot {
    PrayerSlot {
      name: name.to_string(),
      label: name.to_string(),
      time_ms,
    }
  }

  fn state() -> ScheduleState {
    ScheduleState::new(
      vec![slot("Fajr", 100), slot("Dhuhr", 200), slot("Asr", 300)],
      0,
    )
  }

  #[test]
  fn test_advance_index_is_monotonic() {
    let mut state = state();
    let mut last = 0;
    for now in [0, 99, 100, 150, 200, 250, 299, 300, 400, 1_000] {
      let index = state.advance_index(now);
      assert!(index >= last, "index went back at now={}", now);
      state.next_prayer_index = index;
      last = index;
    }
    assert_eq!(last, 2);
  }

  #[test]
  fn test_advance_index_keeps_future_stored_index() {
    let mut state = state();
    state.next_prayer_index = 1;
    assert_eq!(state.advance_index(150), 1);
    assert_eq!(state.advance_index(250), 2);
  }

  #[test]
  fn test_next_target_uses_next_day_prayer() {
    let mut state = state();
    assert_eq!(state.time_to_next_ms(250), Some(50));
    assert_eq!(state.time_to_next_ms(400), None);

    state.next_day_prayer = Some(slot("Fajr", 1_100));
    assert!(state.all_passed(400));
    assert_eq!(state.next_target(400).map(|p| p.time_ms), Some(1_100));
  }

  #[test]
  fn test_target_stays_on_index_when_clock_goes_back() {
    let mut state = state();
    state.next_prayer_index = 2;

    // Dhuhr is the first future prayer at 150, but Asr was already reached
    assert_eq!(state.next_target(150).map(|p| p.name.as_str()), Some("Asr"));
    assert_eq!(state.highlighted_index(150), Some(2));
    assert_eq!(state.time_to_next_ms(150), Some(150));

    state.next_day_prayer = Some(slot("Fajr", 1_100));
    assert_eq!(state.highlighted_index(300), None);
    assert_eq!(state.next_target(300).map(|p| p.time_ms), Some(1_100));
  }

  #[test]
  fn test_validate_rejects_bad_shapes() {
    let mut unsorted = state();
    unsorted.prayers.swap(0, 2);
    assert!(unsorted.validate().is_err());

    let mut out_of_range = state();
    out_of_range.next_prayer_index = 3;
    assert!(out_of_range.validate().is_err());

    assert!(ScheduleState::default().validate().is_ok());
  }

  #[tokio::test]
  async fn test_store_round_trip() {
    let store = ScheduleStore::new(Arc::new(MemoryStore::new()));
    let mut saved = state();
    saved.hijri_date = Some("03 Jumādá al-ūlá 1448".to_string());

    store.save(&saved).await.unwrap();
    assert_eq!(store.load().await.unwrap(), saved);
  }

  #[tokio::test]
  async fn test_malformed_state_loads_empty() {
    let kv = Arc::new(MemoryStore::new());
    let store = ScheduleStore::new(kv.clone());

    kv.set(SCHEDULE_STATE_KEY, "[1, 2").await.unwrap();
    let loaded = store.load().await.unwrap();
    assert!(loaded.is_empty());
    assert_eq!(loaded.next_prayer_index, 0);

    let mut bad = state();
    bad.next_prayer_index = 9;
    kv.set(SCHEDULE_STATE_KEY, &serde_json::to_string(&bad).unwrap())
      .await
      .unwrap();
    let loaded = store.load().await.unwrap();
    assert!(loaded.is_empty());
    assert_eq!(loaded.next_prayer_index, 0);
  }

  #[tokio::test]
  async fn test_debug_offset_defaults_to_zero() {
    let store = ScheduleStore::new(Arc::new(MemoryStore::new()));
    assert_eq!(store.load_debug_offset().await.unwrap(), 0);

    store.save_debug_offset(-90_000).await.unwrap();
    assert_eq!(store.load_debug_offset().await.unwrap(), -90_000);
  }
}
