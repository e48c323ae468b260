//! Remote prayer-time provider and network reachability.
//!
//! The engine only depends on the [`PrayerTimeProvider`] and
//! [`NetworkStatus`] traits; transport, retries and URL construction belong
//! to the implementations.

mod aladhan;
mod api_types;
mod network;

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use aladhan::AladhanClient;
pub use network::{StaticNetwork, TcpProbe};

/// Where prayer times are computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub city: String,
  pub country: String,
  /// ISO country code, shown by display surfaces when present
  #[serde(default)]
  pub country_code: Option<String>,
}

/// How prayer times are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationOptions {
  /// Provider calculation method id (4 = Umm al-Qura)
  #[serde(default = "default_method_id")]
  pub method_id: u32,
  #[serde(default = "default_shafaq")]
  pub shafaq: String,
  #[serde(default = "default_calendar_method")]
  pub calendar_method: String,
  /// IANA time zone name; defaults to the system zone
  #[serde(default = "system_timezone")]
  pub timezone: String,
}

fn default_method_id() -> u32 {
  4
}

fn default_shafaq() -> String {
  "general".to_string()
}

fn default_calendar_method() -> String {
  "UAQ".to_string()
}

impl Default for CalculationOptions {
  fn default() -> Self {
    Self {
      method_id: default_method_id(),
      shafaq: default_shafaq(),
      calendar_method: default_calendar_method(),
      timezone: system_timezone(),
    }
  }
}

impl CalculationOptions {
  /// The zone the provider's wall-clock times are expressed in.
  pub fn zone(&self) -> Result<Tz> {
    self
      .timezone
      .parse::<Tz>()
      .map_err(|e| eyre!("Unknown time zone '{}': {}", self.timezone, e))
  }
}

/// Best-effort IANA name of the system time zone.
///
/// Checks `$TZ`, then the `/etc/localtime` symlink, then `/etc/timezone`,
/// and falls back to `UTC`.
pub fn system_timezone() -> String {
  if let Ok(tz) = std::env::var("TZ") {
    let tz = tz.trim_start_matches(':').trim();
    if !tz.is_empty() {
      return tz.to_string();
    }
  }

  if let Ok(target) = std::fs::read_link("/etc/localtime") {
    let target = target.to_string_lossy();
    if let Some((_, name)) = target.split_once("zoneinfo/") {
      return name.to_string();
    }
  }

  if let Ok(contents) = std::fs::read_to_string("/etc/timezone") {
    let name = contents.trim();
    if !name.is_empty() {
      return name.to_string();
    }
  }

  "UTC".to_string()
}

/// One day's request to the remote provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRequest {
  pub date: NaiveDate,
  pub city: String,
  pub country: String,
  pub method_id: u32,
  pub shafaq: String,
  pub timezone: String,
  pub calendar_method: String,
}

impl DayRequest {
  pub fn new(location: &Location, options: &CalculationOptions, date: NaiveDate) -> Self {
    Self {
      date,
      city: location.city.clone(),
      country: location.country.clone(),
      method_id: options.method_id,
      shafaq: options.shafaq.clone(),
      timezone: options.timezone.clone(),
      calendar_method: options.calendar_method.clone(),
    }
  }

  /// Same parameters for another date.
  pub fn for_date(&self, date: NaiveDate) -> Self {
    Self {
      date,
      ..self.clone()
    }
  }
}

/// One day of prayer times as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDay {
  /// Prayer name -> local time string (e.g. "Fajr" -> "05:12")
  pub timings: BTreeMap<String, String>,
  pub date_readable: String,
  pub timezone: String,
  pub method_name: Option<String>,
  pub hijri_date: Option<String>,
}

/// Remote source of daily prayer times.
#[async_trait]
pub trait PrayerTimeProvider: Send + Sync {
  async fn fetch(&self, request: &DayRequest) -> Result<ProviderDay>;
}

/// Whether the remote provider is currently reachable.
#[async_trait]
pub trait NetworkStatus: Send + Sync {
  async fn is_online(&self) -> bool;
}
