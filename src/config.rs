use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::provider::{CalculationOptions, Location};
use crate::schedule::DEFAULT_ALERT_LEAD_MINUTES;
use crate::sync::SyncPolicy;
use crate::timings::TimeFormat;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// City and country to compute prayer times for
  pub location: Option<Location>,
  #[serde(default)]
  pub calculation: CalculationOptions,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub display: DisplayConfig,
  #[serde(default)]
  pub notifications: NotificationConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Hours after which a cached day is refreshed in the background
  pub stale_hours: u32,
  /// Days in the past to keep cached
  pub retention_days: u32,
  pub prefetch_days: u32,
  pub prefetch_batch: usize,
  /// How often the daemon re-syncs today's times
  pub refresh_interval_secs: u64,
  /// Never touch the network
  pub offline: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      stale_hours: 24,
      retention_days: 7,
      prefetch_days: 30,
      prefetch_batch: 5,
      refresh_interval_secs: 900,
      offline: false,
    }
  }
}

impl SyncConfig {
  pub fn policy(&self) -> SyncPolicy {
    SyncPolicy {
      stale_after: chrono::Duration::hours(i64::from(self.stale_hours)),
      retention_days: self.retention_days,
      prefetch_days: self.prefetch_days,
      prefetch_batch: self.prefetch_batch.max(1),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
  /// Print a status line on every update
  pub stdout: bool,
  /// Also write each frame as JSON to this path
  pub status_file: Option<PathBuf>,
  pub time_format: TimeFormat,
}

impl Default for DisplayConfig {
  fn default() -> Self {
    Self {
      stdout: true,
      status_file: None,
      time_format: TimeFormat::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub enabled: bool,
  /// Program and leading arguments; the alert title and body are appended
  pub command: Vec<String>,
  /// Minutes before the Athan, and after it for the Iqama reminder
  pub lead_minutes: u32,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      command: Vec::new(),
      lead_minutes: DEFAULT_ALERT_LEAD_MINUTES,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Database path (defaults to the data directory)
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./meeqat.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/meeqat/config.yaml
  ///
  /// Without any file the defaults apply; a location can still come from
  /// the command line.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if offline_override() {
      config.sync.offline = true;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("meeqat.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("meeqat").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// The configured location, or an error telling the user how to set one.
  pub fn require_location(&self) -> Result<&Location> {
    self.location.as_ref().ok_or_else(|| {
      eyre!(
        "No location configured. Pass --city and --country or add a location section \
         to ~/.config/meeqat/config.yaml"
      )
    })
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(path) => Ok(path.clone()),
      None => Ok(data_dir()?.join("meeqat.db")),
    }
  }
}

/// `MEEQAT_OFFLINE=1` (or `true`) forces offline mode.
pub fn offline_override() -> bool {
  std::env::var("MEEQAT_OFFLINE")
    .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    .unwrap_or(false)
}

/// Per-user data directory, e.g. `~/.local/share/meeqat`.
pub fn data_dir() -> Result<PathBuf> {
  let base = dirs::data_dir().ok_or_else(|| eyre!("Could not determine data directory"))?;
  Ok(base.join("meeqat"))
}
