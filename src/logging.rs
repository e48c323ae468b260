use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Log to a daily-rolling file under `log_dir`; stdout belongs to the display.
///
/// `RUST_LOG` overrides the default `meeqat=info` filter. Keep the returned
/// guard alive for the life of the process so buffered lines get flushed.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(log_dir, "meeqat.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("meeqat=info")))
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
