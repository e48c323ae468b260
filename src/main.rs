mod app;
mod cache;
mod clock;
mod commands;
mod config;
mod event;
mod logging;
mod provider;
mod schedule;
mod store;
mod sync;
mod timings;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use crate::commands::Command;
use crate::provider::Location;

#[derive(Parser, Debug)]
#[command(name = "meeqat")]
#[command(about = "Prayer times that keep working offline")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/meeqat/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// City to use instead of the configured location
  #[arg(long, requires = "country")]
  city: Option<String>,

  /// Country to use instead of the configured location
  #[arg(long, requires = "city")]
  country: Option<String>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Keep the guard alive until exit so buffered log lines are flushed
  let _log_guard = logging::init(&config::data_dir()?.join("logs"))?;

  let mut config = config::Config::load(args.config.as_deref())?;

  // Override location if specified on command line
  if let (Some(city), Some(country)) = (args.city, args.country) {
    config.location = Some(Location {
      city,
      country,
      country_code: None,
    });
  }

  let app = app::App::new(config).await?;
  app.run(args.command.unwrap_or_default()).await?;

  Ok(())
}
