mod api;
mod cache;
mod commands;
mod config;
mod controller;
mod event;
mod push;
mod store;
mod sync;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "freshsync")]
#[command(about = "Offline-first sync client for the Fresh Meat storefront")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/freshsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Storefront URL, overriding the config file
  #[arg(short, long)]
  server: Option<String>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override server if specified on command line
  let config = if let Some(url) = args.server {
    config::Config {
      server: config::ServerConfig { url },
      ..config
    }
  } else {
    config
  };

  // Keep the log writer alive for the lifetime of the process
  let _log_guard = init_tracing(&config)?;

  commands::run(args.command, &config).await
}

/// Log to a daily-rolling file in the data directory; the terminal stays
/// reserved for command output.
fn init_tracing(config: &config::Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = config.data_path()?.join("logs");
  let appender = tracing_appender::rolling::daily(log_dir, "freshsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("freshsync=info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
