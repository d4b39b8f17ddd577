//! Tracing bootstrap for hosts embedding the sync layer.

use color_eyre::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: env-filtered (`RUST_LOG`, default `info`)
/// console output.
pub fn init() -> Result<()> {
  tracing_subscriber::registry()
    .with(env_filter())
    .with(tracing_subscriber::fmt::layer())
    .try_init()?;
  Ok(())
}

/// Like [`init`], but additionally writes a daily-rolling log file under
/// `log_dir`. The returned guard flushes buffered lines on drop and must be
/// held for the lifetime of the process.
pub fn init_with_file(log_dir: &Path) -> Result<WorkerGuard> {
  let appender = tracing_appender::rolling::daily(log_dir, "swipesync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(env_filter())
    .with(tracing_subscriber::fmt::layer())
    .with(
      tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer),
    )
    .try_init()?;

  Ok(guard)
}
