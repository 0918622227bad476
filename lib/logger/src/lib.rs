//! Ambient `tracing-subscriber` initialization for binaries that embed
//! `cluster_core`. Trimmed from the teacher's `lib/logger`: this crate has
//! no collector to export spans to, so the OpenTelemetry exporter layer is
//! dropped and only the stdout/stderr formatting layer remains.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
  Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Log verbosity, mirroring `tracing::Level` but `Copy` + `serde`-friendly
/// for use in config structs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
  Error,
  Warn,
  #[default]
  Info,
  Debug,
  Trace,
}

impl From<LogLevel> for tracing::Level {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Error => tracing::Level::ERROR,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Trace => tracing::Level::TRACE,
    }
  }
}

/// Output format for the stdout/stderr layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
  pub level: LogLevel,
  pub stdio: StdioLogMode,
  /// Use `tracing_subscriber::fmt::layer().pretty()` instead of the
  /// compact one-line-per-event formatter.
  pub pretty: bool,
  /// Include the module path on each event.
  pub location: bool,
  pub ansi: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    LogConfig {
      level: LogLevel::default(),
      stdio: StdioLogMode::default(),
      pretty: false,
      location: false,
      ansi: true,
    }
  }
}

/// Initializes the global `tracing` subscriber. Safe to call once per
/// process; a second call returns an error via [`anyhow::Context`] rather
/// than panicking.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let log_level: tracing::Level = config.level.into();
  let registry = Registry::default().with(LevelFilter::from(log_level));

  match (config.stdio, config.pretty) {
    (StdioLogMode::Standard, true) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .pretty()
          .with_file(false)
          .with_line_number(false)
          .with_target(config.location)
          .with_ansi(config.ansi),
      )
      .try_init(),
    (StdioLogMode::Standard, false) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_file(false)
          .with_line_number(false)
          .with_target(config.location)
          .with_ansi(config.ansi),
      )
      .try_init(),
    (StdioLogMode::Json, _) => {
      registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    }
    (StdioLogMode::None, _) => Ok(()),
  }
  .context("failed to init logger")
}
