//! The extension's own log levels and the process-wide active level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Ordered from most to least important. A message is emitted when its level
/// is at or below the active level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Important = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    Debug = 5,
    Dev = 6,
}

pub const LOG_LEVEL_CONFIG_KEY: &str = "log_level";

static ACTIVE_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Error as u8);

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Important,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Dev,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Important => "IMPORTANT",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Dev => "DEV",
        }
    }

    /// The tracing level messages at this level are emitted with.
    #[must_use]
    pub fn tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Important | LogLevel::Info => tracing::Level::INFO,
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Dev => tracing::Level::TRACE,
        }
    }

    fn from_u8(value: u8) -> Self {
        LogLevel::ALL
            .into_iter()
            .find(|level| *level as u8 == value)
            .unwrap_or(LogLevel::Error)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log level: {s}"))
    }
}

#[inline]
pub fn active_level() -> LogLevel {
    LogLevel::from_u8(ACTIVE_LEVEL.load(Ordering::Relaxed))
}

pub fn set_active_level(level: LogLevel) {
    ACTIVE_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Applies a `log_level` config value. Unknown values are ignored.
pub fn apply_config_level(value: &serde_json::Value) -> Option<LogLevel> {
    let level = value.as_str()?.parse().ok()?;
    set_active_level(level);
    tracing::debug!(%level, "Log level changed");
    Some(level)
}

#[inline]
pub fn is_enabled(level: LogLevel) -> bool {
    level <= active_level()
}

#[inline]
pub fn is_debug_mode() -> bool {
    is_enabled(LogLevel::Debug)
}

#[inline]
pub fn is_dev_mode() -> bool {
    is_enabled(LogLevel::Dev)
}

/// Emits `message` through tracing when `level` passes the active level.
pub fn log(level: LogLevel, message: &str) {
    if !is_enabled(level) {
        return;
    }
    match level.tracing_level() {
        tracing::Level::ERROR => tracing::error!("{message}"),
        tracing::Level::WARN => tracing::warn!("{message}"),
        tracing::Level::INFO => tracing::info!("{message}"),
        tracing::Level::DEBUG => tracing::debug!("{message}"),
        _ => tracing::trace!("{message}"),
    }
}
