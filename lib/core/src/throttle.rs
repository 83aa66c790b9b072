//! Rate limiting for repeated log messages.

use crate::log_level::LogLevel;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Lets a given `(level, message)` through at most once per window.
#[derive(Debug)]
pub struct LogThrottle {
    window: Duration,
    last_shown: Mutex<AHashMap<String, Instant>>,
}

impl LogThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_shown: Mutex::new(AHashMap::new()),
        }
    }

    /// Returns true when the message should be emitted now, and records it.
    pub fn should_log(&self, level: LogLevel, message: &str) -> bool {
        self.should_log_at(level, message, Instant::now())
    }

    pub fn should_log_at(&self, level: LogLevel, message: &str, now: Instant) -> bool {
        let key = format!("{level}:{message}");
        let mut last_shown = self.last_shown.lock();
        match last_shown.get(&key) {
            Some(shown) if now.saturating_duration_since(*shown) < self.window => false,
            _ => {
                let window = self.window;
                last_shown.retain(|_, shown| now.saturating_duration_since(*shown) < window);
                last_shown.insert(key, now);
                true
            }
        }
    }
}
