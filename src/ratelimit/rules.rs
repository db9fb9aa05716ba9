//! Rate limit rules: how many permits per window.

use std::time::Duration;

use crate::error::{Result, TollgateError};

/// An immutable `(limit, window)` pair.
///
/// One instance may be shared across any number of keys and calls. The
/// constructor guarantees `limit > 0` and `window > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    limit: u64,
    window: Duration,
    window_nanos: i64,
}

impl RateLimitConfig {
    /// Create a new configuration of `limit` permits per `window`.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(TollgateError::Config(format!(
                "Limit must be positive: {}",
                limit
            )));
        }
        if window.is_zero() {
            return Err(TollgateError::Config(format!(
                "Window must be positive: {:?}",
                window
            )));
        }
        let window_nanos = i64::try_from(window.as_nanos()).map_err(|_| {
            TollgateError::Config(format!("Window is too large: {:?}", window))
        })?;

        Ok(Self {
            limit,
            window,
            window_nanos,
        })
    }

    /// `limit` permits per second.
    pub fn per_second(limit: u64) -> Result<Self> {
        Self::new(limit, Duration::from_secs(1))
    }

    /// `limit` permits per minute.
    pub fn per_minute(limit: u64) -> Result<Self> {
        Self::new(limit, Duration::from_secs(60))
    }

    /// `limit` permits per hour.
    pub fn per_hour(limit: u64) -> Result<Self> {
        Self::new(limit, Duration::from_secs(3600))
    }

    /// Maximum permits per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of the window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Continuous refill rate in permits per second.
    pub fn refill_rate(&self) -> f64 {
        self.limit as f64 / self.window.as_secs_f64()
    }

    pub(crate) fn window_nanos(&self) -> i64 {
        self.window_nanos
    }

    pub(crate) fn window_delta(&self) -> chrono::Duration {
        chrono::Duration::nanoseconds(self.window_nanos)
    }
}
