//! Outcome of running protected work behind a rate limiter.

use std::time::Duration;

use super::state::Timestamp;
use crate::error::TollgateError;

/// Result of [`RateLimiter::execute`](super::RateLimiter::execute).
#[derive(Debug)]
pub enum RateLimitResult<T> {
    /// The request was admitted and the work completed.
    Allowed {
        /// Value returned by the work
        value: T,
        /// Permits left for the key right after this admission
        remaining: u64,
        /// When the key's quota is expected to be restored (approximate for token buckets)
        reset_at: Timestamp,
    },
    /// The request was rejected; the work did not run.
    Denied {
        /// Minimum wait before a retry could succeed
        retry_after: Duration,
        /// The configured limit
        limit: u64,
    },
    /// The decision or the work failed.
    Error(TollgateError),
}

impl<T> RateLimitResult<T> {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, RateLimitResult::Denied { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RateLimitResult::Error(_))
    }

    /// Run `f` with the work's value when allowed.
    pub fn on_allowed(self, f: impl FnOnce(&T)) -> Self {
        if let RateLimitResult::Allowed { value, .. } = &self {
            f(value);
        }
        self
    }

    /// Run `f` with the retry hint when denied.
    pub fn on_denied(self, f: impl FnOnce(Duration)) -> Self {
        if let RateLimitResult::Denied { retry_after, .. } = &self {
            f(*retry_after);
        }
        self
    }

    /// Run `f` with the cause when the decision or the work failed.
    pub fn on_error(self, f: impl FnOnce(&TollgateError)) -> Self {
        if let RateLimitResult::Error(cause) = &self {
            f(cause);
        }
        self
    }

    /// The work's value, if the request was allowed.
    pub fn into_value(self) -> Option<T> {
        match self {
            RateLimitResult::Allowed { value, .. } => Some(value),
            _ => None,
        }
    }
}
