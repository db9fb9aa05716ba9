//! Rate decision algorithms.
//!
//! Every algorithm is a pure function of the prior state, the configured
//! rule and the current instant. It returns a [`Transition`] describing the
//! decision and the state to commit; persisting that state is the caller's
//! job (see [`RateLimiter`](crate::ratelimit::RateLimiter)).
//!
//! | Algorithm | Memory per key | Boundary bursts |
//! |-----------|----------------|-----------------|
//! | [`TokenBucket`] | O(1) | up to `limit`, smoothly refilled |
//! | [`FixedWindow`] | O(1) | up to `2 × limit` across a boundary |
//! | [`SlidingWindowLog`] | O(limit) | none |
//! | [`SlidingWindowCounter`] | O(1) | approximated |

mod fixed_window;
mod sliding_window_counter;
mod sliding_window_log;
mod token_bucket;

pub use fixed_window::FixedWindow;
pub use sliding_window_counter::{weighted_count, SlidingWindowCounter};
pub use sliding_window_log::SlidingWindowLog;
pub use token_bucket::TokenBucket;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TollgateError};
use crate::ratelimit::{LimiterState, RateLimitConfig, RequestKey, Timestamp};

/// Identifies one of the four algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    #[default]
    TokenBucket,
    FixedWindow,
    SlidingWindowLog,
    SlidingWindowCounter,
}

impl AlgorithmKind {
    /// Instantiate the algorithm.
    pub fn build(self) -> Box<dyn Algorithm> {
        match self {
            AlgorithmKind::TokenBucket => Box::new(TokenBucket),
            AlgorithmKind::FixedWindow => Box::new(FixedWindow),
            AlgorithmKind::SlidingWindowLog => Box::new(SlidingWindowLog),
            AlgorithmKind::SlidingWindowCounter => Box::new(SlidingWindowCounter),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::TokenBucket => "token_bucket",
            AlgorithmKind::FixedWindow => "fixed_window",
            AlgorithmKind::SlidingWindowLog => "sliding_window_log",
            AlgorithmKind::SlidingWindowCounter => "sliding_window_counter",
        }
    }
}

impl std::fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Whether the request is admitted
    pub allowed: bool,
    /// State to commit; `None` leaves the stored state untouched
    pub next: Option<LimiterState>,
}

impl Transition {
    pub fn allow(next: impl Into<LimiterState>) -> Self {
        Self {
            allowed: true,
            next: Some(next.into()),
        }
    }

    pub fn deny(next: Option<LimiterState>) -> Self {
        Self {
            allowed: false,
            next,
        }
    }
}

/// Metadata reported alongside an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub remaining: u64,
    pub reset_at: Timestamp,
}

/// A rate decision algorithm.
///
/// Implementations hold no per-key data; everything they need arrives
/// through the arguments.
pub trait Algorithm: Send + Sync {
    /// Which algorithm this is; also the state variant it reads and writes.
    fn kind(&self) -> AlgorithmKind;

    /// Decide whether a request at `now` is admitted, given the key's prior state.
    ///
    /// `prior` is `None` for a key the store has never seen.
    fn decide(
        &self,
        key: &RequestKey,
        prior: Option<&LimiterState>,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Transition>;

    /// Remaining permits and reset instant derived from a committed state.
    fn allowance(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Allowance>;

    /// How long a denied caller should wait, derived from a committed state.
    fn retry_after(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Duration>;
}

impl<A: Algorithm + ?Sized> Algorithm for Box<A> {
    fn kind(&self) -> AlgorithmKind {
        (**self).kind()
    }

    fn decide(
        &self,
        key: &RequestKey,
        prior: Option<&LimiterState>,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Transition> {
        (**self).decide(key, prior, config, now)
    }

    fn allowance(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Allowance> {
        (**self).allowance(key, state, config, now)
    }

    fn retry_after(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Duration> {
        (**self).retry_after(key, state, config, now)
    }
}

/// Start of the epoch-aligned window containing `now`.
pub(crate) fn window_start(now: Timestamp, config: &RateLimitConfig) -> Result<Timestamp> {
    let nanos = now.timestamp_nanos_opt().ok_or_else(|| {
        TollgateError::TimeOutOfRange(format!("{} has no nanosecond timestamp", now))
    })?;
    let start = nanos - nanos.rem_euclid(config.window_nanos());
    Ok(Utc.timestamp_nanos(start))
}

/// `at + by`, failing instead of overflowing.
pub(crate) fn offset(at: Timestamp, by: chrono::Duration) -> Result<Timestamp> {
    at.checked_add_signed(by)
        .ok_or_else(|| TollgateError::TimeOutOfRange(format!("{} + {}", at, by)))
}

/// Time from `now` until `target`, floored at zero.
pub(crate) fn until(target: Timestamp, now: Timestamp) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

pub(crate) fn mismatch(key: &RequestKey, expected: AlgorithmKind, found: &LimiterState) -> TollgateError {
    TollgateError::StateMismatch {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A window-aligned instant: 2023-11-14T22:13:20Z.
    pub fn aligned_epoch() -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    pub fn at_millis(ms: i64) -> Timestamp {
        aligned_epoch() + chrono::Duration::milliseconds(ms)
    }

    pub fn key(value: &str) -> RequestKey {
        RequestKey::new(value).unwrap()
    }

    /// Run `decide` and apply the transition to `state`, returning the decision.
    pub fn step(
        algorithm: &dyn Algorithm,
        state: &mut Option<LimiterState>,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> bool {
        let transition = algorithm
            .decide(&key("test"), state.as_ref(), config, now)
            .unwrap();
        if let Some(next) = transition.next {
            *state = Some(next);
        }
        transition.allowed
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_window_start_is_epoch_aligned() {
        let config = RateLimitConfig::new(1, Duration::from_secs(60)).unwrap();
        let now = Utc.timestamp_opt(1_700_000_042, 567_000_000).unwrap();

        let start = window_start(now, &config).unwrap();
        assert_eq!(start, Utc.timestamp_opt(1_700_000_040, 0).unwrap());
        assert_eq!(start.timestamp() % 60, 0);
    }

    #[test]
    fn test_window_start_on_boundary() {
        let config = RateLimitConfig::per_second(1).unwrap();
        assert_eq!(window_start(aligned_epoch(), &config).unwrap(), aligned_epoch());
        assert_eq!(window_start(at_millis(999), &config).unwrap(), aligned_epoch());
        assert_eq!(window_start(at_millis(1000), &config).unwrap(), at_millis(1000));
    }

    #[test]
    fn test_until_floors_at_zero() {
        assert_eq!(until(at_millis(100), at_millis(40)), Duration::from_millis(60));
        assert_eq!(until(at_millis(100), at_millis(140)), Duration::ZERO);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            AlgorithmKind::TokenBucket,
            AlgorithmKind::FixedWindow,
            AlgorithmKind::SlidingWindowLog,
            AlgorithmKind::SlidingWindowCounter,
        ] {
            assert_eq!(kind.build().kind(), kind);
            let yaml = serde_yaml::to_string(&kind).unwrap();
            assert_eq!(yaml.trim(), kind.as_str());
        }
    }

    #[test]
    fn test_limit_consecutive_calls_then_deny_for_every_algorithm() {
        for limit in [1u64, 2, 5, 17] {
            let config = RateLimitConfig::per_second(limit).unwrap();
            for kind in [
                AlgorithmKind::TokenBucket,
                AlgorithmKind::FixedWindow,
                AlgorithmKind::SlidingWindowLog,
                AlgorithmKind::SlidingWindowCounter,
            ] {
                let algorithm = kind.build();
                let mut state = None;
                let now = at_millis(250);

                for i in 0..limit {
                    assert!(
                        step(algorithm.as_ref(), &mut state, &config, now),
                        "{} request {} of {} should be allowed",
                        kind,
                        i + 1,
                        limit
                    );
                }
                assert!(
                    !step(algorithm.as_ref(), &mut state, &config, now),
                    "{} request {} should be denied",
                    kind,
                    limit + 1
                );
            }
        }
    }

    #[test]
    fn test_foreign_state_is_rejected() {
        let config = RateLimitConfig::per_second(3).unwrap();
        let mut state = None;
        step(&TokenBucket, &mut state, &config, aligned_epoch());

        let result = FixedWindow.decide(&key("test"), state.as_ref(), &config, aligned_epoch());
        assert!(matches!(
            result,
            Err(TollgateError::StateMismatch {
                expected: AlgorithmKind::FixedWindow,
                found: AlgorithmKind::TokenBucket,
                ..
            })
        ));
    }
}
