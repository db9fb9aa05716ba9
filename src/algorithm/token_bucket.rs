//! Token bucket: continuous refill at `limit / window`, capacity `limit`.
//!
//! The only algorithm that tolerates short bursts (up to `limit`) without
//! boundary artifacts while bounding the long-run rate to the refill rate.

use std::time::Duration;

use tracing::warn;

use super::{mismatch, offset, until, Algorithm, AlgorithmKind, Allowance, Transition};
use crate::error::Result;
use crate::ratelimit::{LimiterState, RateLimitConfig, RequestKey, Timestamp, TokenBucketState};

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBucket;

impl TokenBucket {
    fn bucket<'a>(key: &RequestKey, state: &'a LimiterState) -> Result<&'a TokenBucketState> {
        match state {
            LimiterState::TokenBucket(bucket) => Ok(bucket),
            other => Err(mismatch(key, AlgorithmKind::TokenBucket, other)),
        }
    }
}

/// Tokens after refilling `tokens` for `elapsed`, capped at the limit.
pub(crate) fn refill(tokens: f64, elapsed: Duration, config: &RateLimitConfig) -> f64 {
    (tokens + elapsed.as_secs_f64() * config.refill_rate()).min(config.limit() as f64)
}

impl Algorithm for TokenBucket {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::TokenBucket
    }

    fn decide(
        &self,
        key: &RequestKey,
        prior: Option<&LimiterState>,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Transition> {
        let Some(prior) = prior else {
            return Ok(Transition::allow(TokenBucketState {
                tokens: config.limit() as f64 - 1.0,
                last_refill_time: now,
            }));
        };
        let bucket = Self::bucket(key, prior)?;

        if now < bucket.last_refill_time {
            warn!(
                key = %key,
                now = %now,
                last_refill_time = %bucket.last_refill_time,
                "Clock went backwards, skipping refill"
            );
        }
        let elapsed = until(now, bucket.last_refill_time);
        let tokens = refill(bucket.tokens, elapsed, config);
        let last_refill_time = now.max(bucket.last_refill_time);

        if tokens >= 1.0 {
            Ok(Transition::allow(TokenBucketState {
                tokens: tokens - 1.0,
                last_refill_time,
            }))
        } else {
            // Refill accounting advances even when denied.
            Ok(Transition::deny(Some(
                TokenBucketState {
                    tokens,
                    last_refill_time,
                }
                .into(),
            )))
        }
    }

    /// `reset_at` is `last_refill_time + window`: roughly when the bucket is
    /// full again, not an exact refill instant.
    fn allowance(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        _now: Timestamp,
    ) -> Result<Allowance> {
        let bucket = Self::bucket(key, state)?;
        Ok(Allowance {
            remaining: bucket.tokens.max(0.0).floor() as u64,
            reset_at: offset(bucket.last_refill_time, config.window_delta())?,
        })
    }

    fn retry_after(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Duration> {
        let bucket = Self::bucket(key, state)?;
        let missing = (1.0 - bucket.tokens).max(0.0);
        let wait = Duration::try_from_secs_f64(missing / config.refill_rate())
            .unwrap_or(Duration::MAX);
        let elapsed = until(now, bucket.last_refill_time);
        Ok(wait.saturating_sub(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::test_support::*;

    fn tokens(state: &Option<LimiterState>) -> f64 {
        match state {
            Some(LimiterState::TokenBucket(bucket)) => bucket.tokens,
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_first_request_initializes_bucket() {
        let config = RateLimitConfig::per_second(5).unwrap();
        let mut state = None;

        assert!(step(&TokenBucket, &mut state, &config, aligned_epoch()));
        assert_eq!(tokens(&state), 4.0);
    }

    #[test]
    fn test_two_per_second_scenario() {
        let config = RateLimitConfig::per_second(2).unwrap();
        let mut state = None;

        assert!(step(&TokenBucket, &mut state, &config, at_millis(0)));
        assert!(step(&TokenBucket, &mut state, &config, at_millis(0)));
        assert!(!step(&TokenBucket, &mut state, &config, at_millis(0)));

        assert!(step(&TokenBucket, &mut state, &config, at_millis(1100)));
    }

    #[test]
    fn test_one_refill_interval_admits_exactly_one() {
        let config = RateLimitConfig::per_second(2).unwrap();
        let mut state = None;

        assert!(step(&TokenBucket, &mut state, &config, at_millis(0)));
        assert!(step(&TokenBucket, &mut state, &config, at_millis(0)));
        assert!(!step(&TokenBucket, &mut state, &config, at_millis(0)));

        // 1 / refill_rate = 500ms
        assert!(step(&TokenBucket, &mut state, &config, at_millis(500)));
        assert!(!step(&TokenBucket, &mut state, &config, at_millis(500)));
    }

    #[test]
    fn test_denial_still_advances_refill_time() {
        let config = RateLimitConfig::per_second(1).unwrap();
        let mut state = None;

        assert!(step(&TokenBucket, &mut state, &config, at_millis(0)));
        assert!(!step(&TokenBucket, &mut state, &config, at_millis(300)));

        match &state {
            Some(LimiterState::TokenBucket(bucket)) => {
                assert_eq!(bucket.last_refill_time, at_millis(300));
                assert!((bucket.tokens - 0.3).abs() < 1e-9);
            }
            other => panic!("unexpected state {:?}", other),
        }

        // 0.3 + 0.701 crosses one token
        assert!(step(&TokenBucket, &mut state, &config, at_millis(1001)));
    }

    #[test]
    fn test_tokens_never_exceed_limit() {
        let config = RateLimitConfig::per_second(3).unwrap();
        let mut state = None;

        step(&TokenBucket, &mut state, &config, at_millis(0));
        for offset in [10_000, 60_000, 3_600_000] {
            step(&TokenBucket, &mut state, &config, at_millis(offset));
            assert!(tokens(&state) <= config.limit() as f64);
            assert_eq!(tokens(&state), 2.0);
        }
    }

    #[test]
    fn test_clock_regression_does_not_refill() {
        let config = RateLimitConfig::per_second(1).unwrap();
        let mut state = None;

        assert!(step(&TokenBucket, &mut state, &config, at_millis(1000)));
        assert!(!step(&TokenBucket, &mut state, &config, at_millis(400)));

        match &state {
            Some(LimiterState::TokenBucket(bucket)) => {
                assert_eq!(bucket.tokens, 0.0);
                assert_eq!(bucket.last_refill_time, at_millis(1000));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_retry_after_is_time_until_one_token() {
        let config = RateLimitConfig::per_second(2).unwrap();
        let state: LimiterState = TokenBucketState {
            tokens: 0.0,
            last_refill_time: at_millis(0),
        }
        .into();

        let retry = TokenBucket
            .retry_after(&key("k"), &state, &config, at_millis(0))
            .unwrap();
        assert_eq!(retry, Duration::from_millis(500));

        let retry = TokenBucket
            .retry_after(&key("k"), &state, &config, at_millis(200))
            .unwrap();
        assert_eq!(retry, Duration::from_millis(300));

        let retry = TokenBucket
            .retry_after(&key("k"), &state, &config, at_millis(900))
            .unwrap();
        assert_eq!(retry, Duration::ZERO);
    }

    #[test]
    fn test_allowance_reports_floor_of_tokens() {
        let config = RateLimitConfig::per_second(10).unwrap();
        let state: LimiterState = TokenBucketState {
            tokens: 6.75,
            last_refill_time: at_millis(100),
        }
        .into();

        let allowance = TokenBucket
            .allowance(&key("k"), &state, &config, at_millis(100))
            .unwrap();
        assert_eq!(allowance.remaining, 6);
        assert_eq!(allowance.reset_at, at_millis(1100));
    }

    #[test]
    fn test_many_small_refills_match_one_large_refill() {
        // 10_000 tokens per second; capacity far above what one second adds.
        let config = RateLimitConfig::new(10_000_000, Duration::from_secs(1000)).unwrap();
        let step_size = Duration::from_micros(1);

        let mut incremental = 0.0;
        for _ in 0..1_000_000 {
            incremental = refill(incremental, step_size, &config);
        }
        let single = refill(0.0, Duration::from_secs(1), &config);

        assert!((single - 10_000.0).abs() < 1e-9);
        assert!(
            (incremental - single).abs() < 1e-3,
            "incremental={} single={}",
            incremental,
            single
        );
    }
}
