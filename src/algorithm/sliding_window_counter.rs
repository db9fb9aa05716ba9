//! Sliding window counter: the log's precision approximated with two
//! adjacent fixed-window counters.
//!
//! The previous window's count is weighted by how much of it still overlaps
//! the trailing window. Two behaviors are kept exactly as established:
//! the elapsed ratio is not clamped to `[0, 1]`, and the request that rolls
//! the state into a new window is denied even though it is counted there.

use std::time::Duration;

use super::{mismatch, offset, until, window_start, Algorithm, AlgorithmKind, Allowance, Transition};
use crate::error::Result;
use crate::ratelimit::{
    LimiterState, RateLimitConfig, RequestKey, SlidingWindowCounterState, Timestamp,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingWindowCounter;

impl SlidingWindowCounter {
    fn counter<'a>(
        key: &RequestKey,
        state: &'a LimiterState,
    ) -> Result<&'a SlidingWindowCounterState> {
        match state {
            LimiterState::SlidingWindowCounter(counter) => Ok(counter),
            other => Err(mismatch(key, AlgorithmKind::SlidingWindowCounter, other)),
        }
    }
}

/// `previous × (1 − elapsed_ratio) + current`, where `elapsed_ratio` is the
/// fraction of the current window that has passed at `now`.
pub fn weighted_count(
    state: &SlidingWindowCounterState,
    config: &RateLimitConfig,
    now: Timestamp,
) -> f64 {
    let elapsed_nanos = (now - state.current_window_start)
        .num_nanoseconds()
        .unwrap_or(i64::MAX);
    let elapsed_ratio = elapsed_nanos as f64 / config.window_nanos() as f64;
    let previous_weight = 1.0 - elapsed_ratio;

    state.previous_window_count as f64 * previous_weight + state.current_window_count as f64
}

impl Algorithm for SlidingWindowCounter {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::SlidingWindowCounter
    }

    fn decide(
        &self,
        key: &RequestKey,
        prior: Option<&LimiterState>,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Transition> {
        let current_window_start = window_start(now, config)?;

        let Some(prior) = prior else {
            return Ok(Transition::allow(SlidingWindowCounterState {
                current_window_start,
                current_window_count: 1,
                previous_window_count: 0,
            }));
        };
        let counter = Self::counter(key, prior)?;

        if counter.current_window_start == current_window_start {
            if weighted_count(counter, config, now) < config.limit() as f64 {
                Ok(Transition::allow(SlidingWindowCounterState {
                    current_window_count: counter.current_window_count + 1,
                    ..counter.clone()
                }))
            } else {
                Ok(Transition::deny(None))
            }
        } else {
            // The rolling request is recorded in the new window but denied.
            Ok(Transition::deny(Some(
                SlidingWindowCounterState {
                    current_window_start,
                    current_window_count: 1,
                    previous_window_count: counter.current_window_count,
                }
                .into(),
            )))
        }
    }

    fn allowance(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Allowance> {
        let counter = Self::counter(key, state)?;
        let weighted = weighted_count(counter, config, now).ceil().max(0.0) as u64;
        Ok(Allowance {
            remaining: config.limit().saturating_sub(weighted),
            reset_at: offset(counter.current_window_start, config.window_delta())?,
        })
    }

    fn retry_after(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Duration> {
        let counter = Self::counter(key, state)?;
        let window_end = offset(counter.current_window_start, config.window_delta())?;
        Ok(until(window_end, now))
    }
}
