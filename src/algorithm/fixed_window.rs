//! Fixed window counter with epoch-aligned boundaries.
//!
//! Counters reset independently per window, so up to `2 × limit` requests
//! can pass in a short span straddling a boundary. That burst is inherent
//! to fixed windows and is kept as is.

use std::time::Duration;

use super::{mismatch, offset, until, window_start, Algorithm, AlgorithmKind, Allowance, Transition};
use crate::error::Result;
use crate::ratelimit::{FixedWindowState, LimiterState, RateLimitConfig, RequestKey, Timestamp};

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWindow;

impl FixedWindow {
    fn window<'a>(key: &RequestKey, state: &'a LimiterState) -> Result<&'a FixedWindowState> {
        match state {
            LimiterState::FixedWindow(window) => Ok(window),
            other => Err(mismatch(key, AlgorithmKind::FixedWindow, other)),
        }
    }
}

impl Algorithm for FixedWindow {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::FixedWindow
    }

    fn decide(
        &self,
        key: &RequestKey,
        prior: Option<&LimiterState>,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Transition> {
        let current_window_start = window_start(now, config)?;
        let prior = prior.map(|state| Self::window(key, state)).transpose()?;

        match prior {
            Some(window) if window.window_start == current_window_start => {
                if window.counter < config.limit() {
                    Ok(Transition::allow(FixedWindowState {
                        window_start: current_window_start,
                        counter: window.counter + 1,
                    }))
                } else {
                    Ok(Transition::deny(None))
                }
            }
            // First request, or the first of a new window.
            _ => Ok(Transition::allow(FixedWindowState {
                window_start: current_window_start,
                counter: 1,
            })),
        }
    }

    fn allowance(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        _now: Timestamp,
    ) -> Result<Allowance> {
        let window = Self::window(key, state)?;
        Ok(Allowance {
            remaining: config.limit().saturating_sub(window.counter),
            reset_at: offset(window.window_start, config.window_delta())?,
        })
    }

    fn retry_after(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Duration> {
        let window = Self::window(key, state)?;
        let window_end = offset(window.window_start, config.window_delta())?;
        Ok(until(window_end, now))
    }
}
