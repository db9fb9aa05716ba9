//! Sliding window log: exact admission timestamps over the trailing window.
//!
//! Entries at or before `now - window` are pruned on every call, so a key
//! never holds more than `limit` timestamps and no trailing window ever
//! admits more than `limit` requests.

use std::collections::VecDeque;
use std::time::Duration;

use super::{mismatch, offset, until, Algorithm, AlgorithmKind, Allowance, Transition};
use crate::error::Result;
use crate::ratelimit::{LimiterState, RateLimitConfig, RequestKey, SlidingWindowLogState, Timestamp};

#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingWindowLog;

impl SlidingWindowLog {
    fn log<'a>(key: &RequestKey, state: &'a LimiterState) -> Result<&'a SlidingWindowLogState> {
        match state {
            LimiterState::SlidingWindowLog(log) => Ok(log),
            other => Err(mismatch(key, AlgorithmKind::SlidingWindowLog, other)),
        }
    }
}

impl Algorithm for SlidingWindowLog {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::SlidingWindowLog
    }

    fn decide(
        &self,
        key: &RequestKey,
        prior: Option<&LimiterState>,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Transition> {
        let cutoff = offset(now, -config.window_delta())?;
        let mut logs: VecDeque<Timestamp> = match prior {
            Some(state) => Self::log(key, state)?
                .logs
                .iter()
                .copied()
                .filter(|ts| *ts > cutoff)
                .collect(),
            None => VecDeque::new(),
        };

        if (logs.len() as u64) < config.limit() {
            logs.push_back(now);
            Ok(Transition::allow(SlidingWindowLogState { logs }))
        } else {
            // Still persist the pruned log.
            Ok(Transition::deny(Some(SlidingWindowLogState { logs }.into())))
        }
    }

    fn allowance(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Allowance> {
        let log = Self::log(key, state)?;
        let oldest = log.logs.iter().min().copied().unwrap_or(now);
        Ok(Allowance {
            remaining: config.limit().saturating_sub(log.logs.len() as u64),
            reset_at: offset(oldest, config.window_delta())?,
        })
    }

    fn retry_after(
        &self,
        key: &RequestKey,
        state: &LimiterState,
        config: &RateLimitConfig,
        now: Timestamp,
    ) -> Result<Duration> {
        let log = Self::log(key, state)?;
        match log.logs.iter().min() {
            Some(oldest) => Ok(until(offset(*oldest, config.window_delta())?, now)),
            None => Ok(Duration::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::test_support::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn log_len(state: &Option<LimiterState>) -> usize {
        match state {
            Some(LimiterState::SlidingWindowLog(log)) => log.logs.len(),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_three_per_second_scenario() {
        let config = RateLimitConfig::per_second(3).unwrap();
        let mut state = None;

        for _ in 0..3 {
            assert!(step(&SlidingWindowLog, &mut state, &config, at_millis(0)));
        }
        assert!(!step(&SlidingWindowLog, &mut state, &config, at_millis(400)));
        assert!(step(&SlidingWindowLog, &mut state, &config, at_millis(1100)));
        assert_eq!(log_len(&state), 1);
    }

    #[test]
    fn test_no_boundary_burst() {
        let config = RateLimitConfig::per_second(2).unwrap();
        let mut state = None;

        assert!(step(&SlidingWindowLog, &mut state, &config, at_millis(999)));
        assert!(step(&SlidingWindowLog, &mut state, &config, at_millis(999)));
        // A fixed window would reset here.
        assert!(!step(&SlidingWindowLog, &mut state, &config, at_millis(1000)));
        assert!(!step(&SlidingWindowLog, &mut state, &config, at_millis(1998)));
        assert!(step(&SlidingWindowLog, &mut state, &config, at_millis(1999)));
    }

    #[test]
    fn test_denial_prunes_expired_entries() {
        let config = RateLimitConfig::per_second(2).unwrap();
        let state: LimiterState = SlidingWindowLogState {
            logs: VecDeque::from(vec![at_millis(0), at_millis(600)]),
        }
        .into();

        let transition = SlidingWindowLog
            .decide(&key("k"), Some(&state), &config, at_millis(1200))
            .unwrap();
        assert!(transition.allowed);

        let transition = SlidingWindowLog
            .decide(&key("k"), Some(&state), &config, at_millis(500))
            .unwrap();
        assert!(!transition.allowed);
        assert_eq!(transition.next, Some(state.clone()));
    }

    #[test]
    fn test_retry_after_waits_for_oldest_entry() {
        let config = RateLimitConfig::per_second(2).unwrap();
        let state: LimiterState = SlidingWindowLogState {
            logs: VecDeque::from(vec![at_millis(100), at_millis(300)]),
        }
        .into();

        let retry = SlidingWindowLog
            .retry_after(&key("k"), &state, &config, at_millis(400))
            .unwrap();
        assert_eq!(retry, Duration::from_millis(700));

        let allowance = SlidingWindowLog
            .allowance(&key("k"), &state, &config, at_millis(400))
            .unwrap();
        assert_eq!(allowance.remaining, 0);
        assert_eq!(allowance.reset_at, at_millis(1100));
    }

    #[test]
    fn test_no_trailing_window_exceeds_limit() {
        let limit = 5;
        let window_ms = 1000;
        let config = RateLimitConfig::new(limit, Duration::from_millis(window_ms)).unwrap();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut state = None;
        let mut now_ms = 0i64;
        let mut admitted = Vec::new();

        for _ in 0..5_000 {
            now_ms += rng.gen_range(0..120);
            if step(&SlidingWindowLog, &mut state, &config, at_millis(now_ms)) {
                admitted.push(now_ms);
            }
            assert!(log_len(&state) <= limit as usize);
        }

        assert!(!admitted.is_empty());
        for (i, start) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|t| **t < start + window_ms as i64)
                .count();
            assert!(
                in_window <= limit as usize,
                "{} admissions in window starting at {}ms",
                in_window,
                start
            );
        }
    }
}
