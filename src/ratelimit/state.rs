//! Per-key algorithm state.
//!
//! Each algorithm owns one variant of [`LimiterState`]. The store keeps the
//! state keyed by [`RequestKey`](super::RequestKey); algorithms never hold it
//! between calls.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::algorithm::AlgorithmKind;

/// Timestamps are UTC instants.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// State of a continuously refilling token bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBucketState {
    /// Tokens currently in the bucket, never above the limit after a save
    pub tokens: f64,
    /// When the bucket was last refilled
    pub last_refill_time: Timestamp,
}

/// State of an epoch-aligned fixed window counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedWindowState {
    /// Start of the window the counter belongs to
    pub window_start: Timestamp,
    /// Admissions within that window
    pub counter: u64,
}

/// State of a sliding window log: admission timestamps still inside the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindowLogState {
    pub logs: VecDeque<Timestamp>,
}

/// State of a sliding window counter: two adjacent fixed windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindowCounterState {
    pub current_window_start: Timestamp,
    pub current_window_count: u64,
    pub previous_window_count: u64,
}

/// Algorithm-specific state stored per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterState {
    TokenBucket(TokenBucketState),
    FixedWindow(FixedWindowState),
    SlidingWindowLog(SlidingWindowLogState),
    SlidingWindowCounter(SlidingWindowCounterState),
}

impl LimiterState {
    /// The algorithm that produced this state.
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            LimiterState::TokenBucket(_) => AlgorithmKind::TokenBucket,
            LimiterState::FixedWindow(_) => AlgorithmKind::FixedWindow,
            LimiterState::SlidingWindowLog(_) => AlgorithmKind::SlidingWindowLog,
            LimiterState::SlidingWindowCounter(_) => AlgorithmKind::SlidingWindowCounter,
        }
    }
}

impl From<TokenBucketState> for LimiterState {
    fn from(state: TokenBucketState) -> Self {
        LimiterState::TokenBucket(state)
    }
}

impl From<FixedWindowState> for LimiterState {
    fn from(state: FixedWindowState) -> Self {
        LimiterState::FixedWindow(state)
    }
}

impl From<SlidingWindowLogState> for LimiterState {
    fn from(state: SlidingWindowLogState) -> Self {
        LimiterState::SlidingWindowLog(state)
    }
}

impl From<SlidingWindowCounterState> for LimiterState {
    fn from(state: SlidingWindowCounterState) -> Self {
        LimiterState::SlidingWindowCounter(state)
    }
}
