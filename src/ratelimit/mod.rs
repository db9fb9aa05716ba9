//! Rate limiting facade, request keys, limits and per-key state.

mod clock;
mod key;
mod limiter;
mod result;
mod rules;
mod state;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use key::RequestKey;
pub use limiter::{
    FixedWindowRateLimiter, RateLimiter, SlidingWindowCounterRateLimiter,
    SlidingWindowLogRateLimiter, TokenBucketRateLimiter,
};
pub use result::RateLimitResult;
pub use rules::RateLimitConfig;
pub use state::{
    FixedWindowState, LimiterState, SlidingWindowCounterState, SlidingWindowLogState,
    Timestamp, TokenBucketState,
};
