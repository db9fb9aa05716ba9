//! Tollgate - Per-Key Rate Limiting
//!
//! This crate decides, per request key, whether a unit of work may proceed
//! under a configured limit. Four interchangeable algorithms are provided
//! (token bucket, fixed window, sliding window log and sliding window
//! counter), all backed by a pluggable per-key [`store::StateStore`] whose
//! exclusive sections keep concurrent decisions for the same key from ever
//! over-admitting.
//!
//! ```no_run
//! use tollgate::{RateLimitConfig, RateLimitResult, RequestKey, TokenBucketRateLimiter};
//!
//! # async fn run() -> tollgate::Result<()> {
//! let limiter = TokenBucketRateLimiter::in_memory();
//! let config = RateLimitConfig::per_second(10)?;
//! let key = RequestKey::new("user:42")?;
//!
//! match limiter
//!     .execute(&key, &config, || async { Ok::<_, std::io::Error>("done") })
//!     .await
//! {
//!     RateLimitResult::Allowed { value, remaining, .. } => println!("{value}, {remaining} left"),
//!     RateLimitResult::Denied { retry_after, .. } => println!("retry in {retry_after:?}"),
//!     RateLimitResult::Error(e) => eprintln!("{e}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod algorithm;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use algorithm::{Algorithm, AlgorithmKind};
pub use error::{Result, TollgateError};
pub use ratelimit::{
    FixedWindowRateLimiter, RateLimitConfig, RateLimitResult, RateLimiter, RequestKey,
    SlidingWindowCounterRateLimiter, SlidingWindowLogRateLimiter, TokenBucketRateLimiter,
};
pub use store::{InMemoryStore, StateStore};
