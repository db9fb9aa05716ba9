//! Core rate limiter facade.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock};
use super::key::RequestKey;
use super::result::RateLimitResult;
use super::rules::RateLimitConfig;
use super::state::{LimiterState, Timestamp};
use crate::algorithm::{
    Algorithm, FixedWindow, SlidingWindowCounter, SlidingWindowLog, TokenBucket,
};
use crate::error::{Result, TollgateError};
use crate::store::{InMemoryStore, StateStore};

pub type TokenBucketRateLimiter<S = InMemoryStore> = RateLimiter<TokenBucket, S>;
pub type FixedWindowRateLimiter<S = InMemoryStore> = RateLimiter<FixedWindow, S>;
pub type SlidingWindowLogRateLimiter<S = InMemoryStore> = RateLimiter<SlidingWindowLog, S>;
pub type SlidingWindowCounterRateLimiter<S = InMemoryStore> = RateLimiter<SlidingWindowCounter, S>;

/// A decision together with the state it committed.
#[derive(Debug)]
struct Admission {
    allowed: bool,
    state: LimiterState,
    now: Timestamp,
}

/// Admission control in front of arbitrary protected work.
///
/// The limiter pairs one [`Algorithm`] with a [`StateStore`]. It is cheap to
/// share behind an `Arc`; all mutable state lives in the store, so any
/// number of tasks may call it concurrently. Decisions for the same key are
/// serialized by the store's per-key section, decisions for different keys
/// never wait on each other.
pub struct RateLimiter<A, S = InMemoryStore> {
    algorithm: A,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<A, S> std::fmt::Debug for RateLimiter<A, S>
where
    A: Algorithm,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("algorithm", &self.algorithm.kind())
            .field("clock", &self.clock)
            .finish()
    }
}

impl<A: Algorithm + Default> RateLimiter<A, InMemoryStore> {
    /// Create a limiter with a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(A::default(), Arc::new(InMemoryStore::new()))
    }
}

impl<A, S> RateLimiter<A, S>
where
    A: Algorithm,
    S: StateStore,
{
    /// Create a limiter over `store`, reading time from a [`MonotonicClock`].
    pub fn new(algorithm: A, store: Arc<S>) -> Self {
        Self {
            algorithm,
            store,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decide whether one request for `key` is admitted under `config`.
    ///
    /// A permit consumed here is never given back.
    pub async fn try_acquire(&self, key: &RequestKey, config: &RateLimitConfig) -> Result<bool> {
        self.acquire(key, config).await.map(|admission| admission.allowed)
    }

    /// Decide, then run `work` only if admitted.
    ///
    /// Failures of the decision and of the work, including panics, come back
    /// as [`RateLimitResult::Error`]. The permit stays consumed whatever the
    /// work does.
    pub async fn execute<T, E, F, Fut>(
        &self,
        key: &RequestKey,
        config: &RateLimitConfig,
        work: F,
    ) -> RateLimitResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let admission = match self.acquire(key, config).await {
            Ok(admission) => admission,
            Err(e) => return RateLimitResult::Error(e),
        };

        if !admission.allowed {
            return match self
                .algorithm
                .retry_after(key, &admission.state, config, admission.now)
            {
                Ok(retry_after) => RateLimitResult::Denied {
                    retry_after,
                    limit: config.limit(),
                },
                Err(e) => RateLimitResult::Error(e),
            };
        }

        let allowance = match self
            .algorithm
            .allowance(key, &admission.state, config, admission.now)
        {
            Ok(allowance) => allowance,
            Err(e) => return RateLimitResult::Error(e),
        };

        match AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => RateLimitResult::Allowed {
                value,
                remaining: allowance.remaining,
                reset_at: allowance.reset_at,
            },
            Ok(Err(e)) => {
                let cause: Box<dyn std::error::Error + Send + Sync> = e.into();
                debug!(key = %key, error = %cause, "Protected work failed");
                RateLimitResult::Error(TollgateError::Work(cause))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                debug!(key = %key, panic = %message, "Protected work panicked");
                RateLimitResult::Error(TollgateError::WorkPanicked(message))
            }
        }
    }

    /// Forget everything stored for `key`.
    pub async fn reset(&self, key: &RequestKey) -> Result<()> {
        self.store.delete(key).await
    }

    /// Read, decide, commit and re-read under the key's section.
    async fn acquire(&self, key: &RequestKey, config: &RateLimitConfig) -> Result<Admission> {
        let mut section = self.store.lock(key).await?;
        let now = self.clock.now();

        let prior = section.get().await?;
        if prior.is_none() {
            debug!(
                key = %key,
                algorithm = %self.algorithm.kind(),
                "Creating limiter state"
            );
        }
        let transition = self.algorithm.decide(key, prior.as_ref(), config, now)?;
        if let Some(next) = transition.next {
            section.save(next).await?;
        }

        let state = section
            .get()
            .await?
            .ok_or_else(|| TollgateError::StateMissing {
                key: key.to_string(),
            })?;

        trace!(
            key = %key,
            algorithm = %self.algorithm.kind(),
            allowed = transition.allowed,
            "Rate limit decision"
        );
        if !transition.allowed {
            debug!(
                key = %key,
                algorithm = %self.algorithm.kind(),
                limit = config.limit(),
                "Rate limit exceeded"
            );
        }

        Ok(Admission {
            allowed: transition.allowed,
            state,
            now,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
