//! State storage for rate limit decisions.
//!
//! A store maps [`RequestKey`]s to [`LimiterState`]s and hands out one
//! exclusive section per key. A decision holds the section for its whole
//! read-compute-write cycle, so two callers can never commit transitions
//! derived from the same prior state. Sections for different keys are
//! independent.
//!
//! Any backend honoring that per-key exclusivity can replace
//! [`InMemoryStore`], including networked ones.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::ratelimit::{LimiterState, RequestKey};

/// Exclusive access to one key's state. Dropping it releases the section.
#[async_trait]
pub trait KeySection: Send {
    /// Read the key's state; `None` if nothing was saved yet.
    async fn get(&self) -> Result<Option<LimiterState>>;

    /// Replace the key's state.
    async fn save(&mut self, state: LimiterState) -> Result<()>;
}

/// Backend for per-key limiter state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Acquire the key's exclusive section, waiting for any current holder.
    async fn lock<'a>(&'a self, key: &RequestKey) -> Result<Box<dyn KeySection + 'a>>;

    /// Read the key's state under its section.
    async fn get(&self, key: &RequestKey) -> Result<Option<LimiterState>> {
        let section = self.lock(key).await?;
        section.get().await
    }

    /// Replace the key's state under its section.
    async fn save(&self, key: &RequestKey, state: LimiterState) -> Result<()> {
        let mut section = self.lock(key).await?;
        section.save(state).await
    }

    /// Remove the key's state together with its section bookkeeping.
    async fn delete(&self, key: &RequestKey) -> Result<()>;
}
