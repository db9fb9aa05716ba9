//! In-process state store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

use super::{KeySection, StateStore};
use crate::error::Result;
use crate::ratelimit::{LimiterState, RequestKey};

type Section = Arc<Mutex<()>>;

/// State store backed by process memory.
///
/// Sections are created lazily, one per distinct key, and live until the
/// key is deleted.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Limiter state indexed by request key
    states: DashMap<RequestKey, LimiterState>,
    /// Exclusive section per key
    sections: DashMap<RequestKey, Section>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with stored state.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of registered key sections.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Lock the key's registered section.
    ///
    /// A waiter may wake up holding a section that `delete` has retired in
    /// the meantime; it then retries against the current registry entry so
    /// that a key never has two live sections.
    async fn acquire(&self, key: &RequestKey) -> (Section, OwnedMutexGuard<()>) {
        loop {
            let section = Arc::clone(
                self.sections
                    .entry(key.clone())
                    .or_insert_with(|| {
                        trace!(key = %key, "Registering key section");
                        Arc::new(Mutex::new(()))
                    })
                    .value(),
            );
            let guard = Arc::clone(&section).lock_owned().await;

            let registered = self
                .sections
                .get(key)
                .map(|current| Arc::ptr_eq(current.value(), &section))
                .unwrap_or(false);
            if registered {
                return (section, guard);
            }

            debug!(key = %key, "Key section retired while waiting, retrying");
        }
    }
}

/// A held in-memory section.
struct MemorySection<'a> {
    store: &'a InMemoryStore,
    key: RequestKey,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl<'a> KeySection for MemorySection<'a> {
    async fn get(&self) -> Result<Option<LimiterState>> {
        Ok(self.store.states.get(&self.key).map(|state| state.clone()))
    }

    async fn save(&mut self, state: LimiterState) -> Result<()> {
        self.store.states.insert(self.key.clone(), state);
        Ok(())
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn lock<'a>(&'a self, key: &RequestKey) -> Result<Box<dyn KeySection + 'a>> {
        let (_, guard) = self.acquire(key).await;
        Ok(Box::new(MemorySection {
            store: self,
            key: key.clone(),
            _guard: guard,
        }))
    }

    async fn delete(&self, key: &RequestKey) -> Result<()> {
        let (section, _guard) = self.acquire(key).await;

        self.states.remove(key);
        self.sections
            .remove_if(key, |_, current| Arc::ptr_eq(current, &section));

        debug!(key = %key, "Deleted key state");
        Ok(())
    }
}
