//! Store doubles for unit tests.
//!
//! `tests/common/mod.rs` carries a second, smaller `FlakyStore` for the
//! integration tests. Those compile against the public API only and cannot see
//! this `#[cfg(test)]` module. Keep the two in step when the trait changes.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::store::{AtomicStore, LocalStore, StoreError, StoreResult};

/// Operations a [`FlakyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SetIfAbsent,
    Increment,
    Ttl,
    CountPrefix,
}

/// A store with real local semantics that can be switched off to simulate an
/// outage, or made to fail single operations.
#[derive(Debug)]
pub struct FlakyStore {
    inner: LocalStore,
    available: AtomicBool,
    failing: Mutex<HashSet<Op>>,
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new(LocalStore::default())
    }
}

impl FlakyStore {
    pub fn new(inner: LocalStore) -> Self {
        Self {
            inner,
            available: AtomicBool::new(true),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fail(&self, op: Op) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op);
    }

    /// Direct view of the backing entries, bypassing failure injection.
    pub fn inner(&self) -> &LocalStore {
        &self.inner
    }

    fn check(&self, op: Op) -> StoreResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection refused".to_string()));
        }
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&op)
        {
            return Err(StoreError::Timeout(Duration::from_millis(250)));
        }
        Ok(())
    }
}

#[async_trait]
impl AtomicStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check(Op::SetIfAbsent)?;
        Ok(self.inner.set_if_absent_now(key, ttl))
    }

    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        self.check(Op::Increment)?;
        Ok(self.inner.increment_with_expiry_now(key, ttl))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<i64>> {
        self.check(Op::Ttl)?;
        Ok(self.inner.ttl_now(key))
    }

    async fn count_prefix(&self, prefix: &str) -> StoreResult<usize> {
        self.check(Op::CountPrefix)?;
        Ok(self.inner.count_prefix_now(prefix))
    }
}
