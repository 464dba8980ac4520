//! Atomic keyed counter/flag store with expiry.
//!
//! # Data Flow
//! ```text
//! Gate (nonce registry, rate limiter)
//!     → StoreSet::shared (shared.rs, Redis, if configured and reachable)
//!         ok  → decision
//!         Err → StoreSet::local (local.rs, same semantics) → decision
//! ```
//!
//! # Design Decisions
//! - One capability: `RedisStore` behind the trait, `LocalStore` as its synchronous twin
//! - A failed shared call is a `StoreError`, never a panic or a silent default
//! - Local state starts empty at process start and is never persisted

pub mod local;
pub mod shared;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use local::LocalStore;
pub use shared::RedisStore;

/// Errors raised by a store backend. Any of these means "backend unavailable".
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend answered with an error.
    #[error("store backend error: {0}")]
    Backend(String),

    /// The backend did not answer within the operation timeout.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic keyed operations shared by the replay and rate-limit gates.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Short backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Set `key` with the given TTL unless it is already live.
    /// Returns `true` if this call created the key.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Increment the integer at `key` (created at 0) and, in the same atomic
    /// step, give it `ttl` if it has no expiry yet. An error means neither
    /// happened, or both did.
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<i64>;

    /// Remaining lifetime in seconds, or `None` if the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Number of live keys starting with `prefix`.
    async fn count_prefix(&self, prefix: &str) -> StoreResult<usize>;
}

/// The process-wide store container: an optional shared backend plus the
/// always-present local fallback.
#[derive(Clone)]
pub struct StoreSet {
    pub shared: Option<Arc<dyn AtomicStore>>,
    pub local: Arc<LocalStore>,
}

impl StoreSet {
    pub fn new(shared: Option<Arc<dyn AtomicStore>>, local: Arc<LocalStore>) -> Self {
        Self { shared, local }
    }

    /// A store set with no shared backend.
    pub fn local_only(local: Arc<LocalStore>) -> Self {
        Self { shared: None, local }
    }

    pub fn has_shared(&self) -> bool {
        self.shared.is_some()
    }
}

impl std::fmt::Debug for StoreSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSet")
            .field("shared", &self.shared.as_ref().map(|s| s.name()))
            .field("local_keys", &self.local.len())
            .finish()
    }
}
