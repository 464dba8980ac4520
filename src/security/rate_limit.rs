//! Fixed-window request quotas per client.
//!
//! # Backends
//! - Shared: epoch-aligned windows (`now - now % window`), one counter key per
//!   identifier and window. The increment and the `window + 30 s` expiry are
//!   one atomic store call, so a counter never lingers without a TTL and a
//!   failed call has counted nothing that the local fallback would count again.
//! - Local: windows start at the first request seen from an identifier and
//!   restart once `window` seconds have elapsed.
//!
//! The two do not reset at the same instants. An identifier whose history moves
//! between backends during an outage can see its quota restart earlier or later
//! than it would have on either backend alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::client_id::ClientIdentifier;
use crate::security::rejection::{RateLimitDetails, Rejection};
use crate::store::{AtomicStore, StoreResult, StoreSet};

/// Extra lifetime given to shared counters past the end of their window.
const SHARED_EXPIRY_BUFFER_SECS: u64 = 30;

/// Quota left after an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub limit: u64,
    pub used: u64,
    pub remaining: u64,
}

#[derive(Debug, Clone, Copy)]
struct LocalWindow {
    count: u64,
    window_start: u64,
}

pub struct RateLimiter {
    stores: StoreSet,
    prefix: String,
    max_requests: u64,
    window_secs: u64,
    windows: Mutex<HashMap<String, LocalWindow>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(
        config: &RateLimitConfig,
        stores: StoreSet,
        prefix: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            stores,
            prefix: prefix.into(),
            max_requests: config.max_requests,
            window_secs: config.window_secs.max(1),
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn limit(&self) -> u64 {
        self.max_requests
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Count one request against `id`, or reject it if the window is full.
    pub async fn consume(&self, id: &ClientIdentifier) -> Result<Allowance, Rejection> {
        if let Some(shared) = &self.stores.shared {
            match self.consume_shared(shared.as_ref(), id).await {
                Ok(verdict) => return verdict,
                Err(e) => {
                    tracing::debug!(error = %e, client = %id, "Rate limit store unavailable, using local window");
                    metrics::record_store_fallback("rate_limit");
                }
            }
        }

        self.consume_local(id)
    }

    async fn consume_shared(
        &self,
        shared: &dyn AtomicStore,
        id: &ClientIdentifier,
    ) -> StoreResult<Result<Allowance, Rejection>> {
        let now = self.clock.now();
        let epoch = now - now % self.window_secs;
        let key = format!("{}:{}:{}", self.prefix, id, epoch);

        let expiry = Duration::from_secs(self.window_secs + SHARED_EXPIRY_BUFFER_SECS);
        let count = shared.increment_with_expiry(&key, expiry).await?.max(0) as u64;

        if count > self.max_requests {
            let retry_after = match shared.ttl(&key).await {
                Ok(Some(ttl)) if ttl > 0 => ttl as u64,
                _ => self.window_secs,
            };
            return Ok(Err(self.exceeded(id, retry_after.clamp(1, self.window_secs))));
        }

        Ok(Ok(self.allowance(count)))
    }

    fn consume_local(&self, id: &ClientIdentifier) -> Result<Allowance, Rejection> {
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(id.as_str().to_string()).or_insert(LocalWindow {
            count: 0,
            window_start: now,
        });

        let mut elapsed = now.saturating_sub(window.window_start);
        if elapsed >= self.window_secs {
            window.count = 0;
            window.window_start = now;
            elapsed = 0;
        }

        if window.count >= self.max_requests {
            let retry_after = self.window_secs.saturating_sub(elapsed).max(1);
            return Err(self.exceeded(id, retry_after));
        }

        window.count += 1;
        Ok(self.allowance(window.count))
    }

    fn allowance(&self, used: u64) -> Allowance {
        Allowance {
            limit: self.max_requests,
            used,
            remaining: self.max_requests.saturating_sub(used),
        }
    }

    fn exceeded(&self, id: &ClientIdentifier, retry_after: u64) -> Rejection {
        Rejection::RateLimitExceeded(RateLimitDetails {
            limit: self.max_requests,
            used: self.max_requests,
            remaining: 0,
            retry_after_seconds: retry_after,
            window_seconds: self.window_secs,
            identifier: id.to_string(),
        })
    }

    /// Forget local windows that have run out. Returns how many were removed.
    pub fn sweep_local(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, w| now.saturating_sub(w.window_start) < self.window_secs);
        before - windows.len()
    }

    /// Identifiers with a live window, from the shared store when it answers.
    pub async fn active_identifiers(&self) -> usize {
        if let Some(shared) = &self.stores.shared {
            match shared.count_prefix(&format!("{}:", self.prefix)).await {
                Ok(count) => return count,
                Err(e) => tracing::debug!(error = %e, "Could not count shared rate windows"),
            }
        }
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("prefix", &self.prefix)
            .field("max_requests", &self.max_requests)
            .field("window_secs", &self.window_secs)
            .field("stores", &self.stores)
            .finish()
    }
}
