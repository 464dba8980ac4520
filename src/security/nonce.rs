//! One-time nonce registration for signed requests.

use std::time::Duration;

use crate::observability::metrics;
use crate::store::StoreSet;

/// Registers nonces as used, shared store first, local store on failure.
#[derive(Debug, Clone)]
pub struct NonceRegistry {
    stores: StoreSet,
    prefix: String,
    ttl: Duration,
}

impl NonceRegistry {
    pub fn new(stores: StoreSet, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            stores,
            prefix: prefix.into(),
            ttl,
        }
    }

    fn key(&self, key_id: &str, nonce: &str) -> String {
        format!("{}:{}:{}", self.prefix, key_id, nonce)
    }

    /// Returns `true` if this is the first live use of `(key_id, nonce)`.
    pub async fn register(&self, key_id: &str, nonce: &str) -> bool {
        let key = self.key(key_id, nonce);

        if let Some(shared) = &self.stores.shared {
            match shared.set_if_absent(&key, self.ttl).await {
                Ok(false) => return false,
                // Mirrored locally so that a later call served by the fallback
                // still sees it, and so a nonce first accepted by the fallback
                // is not accepted again once the shared store is back.
                Ok(true) => return self.stores.local.set_if_absent_now(&key, self.ttl),
                Err(e) => {
                    tracing::debug!(error = %e, "Nonce store unavailable, using local fallback");
                    metrics::record_store_fallback("nonce");
                }
            }
        }

        self.stores.local.set_if_absent_now(&key, self.ttl)
    }
}
