//! In-process store backed by a sharded concurrent map.
//!
//! Every operation goes through the `DashMap` entry API, which holds the shard
//! lock for the whole check-then-set, so concurrent callers racing on the same
//! key observe a single winner.
//!
//! The methods mirror [`AtomicStore`](crate::store::AtomicStore) but are
//! synchronous and infallible. Callers use them directly as the fallback path.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone, Copy)]
struct LocalEntry {
    value: i64,
    /// Epoch second at which the entry stops being live.
    expires_at: Option<u64>,
}

impl LocalEntry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Local counterpart of [`AtomicStore`](crate::store::AtomicStore).
#[derive(Debug)]
pub struct LocalStore {
    entries: DashMap<String, LocalEntry>,
    clock: Arc<dyn Clock>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl LocalStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn set_if_absent_now(&self, key: &str, ttl: Duration) -> bool {
        let now = self.clock.now();
        let fresh = LocalEntry {
            value: 1,
            expires_at: Some(now + ttl.as_secs()),
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    false
                } else {
                    occupied.insert(fresh);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        }
    }

    /// Increment `key`, giving it `ttl` when it is created or has no expiry.
    pub fn increment_with_expiry_now(&self, key: &str, ttl: Duration) -> i64 {
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(LocalEntry {
            value: 0,
            expires_at: None,
        });
        if !entry.is_live(now) {
            *entry = LocalEntry {
                value: 0,
                expires_at: None,
            };
        }
        entry.value += 1;
        if entry.expires_at.is_none() {
            entry.expires_at = Some(now + ttl.as_secs());
        }
        entry.value
    }

    pub fn ttl_now(&self, key: &str) -> Option<i64> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if !entry.is_live(now) {
            return None;
        }
        entry.expires_at.map(|at| (at - now) as i64)
    }

    pub fn count_prefix_now(&self, prefix: &str) -> usize {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|r| r.key().starts_with(prefix) && r.value().is_live(now))
            .count()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
