//! Background cleanup of expired local state.
//!
//! Reads already ignore expired entries; this only bounds memory.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::security::rate_limit::RateLimiter;
use crate::store::LocalStore;

pub struct Sweeper {
    local: Arc<LocalStore>,
    limiter: Arc<RateLimiter>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(local: Arc<LocalStore>, limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        Self {
            local,
            limiter,
            interval,
        }
    }

    /// One pass. Returns (store entries, rate windows) removed.
    pub fn sweep_once(&self) -> (usize, usize) {
        let entries = self.local.sweep();
        let windows = self.limiter.sweep_local();
        if entries + windows > 0 {
            tracing::debug!(entries, windows, "Swept expired local state");
        }
        (entries, windows)
    }

    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once();
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}
