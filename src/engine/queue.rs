//! Bounded synthesis concurrency.
//!
//! Jobs past the limit wait for a permit. Waiting and running counts are kept
//! for the status endpoint and stay correct if a waiting request is dropped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::engine::{EngineError, EngineResult, SynthesisEngine, SynthesisRequest};
use crate::observability::metrics;

#[derive(Debug, Default)]
struct Counters {
    waiting: AtomicUsize,
    running: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct JobQueue {
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
}

/// A held engine slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct JobPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for JobPermit {
    fn drop(&mut self) {
        self.counters.running.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Waiting(Arc<Counters>);

impl Waiting {
    fn enter(counters: Arc<Counters>) -> Self {
        counters.waiting.fetch_add(1, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for Waiting {
    fn drop(&mut self) {
        self.0.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

impl JobQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            counters: Arc::new(Counters::default()),
        }
    }

    pub async fn acquire(&self) -> EngineResult<JobPermit> {
        let _waiting = Waiting::enter(self.counters.clone());
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::QueueClosed)?;
        self.counters.running.fetch_add(1, Ordering::SeqCst);
        Ok(JobPermit {
            _permit: permit,
            counters: self.counters.clone(),
        })
    }

    /// Wait for a slot, then run one synthesis job in it.
    pub async fn synthesize(
        &self,
        engine: &dyn SynthesisEngine,
        request: &SynthesisRequest,
    ) -> EngineResult<PathBuf> {
        let _permit = self.acquire().await?;
        tracing::info!(
            language = %request.language,
            chars = request.text.chars().count(),
            "Synthesis job started"
        );

        let result = engine.synthesize(request).await;
        match &result {
            Ok(_) => metrics::record_synthesis("success"),
            Err(EngineError::Timeout(_)) => metrics::record_synthesis("timeout"),
            Err(e) => {
                tracing::error!(error = %e, "Synthesis job failed");
                metrics::record_synthesis("failure");
            }
        }
        result
    }

    pub fn waiting(&self) -> usize {
        self.counters.waiting.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::SeqCst)
    }
}
