//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast on local problems (unwritable directories)
//! - An unreachable shared store is not fatal: the gateway starts on local
//!   state and says so

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::{SharedStoreConfig, StorageConfig};
use crate::store::{AtomicStore, LocalStore, RedisStore, StoreSet};

/// Create the upload, output and gallery directories.
pub async fn prepare_storage(storage: &StorageConfig) -> std::io::Result<()> {
    for dir in [&storage.output_dir, &storage.temp_dir, &storage.voices_dir] {
        tokio::fs::create_dir_all(dir).await?;
    }
    Ok(())
}

/// Connect the shared store if one is configured, always with a local fallback.
pub async fn connect_stores(config: &SharedStoreConfig, clock: Arc<dyn Clock>) -> StoreSet {
    let local = Arc::new(LocalStore::new(clock));

    if config.url.trim().is_empty() {
        tracing::info!("No shared store configured, using in-process state");
        return StoreSet::local_only(local);
    }

    let connect = RedisStore::connect(&config.url, Duration::from_millis(config.op_timeout_ms));
    let shared = match tokio::time::timeout(Duration::from_millis(config.connect_timeout_ms), connect).await {
        Ok(Ok(store)) => {
            tracing::info!(url = %redacted(&config.url), "Shared store connected");
            Some(Arc::new(store) as Arc<dyn AtomicStore>)
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Shared store unavailable, falling back to in-process state");
            None
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = config.connect_timeout_ms,
                "Shared store connect timed out, falling back to in-process state"
            );
            None
        }
    };

    StoreSet::new(shared, local)
}

/// Connection string with any password masked.
fn redacted(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
