//! tts-gateway
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id → trace → CORS → timeout
//!                         │
//!                         ▼
//!                  ┌───────────────────────────── security pipeline ─┐
//!                  │ origin → signature+nonce → challenge → rate limit │
//!                  └──────────────────────┬────────────────────────────┘
//!                                         │        ▲
//!                                         │        │ shared store (Redis)
//!                                         ▼        │ or local fallback
//!                                  route handlers
//!                                         │
//!                          job queue → synthesis engine (subprocess)
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use tts_gateway::clock::{Clock, SystemClock};
use tts_gateway::config::load_layered;
use tts_gateway::http::{AppState, Collaborators, HttpServer};
use tts_gateway::lifecycle::{signals, startup, sweeper::Sweeper, Shutdown};
use tts_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "tts-gateway", version)]
#[command(about = "Security gateway for the voice-cloning TTS service", long_about = None)]
struct Args {
    /// TOML config file. Environment variables override it.
    #[arg(short, long, env = "TTS_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_layered(args.config.as_deref(), |name| std::env::var(name).ok())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tts-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        signing = config.signing.enabled,
        challenge = config.challenge.enabled,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    startup::prepare_storage(&config.storage).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stores = startup::connect_stores(&config.shared_store, clock.clone()).await;
    let collaborators = Collaborators::from_config(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let sweep_interval = Duration::from_secs(config.shared_store.sweep_interval_secs);
    let state = AppState::new(config, stores.clone(), collaborators, clock);

    let shutdown = Shutdown::new();
    let sweeper = Sweeper::new(
        stores.local.clone(),
        state.pipeline.rate_limiter().clone(),
        sweep_interval,
    )
    .spawn(shutdown.subscribe());

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        trigger.trigger();
    });

    HttpServer::new(state).run(listener, &shutdown).await?;

    let _ = sweeper.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
