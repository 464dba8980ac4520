//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with every route handler
//! - Wire up middleware (request id, tracing, CORS, timeout, body limit, pipeline)
//! - Bind to the listener, plain or TLS
//! - Drain in-flight requests on shutdown
//!
//! # Layer order (outermost first)
//! ```text
//! SetRequestId → Trace → metrics → PropagateRequestId → CORS → Timeout
//!     → body limit → security pipeline → handler
//! ```

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::clock::Clock;
use crate::config::GatewayConfig;
use crate::engine::{AudioToolkit, CommandEngine, FfmpegToolkit, JobQueue, SynthesisEngine};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::net::tls::load_tls_config;
use crate::observability::metrics;
use crate::routes::{speech, status, voices};
use crate::security::challenge::{ChallengeError, ChallengeService, HttpChallengeService};
use crate::security::pipeline::{RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER};
use crate::security::{pipeline_middleware, Pipeline};
use crate::store::StoreSet;
use crate::voices::VoiceCatalog;

/// Time given to in-flight requests once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// External collaborators the handlers and pipeline call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn SynthesisEngine>,
    pub audio: Arc<dyn AudioToolkit>,
    pub challenge: Arc<dyn ChallengeService>,
}

impl Collaborators {
    /// The shipped adapters: subprocess engine, ffmpeg, HTTP challenge client.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ChallengeError> {
        Ok(Self {
            engine: Arc::new(CommandEngine::new(&config.engine)),
            audio: Arc::new(FfmpegToolkit::new(&config.engine)),
            challenge: Arc::new(HttpChallengeService::new(
                config.challenge.verify_url.clone(),
                Duration::from_secs(config.challenge.timeout_secs),
            )?),
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub stores: StoreSet,
    pub pipeline: Arc<Pipeline>,
    pub engine: Arc<dyn SynthesisEngine>,
    pub audio: Arc<dyn AudioToolkit>,
    pub jobs: JobQueue,
    pub catalog: Arc<VoiceCatalog>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        stores: StoreSet,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pipeline = Arc::new(Pipeline::from_config(
            &config,
            stores.clone(),
            collaborators.challenge,
            clock.clone(),
        ));

        Self {
            jobs: JobQueue::new(config.engine.max_concurrent_jobs),
            catalog: Arc::new(VoiceCatalog::new(config.storage.catalog_path.clone())),
            config: Arc::new(config),
            stores,
            pipeline,
            engine: collaborators.engine,
            audio: collaborators.audio,
            clock,
        }
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .route("/tts", post(speech::text_to_speech))
        .route("/clone", post(speech::clone_voice))
        .route("/voices", get(voices::list_voices).post(voices::save_voice))
        .route("/voices/{id}", delete(voices::delete_voice))
        .route("/voices/{id}/use", post(voices::use_voice))
        .route("/queue/status", get(status::queue_status))
        .route("/health", get(status::health))
        .layer(middleware::from_fn_with_state(
            state.pipeline.clone(),
            pipeline_middleware,
        ))
        .layer(DefaultBodyLimit::max(config.security.max_body_size))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(cors_layer(&config.security.cors_origins))
        .layer(propagate_request_id_layer())
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request.request_id(),
            )
        }))
        .layer(set_request_id_layer())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring unusable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([
            header::RETRY_AFTER,
            HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER),
            HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER),
            HeaderName::from_static(X_REQUEST_ID),
        ])
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: Arc<GatewayConfig>,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let config = state.config.clone();
        Self {
            router: build_router(state),
            config,
        }
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();

        match &self.config.listener.tls {
            Some(tls) => {
                let rustls = load_tls_config(&tls.cert_path, &tls.key_path).await?;
                tracing::info!(address = %addr, "HTTPS server starting");

                let handle = axum_server::Handle::new();
                let drain = handle.clone();
                tokio::spawn(async move {
                    let _ = stop.recv().await;
                    drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            None => {
                tracing::info!(address = %addr, "HTTP server starting");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = stop.recv().await;
                    })
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}
