//! Gate orchestration.
//!
//! # Data Flow
//! ```text
//! request
//!     → S0 exempt? (OPTIONS, /health, /queue/status) ──────────────→ handler
//!     → buffer body (max_body_size, else 413)
//!     → S1 OriginGuard
//!     → S2 RequestAuthenticator     (signing enabled)
//!     → S3 ChallengeVerifier        (POST to a protected path, challenge enabled)
//!     → S4 RateLimiter              (rate limiting enabled)
//!     → handler, with the buffered body re-attached
//! ```
//!
//! The first rejection is the response. No gate runs twice.

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{request::Parts, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::GatewayConfig;
use crate::observability::metrics;
use crate::security::challenge::{self, ChallengeService, ChallengeVerifier};
use crate::security::client_id::{self, ClientIdentifier};
use crate::security::nonce::NonceRegistry;
use crate::security::origin::OriginGuard;
use crate::security::rate_limit::{Allowance, RateLimiter};
use crate::security::rejection::Rejection;
use crate::security::signature::RequestAuthenticator;
use crate::store::StoreSet;

pub const EXEMPT_PATHS: [&str; 2] = ["/health", "/queue/status"];

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

pub fn is_exempt(method: &Method, path: &str) -> bool {
    method == Method::OPTIONS || EXEMPT_PATHS.contains(&path)
}

/// Paths whose POSTs need a challenge token.
pub fn is_protected(path: &str) -> bool {
    path == "/clone" || path == "/voices" || path.starts_with("/voices/")
}

/// Which stage produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Body,
    Origin,
    Signature,
    Challenge,
    RateLimit,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Origin => "origin",
            Self::Signature => "signature",
            Self::Challenge => "challenge",
            Self::RateLimit => "rate_limit",
        }
    }
}

pub struct Pipeline {
    origin: OriginGuard,
    authenticator: Option<RequestAuthenticator>,
    challenge: Option<ChallengeVerifier>,
    rate_limiter: Arc<RateLimiter>,
    rate_limit_enabled: bool,
    max_body_size: usize,
}

impl Pipeline {
    pub fn from_config(
        config: &GatewayConfig,
        stores: StoreSet,
        challenge_service: Arc<dyn ChallengeService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let authenticator = config.signing.enabled.then(|| {
            let nonces = NonceRegistry::new(
                stores.clone(),
                config.shared_store.nonce_prefix.clone(),
                Duration::from_secs(config.signing.max_age_secs),
            );
            RequestAuthenticator::new(&config.signing, nonces, clock.clone())
        });

        let challenge = config
            .challenge
            .enabled
            .then(|| ChallengeVerifier::new(challenge_service, config.challenge.secret_key.clone()));

        let rate_limiter = Arc::new(RateLimiter::new(
            &config.rate_limit,
            stores,
            config.shared_store.rate_limit_prefix.clone(),
            clock,
        ));

        tracing::info!(
            signing = config.signing.enabled,
            challenge = config.challenge.enabled,
            rate_limit = config.rate_limit.enabled,
            origins = config.security.allowed_frontend_origins.len(),
            "Security pipeline configured"
        );

        Self {
            origin: OriginGuard::new(config.security.allowed_frontend_origins.clone()),
            authenticator,
            challenge,
            rate_limiter,
            rate_limit_enabled: config.rate_limit.enabled,
            max_body_size: config.security.max_body_size,
        }
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Run S1..S4 over a buffered request.
    pub async fn evaluate(
        &self,
        parts: &Parts,
        peer: Option<SocketAddr>,
        body: &Bytes,
    ) -> Result<Option<Allowance>, (Gate, Rejection)> {
        let headers = &parts.headers;
        let path = parts.uri.path();

        self.origin
            .check_headers(headers)
            .map_err(|r| (Gate::Origin, r))?;

        if let Some(authenticator) = &self.authenticator {
            authenticator
                .verify(&parts.method, path, body, headers)
                .await
                .map_err(|r| (Gate::Signature, r))?;
        }

        if let Some(verifier) = &self.challenge {
            if parts.method == Method::POST && is_protected(path) {
                let token = challenge::extract_token(headers, body).await;
                let ip = client_id::client_ip(headers, peer);
                verifier
                    .verify(token.as_deref(), ip.as_deref())
                    .await
                    .map_err(|r| (Gate::Challenge, r))?;
            }
        }

        if !self.rate_limit_enabled {
            return Ok(None);
        }

        let id = ClientIdentifier::resolve(headers, peer);
        self.rate_limiter
            .consume(&id)
            .await
            .map(Some)
            .map_err(|r| (Gate::RateLimit, r))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("origin", &self.origin)
            .field("signing", &self.authenticator.is_some())
            .field("challenge", &self.challenge)
            .field("rate_limiter", &self.rate_limiter)
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

/// Axum middleware running the pipeline in front of every route.
pub async fn pipeline_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request,
    next: Next,
) -> Response {
    if is_exempt(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, pipeline.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Could not buffer request body");
            return reject(&parts, Gate::Body, Rejection::PayloadTooLarge);
        }
    };

    match pipeline.evaluate(&parts, peer, &body).await {
        Ok(allowance) => {
            let mut response = next.run(Request::from_parts(parts, Body::from(body))).await;
            if let Some(allowance) = allowance {
                let headers = response.headers_mut();
                headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(allowance.limit));
                headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(allowance.remaining));
            }
            response
        }
        Err((gate, rejection)) => reject(&parts, gate, rejection),
    }
}

fn reject(parts: &Parts, gate: Gate, rejection: Rejection) -> Response {
    if rejection.status().is_server_error() {
        tracing::error!(gate = gate.as_str(), method = %parts.method, path = %parts.uri.path(), "{}", rejection);
    } else {
        tracing::warn!(
            gate = gate.as_str(),
            kind = rejection.kind(),
            method = %parts.method,
            path = %parts.uri.path(),
            "Request rejected"
        );
    }
    metrics::record_rejection(gate.as_str(), rejection.kind());
    rejection.into_response()
}
