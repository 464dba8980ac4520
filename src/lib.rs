//! Hardened gateway for a voice-cloning speech-synthesis backend.
//!
//! Every request passes an ordered chain of gates (origin allow-list, Ed25519
//! request signatures with one-time nonces, human-verification challenge,
//! fixed-window rate limit) before it can reach the expensive synthesis engine.

// Core
pub mod clock;
pub mod config;
pub mod http;
pub mod net;
pub mod routes;

// Gates and their state
pub mod security;
pub mod store;

// Collaborators
pub mod engine;
pub mod voices;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
