//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → pipeline.rs (exemptions, body buffering, gate order)
//!     → origin.rs (Origin / Referer allow-list)
//!     → signature.rs + nonce.rs (Ed25519 signature, one-time nonce)
//!     → challenge.rs (human-verification token on protected POSTs)
//!     → rate_limit.rs (fixed-window quota per client_id.rs identifier)
//!     → Pass to route handler
//! ```
//!
//! # Design Decisions
//! - Fail closed for trust checks: signature and challenge errors reject
//! - Fail soft for availability checks: store outages fall back to local state
//! - Rejections carry a category only; details go to the logs

pub mod challenge;
pub mod client_id;
pub mod nonce;
pub mod origin;
pub mod pipeline;
pub mod rate_limit;
pub mod rejection;
pub mod signature;

pub use pipeline::{pipeline_middleware, Pipeline};
pub use rejection::Rejection;
