//! Network layer.
//!
//! TLS is optional: when `listener.tls` is set the HTTP server terminates TLS
//! itself with the certificate loaded here.

pub mod tls;
