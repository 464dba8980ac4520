//! Origin / Referer allow-listing.
//!
//! A request that carries neither header is treated as server-to-server and is
//! allowed through. Any client can reach that branch by omitting both headers,
//! so this gate only stops browsers running on foreign pages; the signature
//! gate is what authenticates the caller.

use axum::http::{header, HeaderMap};

use crate::security::rejection::Rejection;

#[derive(Debug, Clone)]
pub struct OriginGuard {
    allowed: Vec<String>,
}

impl OriginGuard {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn check_headers(&self, headers: &HeaderMap) -> Result<(), Rejection> {
        let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
        let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok());
        self.check(origin, referer)
    }

    pub fn check(&self, origin: Option<&str>, referer: Option<&str>) -> Result<(), Rejection> {
        let origin = origin.map(str::trim).filter(|v| !v.is_empty());
        let referer = referer.map(str::trim).filter(|v| !v.is_empty());

        if let Some(origin) = origin {
            if !self.origin_allowed(origin) {
                return Err(Rejection::OriginRejected);
            }
        }

        if let Some(referer) = referer {
            if !self.referer_allowed(referer) {
                return Err(Rejection::RefererRejected);
            }
        }

        Ok(())
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == origin)
    }

    fn referer_allowed(&self, referer: &str) -> bool {
        self.allowed.iter().any(|allowed| {
            referer == allowed
                || referer
                    .strip_prefix(allowed.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}
