//! Client identification from request metadata.
//!
//! Precedence: explicit user header, then the first hop of `X-Forwarded-For`,
//! then `X-Real-IP`, then the socket peer. Empty values count as absent.

use axum::http::HeaderMap;
use std::fmt;
use std::net::SocketAddr;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Key for per-client rate-limit state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentifier(String);

impl ClientIdentifier {
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        if let Some(user) = header_value(headers, USER_ID_HEADER) {
            return Self(format!("user:{}", user));
        }

        if let Some(ip) = first_forwarded(headers) {
            return Self(format!("ip:{}", ip));
        }

        if let Some(ip) = header_value(headers, REAL_IP_HEADER) {
            return Self(format!("ip:{}", ip));
        }

        match peer {
            Some(addr) => Self(format!("ip:{}", addr.ip())),
            None => Self("ip:unknown".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address reported to the challenge service: forwarded client, else peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    first_forwarded(headers).or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn first_forwarded(headers: &HeaderMap) -> Option<String> {
    header_value(headers, FORWARDED_FOR_HEADER)?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.9:55000".parse().unwrap())
    }

    #[test]
    fn test_user_header_wins() {
        let h = headers(&[
            ("x-user-id", "alice"),
            ("x-forwarded-for", "1.2.3.4"),
            ("x-real-ip", "5.6.7.8"),
        ]);
        assert_eq!(ClientIdentifier::resolve(&h, peer()).as_str(), "user:alice");
    }

    #[test]
    fn test_first_forwarded_hop() {
        let h = headers(&[("x-forwarded-for", " 1.2.3.4 , 10.0.0.1"), ("x-real-ip", "5.6.7.8")]);
        assert_eq!(ClientIdentifier::resolve(&h, peer()).as_str(), "ip:1.2.3.4");
    }

    #[test]
    fn test_real_ip_then_peer() {
        let h = headers(&[("x-forwarded-for", " , 10.0.0.1"), ("x-real-ip", "5.6.7.8")]);
        assert_eq!(ClientIdentifier::resolve(&h, peer()).as_str(), "ip:5.6.7.8");

        let h = headers(&[("x-user-id", "  ")]);
        assert_eq!(ClientIdentifier::resolve(&h, peer()).as_str(), "ip:10.0.0.9");
        assert_eq!(ClientIdentifier::resolve(&h, None).as_str(), "ip:unknown");
    }

    #[test]
    fn test_client_ip_for_challenge() {
        let h = headers(&[("x-forwarded-for", "1.2.3.4, 10.0.0.1")]);
        assert_eq!(client_ip(&h, peer()).as_deref(), Some("1.2.3.4"));
        assert_eq!(client_ip(&HeaderMap::new(), peer()).as_deref(), Some("10.0.0.9"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
