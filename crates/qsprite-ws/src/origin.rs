//! Origin allow-list.
//!
//! Entries are `host:port` patterns where either side may be `*`.
//! `*:*` accepts every request, including ones that carry no origin.
//! A literal `null` origin (sandboxed documents, `file://` pages) only
//! matches entries with a wildcard host.

use std::str::FromStr;

use http::uri::Authority;
use http::Uri;
use tracing::warn;

use crate::error::{WsError, WsResult};

/// One side of an origin pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part<T> {
    Any,
    Exact(T),
}

impl<T: PartialEq> Part<T> {
    fn matches(&self, value: &T) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == value,
        }
    }
}

/// A single allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPattern {
    host: Part<String>,
    port: Part<u16>,
}

impl OriginPattern {
    /// Whether this entry accepts every origin.
    pub fn is_full_wildcard(&self) -> bool {
        self.host == Part::Any && self.port == Part::Any
    }

    fn has_wildcard_host(&self) -> bool {
        self.host == Part::Any
    }

    fn matches(&self, host: &str, port: u16) -> bool {
        let host_ok = match &self.host {
            Part::Any => true,
            Part::Exact(expected) => expected.eq_ignore_ascii_case(host),
        };
        host_ok && self.port.matches(&port)
    }
}

impl FromStr for OriginPattern {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(WsError::handshake_failed("empty origin pattern"));
        }

        let (host, port) = match s.rsplit_once(':') {
            // A bare IPv6 literal has no port part.
            Some((host, _)) if host.starts_with('[') && !host.ends_with(']') => (s, "*"),
            Some((host, port)) => (host, port),
            None => (s, "*"),
        };

        let host = match host {
            "*" => Part::Any,
            "" => return Err(WsError::handshake_failed(format!("missing host in origin pattern: {s}"))),
            h => Part::Exact(h.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase()),
        };
        let port = match port {
            "*" => Part::Any,
            p => Part::Exact(p.parse().map_err(|_| {
                WsError::handshake_failed(format!("invalid port in origin pattern: {s}"))
            })?),
        };

        Ok(Self { host, port })
    }
}

/// A parsed request origin.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RequestOrigin {
    Null,
    Site { host: String, port: u16 },
}

fn default_port(scheme: Option<&str>) -> u16 {
    match scheme.map(str::to_ascii_lowercase).as_deref() {
        Some("https" | "wss") => 443,
        _ => 80,
    }
}

fn parse_origin(origin: &str) -> Option<RequestOrigin> {
    let origin = origin.trim();
    if origin == "null" {
        return Some(RequestOrigin::Null);
    }

    if let Ok(uri) = origin.parse::<Uri>() {
        if let Some(host) = uri.host() {
            let port = uri.port_u16().unwrap_or_else(|| default_port(uri.scheme_str()));
            return Some(RequestOrigin::Site {
                host: host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase(),
                port,
            });
        }
    }

    // Scheme-less `host[:port]` origins sent by some native clients.
    let authority = Authority::from_str(origin).ok()?;
    Some(RequestOrigin::Site {
        host: authority.host().trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase(),
        port: authority.port_u16().unwrap_or(80),
    })
}

/// The origin allow-list of a hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    patterns: Vec<OriginPattern>,
}

impl OriginPolicy {
    /// Parse an allow-list.
    pub fn new<I, T>(patterns: I) -> WsResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().parse())
            .collect::<WsResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// An allow-list containing only `*:*`.
    pub fn allow_all() -> Self {
        Self {
            patterns: vec![OriginPattern {
                host: Part::Any,
                port: Part::Any,
            }],
        }
    }

    /// Get the parsed entries.
    pub fn patterns(&self) -> &[OriginPattern] {
        &self.patterns
    }

    /// Check a request origin against the allow-list.
    ///
    /// Rejections are logged with the offending origin.
    pub fn verify(&self, origin: Option<&str>) -> bool {
        if self.patterns.iter().any(OriginPattern::is_full_wildcard) {
            return true;
        }

        let Some(raw) = origin else {
            warn!("origin missing from handshake, yet required by config");
            return false;
        };

        let allowed = match parse_origin(raw) {
            Some(RequestOrigin::Null) => self.patterns.iter().any(OriginPattern::has_wildcard_host),
            Some(RequestOrigin::Site { host, port }) => {
                self.patterns.iter().any(|p| p.matches(&host, port))
            }
            None => {
                warn!(origin = %raw, "error parsing origin");
                return false;
            }
        };

        if !allowed {
            warn!(origin = %raw, "illegal origin");
        }
        allowed
    }
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::allow_all()
    }
}

/// Check `origin` against a list of `host:port` patterns.
///
/// A malformed pattern list rejects every origin.
pub fn verify_origin<T: AsRef<str>>(allowed: &[T], origin: Option<&str>) -> bool {
    match OriginPolicy::new(allowed) {
        Ok(policy) => policy.verify(origin),
        Err(e) => {
            warn!(error = %e, "invalid origin allow-list");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_wildcard_accepts_anything() {
        let policy = OriginPolicy::new(["*:*"]).unwrap();
        assert!(policy.verify(Some("http://evil.example:1234")));
        assert!(policy.verify(Some("not a url at all")));
        assert!(policy.verify(None));
    }

    #[test]
    fn test_exact_entry() {
        let policy = OriginPolicy::new(["example.com:80"]).unwrap();
        assert!(policy.verify(Some("http://example.com")));
        assert!(policy.verify(Some("http://EXAMPLE.com:80")));
        assert!(!policy.verify(Some("https://example.com")));
        assert!(!policy.verify(Some("http://other.com")));
    }

    #[test]
    fn test_host_wildcard_port() {
        let policy = OriginPolicy::new(["example.com:*"]).unwrap();
        assert!(policy.verify(Some("https://example.com:8443")));
        assert!(!policy.verify(Some("https://example.org")));
    }

    #[test]
    fn test_port_wildcard_host() {
        let policy = OriginPolicy::new(["*:8091"]).unwrap();
        assert!(policy.verify(Some("http://a.example:8091")));
        assert!(policy.verify(Some("127.0.0.1:8091")));
        assert!(!policy.verify(Some("http://a.example:8092")));
    }

    #[test]
    fn test_rejects_absent_origin() {
        let policy = OriginPolicy::new(["example.com:80"]).unwrap();
        assert!(!policy.verify(Some("http://absent.example")));
        assert!(!policy.verify(None));
    }

    #[test]
    fn test_null_origin() {
        let exact = OriginPolicy::new(["example.com:80"]).unwrap();
        assert!(!exact.verify(Some("null")));
        let wildcard_host = OriginPolicy::new(["*:443"]).unwrap();
        assert!(wildcard_host.verify(Some("null")));
    }

    #[test]
    fn test_malformed_origin_rejected() {
        let policy = OriginPolicy::new(["example.com:80"]).unwrap();
        assert!(!policy.verify(Some("http://")));
        assert!(!policy.verify(Some("::::")));
    }

    #[test]
    fn test_bad_pattern() {
        assert!(OriginPolicy::new(["example.com:http"]).is_err());
        assert!(OriginPolicy::new([":80"]).is_err());
        assert!(!verify_origin(&["example.com:http"], Some("http://example.com")));
    }

    #[test]
    fn test_verify_origin_helper() {
        assert!(verify_origin(&["*:*"], Some("http://any.example")));
        assert!(!verify_origin(&["good.example:80"], Some("http://bad.example")));
    }
}
