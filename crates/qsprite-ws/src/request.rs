//! Upgrade handoff contract.
//!
//! The HTTP server that accepted the connection parses the request line and
//! header block, then hands an [`UpgradeRequest`] to the hub together with
//! the raw socket and any bytes it already read past the header block.

use http::header::{self, HeaderMap, HeaderName};
use http::Uri;

/// Query parameter listing the services to bind before the channel opens.
pub const BIND_SERVICES_PARAM: &str = "bind_services";

/// Alternate spelling used by older clients.
pub const BIND_CLIENT_SERVICES_PARAM: &str = "bind_client_services";

/// A parsed WebSocket upgrade request.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    uri: Uri,
    headers: HeaderMap,
    secure: bool,
}

impl UpgradeRequest {
    /// Create an upgrade request from a request target and its headers.
    pub fn new(uri: Uri, headers: HeaderMap) -> Self {
        Self {
            uri,
            headers,
            secure: false,
        }
    }

    /// Create an upgrade request from an `http::Request`.
    pub fn from_http<B>(request: &http::Request<B>) -> Self {
        Self::new(request.uri().clone(), request.headers().clone())
    }

    /// Mark the request as received over TLS.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Get the request target.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Get the request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the request was received over TLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Get a header value as a string.
    pub fn header(&self, name: impl AsHeaderName) -> Option<&str> {
        self.headers
            .get(name.header_name()?)
            .and_then(|v| v.to_str().ok())
    }

    /// Get the request path and query (e.g. `/chat?bind_services=a,b`).
    pub fn url(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or("/", http::uri::PathAndQuery::as_str)
    }

    /// Get the `Host` header.
    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST)
            .or_else(|| self.uri.authority().map(http::uri::Authority::as_str))
    }

    /// Get the URL the client connected to (`ws://host/path?query`).
    pub fn location(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self.host().unwrap_or(""), self.url())
    }

    /// Get the numeric `Sec-WebSocket-Version` header, if present.
    pub fn version(&self) -> Option<u32> {
        self.header(header::SEC_WEBSOCKET_VERSION)
            .and_then(|v| v.trim().parse().ok())
    }

    /// Check for `Upgrade: websocket` (case-insensitive).
    pub fn has_websocket_upgrade(&self) -> bool {
        self.header(header::UPGRADE)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
    }

    /// Check for a `Connection` header containing `upgrade`.
    pub fn has_connection_upgrade(&self) -> bool {
        self.header(header::CONNECTION)
            .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"))
    }

    /// Get a decoded query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .ok()?
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Get the service names requested through the query string.
    ///
    /// Names are trimmed and empty entries dropped; order is preserved.
    pub fn requested_services(&self) -> Vec<String> {
        self.query_param(BIND_SERVICES_PARAM)
            .or_else(|| self.query_param(BIND_CLIENT_SERVICES_PARAM))
            .map(|list| split_service_names(&list))
            .unwrap_or_default()
    }
}

/// Split a comma-separated service list.
pub fn split_service_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// Types usable as a header name lookup key.
pub trait AsHeaderName {
    /// Convert into a header name, or `None` if it is not a valid one.
    fn header_name(self) -> Option<HeaderName>;
}

impl AsHeaderName for HeaderName {
    fn header_name(self) -> Option<HeaderName> {
        Some(self)
    }
}

impl AsHeaderName for &str {
    fn header_name(self) -> Option<HeaderName> {
        HeaderName::from_bytes(self.as_bytes()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(target: &str) -> UpgradeRequest {
        let request = http::Request::builder()
            .uri(target)
            .header(header::HOST, "example.com:8091")
            .header(header::UPGRADE, "WebSocket")
            .header(header::CONNECTION, "keep-alive, Upgrade")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .body(())
            .unwrap();
        UpgradeRequest::from_http(&request)
    }

    #[test]
    fn test_requested_services() {
        let request = make_request("/ws?bind_services=chat,%20files,,billing");
        assert_eq!(request.requested_services(), vec!["chat", "files", "billing"]);
    }

    #[test]
    fn test_requested_services_alias() {
        let request = make_request("/ws?bind_client_services=chat");
        assert_eq!(request.requested_services(), vec!["chat"]);
    }

    #[test]
    fn test_requested_services_missing() {
        let request = make_request("/ws");
        assert!(request.requested_services().is_empty());
    }

    #[test]
    fn test_upgrade_headers() {
        let request = make_request("/");
        assert!(request.has_websocket_upgrade());
        assert!(request.has_connection_upgrade());
        assert_eq!(request.version(), Some(13));
    }

    #[test]
    fn test_location() {
        let request = make_request("/ws?bind_services=chat");
        assert_eq!(request.location(), "ws://example.com:8091/ws?bind_services=chat");
        let request = request.with_secure(true);
        assert!(request.location().starts_with("wss://"));
    }

    #[test]
    fn test_header_lookup_by_str() {
        let request = make_request("/");
        assert_eq!(request.header("host"), Some("example.com:8091"));
        assert_eq!(request.header("sec-websocket-key"), None);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = make_request("/");
        assert_eq!(request.header("Host"), Some("example.com:8091"));
        let name = String::from("SEC-WEBSOCKET-VERSION");
        assert_eq!(request.header(name.as_str()), Some("13"));
    }

    #[test]
    fn test_header_lookup_rejects_invalid_names() {
        let request = make_request("/");
        assert_eq!(request.header("Bad Name"), None);
        assert_eq!(request.header(""), None);
    }
}
