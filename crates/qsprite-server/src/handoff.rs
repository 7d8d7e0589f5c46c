//! Reading the upgrade request head off a raw socket.
//!
//! The listener reads until the header block is complete, parses it with
//! `httparse` and turns it into an [`UpgradeRequest`]. Bytes that arrived
//! after the blank line (the legacy nonce, or early frames) are returned
//! alongside so the conversation can consume them.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use qsprite_ws::UpgradeRequest;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout_at, Instant};

use crate::ServerError;

/// Most headers accepted in one request head.
pub const MAX_HEADERS: usize = 64;

const READ_CHUNK: usize = 1024;

/// Parse a buffered request head.
///
/// Returns `Ok(None)` while the head is incomplete, otherwise the request
/// and the number of bytes the head occupied.
///
/// # Errors
///
/// `MalformedHead` for unparseable input, `NotUpgrade` for anything other
/// than a `GET` carrying `Upgrade: websocket` and `Connection: upgrade`.
pub fn parse_head(buf: &[u8]) -> Result<Option<(UpgradeRequest, usize)>, ServerError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    let consumed = match parsed.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(ServerError::MalformedHead(e.to_string())),
    };

    let method = parsed.method.unwrap_or_default();
    if method != "GET" {
        return Err(ServerError::NotUpgrade(format!("method {method}")));
    }

    let mut builder = http::Request::builder()
        .method(method)
        .uri(parsed.path.unwrap_or("/"));
    for header in parsed.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    let request = builder
        .body(())
        .map_err(|e| ServerError::MalformedHead(e.to_string()))?;

    let upgrade = UpgradeRequest::from_http(&request);
    if !upgrade.has_websocket_upgrade() {
        return Err(ServerError::NotUpgrade("missing Upgrade: websocket".into()));
    }
    if !upgrade.has_connection_upgrade() {
        return Err(ServerError::NotUpgrade("missing Connection: upgrade".into()));
    }

    Ok(Some((upgrade, consumed)))
}

/// Read and parse the request head from `stream`.
///
/// # Errors
///
/// Fails when the head exceeds `max_bytes`, takes longer than `limit`, the
/// peer hangs up early, or [`parse_head`] rejects it.
pub async fn read_head<S>(
    stream: &mut S,
    max_bytes: usize,
    limit: Duration,
) -> Result<(UpgradeRequest, Bytes), ServerError>
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + limit;
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        if let Some((request, consumed)) = parse_head(&buf)? {
            let rest = buf.split_off(consumed).freeze();
            return Ok((request, rest));
        }
        if buf.len() >= max_bytes {
            return Err(ServerError::HeadTooLarge(max_bytes));
        }

        buf.reserve(READ_CHUNK);
        let read = timeout_at(deadline, stream.read_buf(&mut buf))
            .await
            .map_err(|_| ServerError::HeadTimeout)??;
        if read == 0 {
            return Err(ServerError::IncompleteHead);
        }
    }
}

/// A minimal response that closes the connection.
pub fn rejection(status: StatusCode) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const HYBI_HEAD: &str = "GET /chat?bind_services=echo HTTP/1.1\r\n\
        Host: example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: keep-alive, Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Origin: http://example.com\r\n\r\n";

    #[test]
    fn test_parse_complete_head() {
        let (request, consumed) = parse_head(HYBI_HEAD.as_bytes()).unwrap().unwrap();
        assert_eq!(consumed, HYBI_HEAD.len());
        assert_eq!(request.url(), "/chat?bind_services=echo");
        assert_eq!(request.version(), Some(13));
        assert_eq!(request.host(), Some("example.com"));
        assert_eq!(request.requested_services(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_parse_partial_head() {
        let partial = &HYBI_HEAD.as_bytes()[..HYBI_HEAD.len() - 2];
        assert!(parse_head(partial).unwrap().is_none());
    }

    #[test]
    fn test_parse_rejects_plain_http() {
        let head = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert!(matches!(parse_head(head), Err(ServerError::NotUpgrade(_))));

        let head = b"POST /ws HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
        assert!(matches!(parse_head(head), Err(ServerError::NotUpgrade(_))));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_head(b"\x00\x01\x02 nonsense\r\n\r\n"),
            Err(ServerError::MalformedHead(_))
        ));
    }

    #[tokio::test]
    async fn test_read_head_keeps_trailing_bytes() {
        let (first, second) = HYBI_HEAD.as_bytes().split_at(40);
        let mut tail = second.to_vec();
        tail.extend_from_slice(b"^n:ds[4U");
        let mut stream = Builder::new().read(first).read(&tail).build();

        let (request, rest) = read_head(&mut stream, 16 * 1024, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(request.has_websocket_upgrade());
        assert_eq!(&rest[..], b"^n:ds[4U");
    }

    #[tokio::test]
    async fn test_read_head_limits() {
        let mut stream = Builder::new().read(&[b'a'; 64]).build();
        let err = read_head(&mut stream, 32, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ServerError::HeadTooLarge(32)));

        let mut stream = Builder::new().read(b"GET / HTTP/1.1\r\n").build();
        let err = read_head(&mut stream, 1024, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ServerError::IncompleteHead));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_head_times_out() {
        let (_client, mut server) = tokio::io::duplex(64);
        let err = read_head(&mut server, 1024, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::HeadTimeout));
    }

    #[test]
    fn test_rejection() {
        let response = rejection(StatusCode::BAD_REQUEST);
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }
}
