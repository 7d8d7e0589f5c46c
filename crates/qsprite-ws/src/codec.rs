//! Dialect selection and the per-dialect encode/decode surface.
//!
//! The conversation never looks at wire bytes directly: it asks its
//! [`Dialect`] to frame outbound data and feeds inbound chunks to the
//! matching [`Decoder`].

use std::fmt;

use bytes::Bytes;

use crate::error::{WsError, WsResult};
use crate::frame::{Frame, Opcode, CLOSE_NORMAL};
use crate::hybi::{HybiParser, HybiVersion};
use crate::legacy::{self, LegacyParser};
use crate::request::UpgradeRequest;

/// A decoded unit handed from a parser to its conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// A complete text message.
    Text(String),
    /// A complete binary message.
    Binary(Bytes),
    /// A ping with its payload.
    Ping(Bytes),
    /// A pong with its payload.
    Pong(Bytes),
    /// The peer closed, with an optional status code.
    Close(Option<u16>),
    /// The peer violated the wire protocol.
    Error(String),
}

/// The wire dialect of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// The modern frame format under one of its version labels.
    Hybi(HybiVersion),
    /// The delimiter-framed "Early" dialect.
    Legacy,
}

impl Dialect {
    /// Pick the dialect for an upgrade request.
    ///
    /// A missing or unrecognized `Sec-WebSocket-Version` selects the legacy
    /// dialect.
    pub fn from_request(request: &UpgradeRequest) -> Self {
        request
            .version()
            .and_then(HybiVersion::from_version)
            .map_or(Self::Legacy, Self::Hybi)
    }

    /// Get the dialect name used in logs and metrics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hybi(version) => version.as_str(),
            Self::Legacy => "legacy",
        }
    }

    /// Create a decoder for this dialect.
    pub fn decoder(self, max_message_size: usize) -> Decoder {
        match self {
            Self::Hybi(_) => Decoder::Hybi(HybiParser::new(max_message_size)),
            Self::Legacy => Decoder::Legacy(LegacyParser::new(max_message_size)),
        }
    }

    /// Frame a text message.
    pub fn encode_text(self, text: &str) -> Bytes {
        match self {
            Self::Hybi(_) => Frame::text(text).encode(),
            Self::Legacy => legacy::encode_text(text),
        }
    }

    /// Frame a binary message.
    pub fn encode_binary(self, data: Bytes) -> WsResult<Bytes> {
        match self {
            Self::Hybi(_) => Ok(Frame::binary(data).encode()),
            Self::Legacy => Err(WsError::Unsupported {
                dialect: self.name(),
                operation: "binary frames",
            }),
        }
    }

    /// Frame a ping. The legacy dialect has none.
    pub fn encode_ping(self) -> Option<Bytes> {
        match self {
            Self::Hybi(_) => Some(Frame::new(Opcode::Ping, Bytes::new()).encode()),
            Self::Legacy => None,
        }
    }

    /// Frame a pong answering a ping payload.
    pub fn encode_pong(self, payload: Bytes) -> Option<Bytes> {
        match self {
            Self::Hybi(_) => Some(Frame::new(Opcode::Pong, payload).encode()),
            Self::Legacy => None,
        }
    }

    /// Frame a close. Hybi dialects send `code`, or 1000 when absent.
    pub fn encode_close(self, code: Option<u16>) -> Bytes {
        match self {
            Self::Hybi(_) => Frame::close(Some(code.unwrap_or(CLOSE_NORMAL))).encode(),
            Self::Legacy => Bytes::from_static(&legacy::CLOSE_FRAME),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The inbound parser of a conversation.
#[derive(Debug)]
pub enum Decoder {
    /// Modern frame parser.
    Hybi(HybiParser),
    /// Legacy delimiter parser.
    Legacy(LegacyParser),
}

impl Decoder {
    /// Decode every complete unit in `data`, in wire order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Packet> {
        match self {
            Self::Hybi(parser) => parser.feed(data),
            Self::Legacy(parser) => parser.feed(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(version: Option<&str>) -> UpgradeRequest {
        let mut builder = http::Request::builder().uri("/");
        if let Some(v) = version {
            builder = builder.header("sec-websocket-version", v);
        }
        UpgradeRequest::from_http(&builder.body(()).unwrap())
    }

    #[test]
    fn test_dialect_from_request() {
        assert_eq!(Dialect::from_request(&request(None)), Dialect::Legacy);
        assert_eq!(Dialect::from_request(&request(Some("abc"))), Dialect::Legacy);
        assert_eq!(Dialect::from_request(&request(Some("3"))), Dialect::Legacy);
        assert_eq!(
            Dialect::from_request(&request(Some("8"))),
            Dialect::Hybi(HybiVersion::Draft07To12)
        );
        assert_eq!(
            Dialect::from_request(&request(Some("13"))),
            Dialect::Hybi(HybiVersion::Hybi16)
        );
        assert_eq!(
            Dialect::from_request(&request(Some("17"))),
            Dialect::Hybi(HybiVersion::Hybi17)
        );
    }

    #[test]
    fn test_legacy_rejects_binary() {
        let err = Dialect::Legacy.encode_binary(Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, WsError::Unsupported { .. }));
        assert!(Dialect::Legacy.encode_ping().is_none());
    }

    #[test]
    fn test_encode_close() {
        let hybi = Dialect::Hybi(HybiVersion::Hybi17);
        assert_eq!(&hybi.encode_close(None)[..], &[0x88, 0x02, 0x03, 0xE8]);
        assert_eq!(&Dialect::Legacy.encode_close(None)[..], &[0xFF, 0x00]);
    }

    #[test]
    fn test_encode_ping() {
        let hybi = Dialect::Hybi(HybiVersion::Hybi16);
        assert_eq!(&hybi.encode_ping().unwrap()[..], &[0x89, 0x00]);
    }

    #[test]
    fn test_decoder_roundtrip_per_dialect() {
        for dialect in [Dialect::Legacy, Dialect::Hybi(HybiVersion::Hybi16)] {
            let mut decoder = dialect.decoder(1024);
            let packets = decoder.feed(&dialect.encode_text("héllo"));
            assert_eq!(packets, vec![Packet::Text("héllo".into())], "{dialect}");
        }
    }
}
