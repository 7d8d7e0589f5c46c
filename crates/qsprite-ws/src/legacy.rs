//! Legacy "Early" dialect (hixie-75 and hixie-76).
//!
//! Frames are UTF-8 text between a `0x00` byte and a `0xFF` byte. The
//! hixie-76 handshake answers a challenge built from two obfuscated key
//! headers and an 8-byte nonce sent after the request header block.

use bytes::{BufMut, Bytes, BytesMut};
use md5::{Digest, Md5};
use tracing::{error, instrument};

use crate::codec::Packet;
use crate::error::{WsError, WsResult};
use crate::origin::OriginPolicy;
use crate::request::UpgradeRequest;

/// Length of the hixie-76 challenge nonce.
pub const NONCE_LEN: usize = 8;

/// First key header of the hixie-76 handshake.
pub const SEC_WEBSOCKET_KEY1: &str = "sec-websocket-key1";
/// Second key header of the hixie-76 handshake.
pub const SEC_WEBSOCKET_KEY2: &str = "sec-websocket-key2";

/// Start of a text frame.
pub const FRAME_START: u8 = 0x00;
/// End of a text frame.
pub const FRAME_END: u8 = 0xFF;
/// Closing handshake sent by the server.
pub const CLOSE_FRAME: [u8; 2] = [0xFF, 0x00];

/// Whether the request carries the hixie-76 key headers.
pub fn has_challenge(request: &UpgradeRequest) -> bool {
    request.header(SEC_WEBSOCKET_KEY1).is_some() && request.header(SEC_WEBSOCKET_KEY2).is_some()
}

/// Decode one obfuscated hixie-76 key.
///
/// The digits of the key form a number that must divide evenly by the
/// number of spaces in the key.
pub fn key_number(key: &str) -> WsResult<u32> {
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    let spaces = key.chars().filter(|c| *c == ' ').count() as u64;

    if spaces == 0 {
        return Err(WsError::handshake_failed("legacy key contains no spaces"));
    }
    let number: u64 = digits
        .parse()
        .map_err(|_| WsError::handshake_failed("legacy key has no usable digits"))?;
    if number % spaces != 0 {
        return Err(WsError::handshake_failed(
            "legacy key is not a multiple of its space count",
        ));
    }
    u32::try_from(number / spaces)
        .map_err(|_| WsError::handshake_failed("legacy key value exceeds 32 bits"))
}

/// Compute the 16-byte hixie-76 challenge response.
pub fn challenge_response(key1: &str, key2: &str, nonce: &[u8; NONCE_LEN]) -> WsResult<[u8; 16]> {
    let mut hasher = Md5::new();
    hasher.update(key_number(key1)?.to_be_bytes());
    hasher.update(key_number(key2)?.to_be_bytes());
    hasher.update(nonce);
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&hasher.finalize());
    Ok(digest)
}

/// Validate the upgrade request and build the legacy `101` response.
///
/// Requests with both key headers get the hixie-76 header set followed by
/// the raw digest, which requires `nonce`. Keyless requests get the older
/// hixie-75 header set.
#[instrument(skip_all, fields(token = %token))]
pub fn handshake(
    request: &UpgradeRequest,
    origins: &OriginPolicy,
    token: &impl std::fmt::Display,
    nonce: Option<&[u8; NONCE_LEN]>,
) -> WsResult<Bytes> {
    if !request.has_websocket_upgrade() {
        error!("connection invalid: missing websocket upgrade header");
        return Err(WsError::handshake_failed("missing websocket upgrade header"));
    }

    let origin = request.header(http::header::ORIGIN);
    if !origins.verify(origin) {
        error!("connection invalid: origin mismatch");
        return Err(WsError::origin_rejected(origin.unwrap_or("<missing>")));
    }
    let origin = origin.unwrap_or("null");
    let location = request.location();

    let mut response = BytesMut::new();
    match (request.header(SEC_WEBSOCKET_KEY1), request.header(SEC_WEBSOCKET_KEY2)) {
        (Some(key1), Some(key2)) => {
            let Some(nonce) = nonce else {
                error!("connection invalid: handshake nonce missing");
                return Err(WsError::handshake_failed("legacy handshake nonce missing"));
            };
            let digest = challenge_response(key1, key2, nonce).map_err(|e| {
                error!(error = %e, "connection invalid: bad legacy key");
                e
            })?;
            response.put_slice(
                format!(
                    "HTTP/1.1 101 WebSocket Protocol Handshake\r\n\
                     Upgrade: WebSocket\r\n\
                     Connection: Upgrade\r\n\
                     Sec-WebSocket-Origin: {origin}\r\n\
                     Sec-WebSocket-Location: {location}\r\n\
                     Session-Token: {token}\r\n\
                     \r\n"
                )
                .as_bytes(),
            );
            response.put_slice(&digest);
        }
        (None, None) => {
            response.put_slice(
                format!(
                    "HTTP/1.1 101 Web Socket Protocol Handshake\r\n\
                     Upgrade: WebSocket\r\n\
                     Connection: Upgrade\r\n\
                     WebSocket-Origin: {origin}\r\n\
                     WebSocket-Location: {location}\r\n\
                     Session-Token: {token}\r\n\
                     \r\n"
                )
                .as_bytes(),
            );
        }
        _ => {
            error!("connection invalid: only one legacy key header present");
            return Err(WsError::handshake_failed("incomplete legacy key headers"));
        }
    }
    Ok(response.freeze())
}

/// Encode a text frame.
pub fn encode_text(text: &str) -> Bytes {
    let mut dst = BytesMut::with_capacity(text.len() + 2);
    dst.put_u8(FRAME_START);
    dst.put_slice(text.as_bytes());
    dst.put_u8(FRAME_END);
    dst.freeze()
}

/// Delimiter-scanning frame decoder.
///
/// Partial frames accumulate until their terminator arrives, bounded by
/// the configured maximum message size.
#[derive(Debug)]
pub struct LegacyParser {
    buffer: BytesMut,
    scanned: usize,
    max_message_size: usize,
}

impl LegacyParser {
    /// Create a parser that rejects frames larger than `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_message_size,
        }
    }

    /// Number of bytes held for an unterminated frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame.
    fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    /// Decode every complete frame in `data`.
    ///
    /// A close sequence or a protocol error resets the parser and discards
    /// whatever followed it.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Packet> {
        self.buffer.extend_from_slice(data);
        let mut packets = Vec::new();

        while let Some(&kind) = self.buffer.first() {
            match kind {
                FRAME_START | FRAME_END if self.buffer.len() < 2 => break,
                FRAME_START | FRAME_END if self.buffer[1] == 0x00 => {
                    packets.push(Packet::Close(None));
                    self.reset();
                    break;
                }
                FRAME_START => {
                    let from = self.scanned.max(1);
                    match self.buffer[from..].iter().position(|b| *b == FRAME_END) {
                        Some(offset) => {
                            let end = from + offset;
                            let frame = self.buffer.split_to(end + 1);
                            self.scanned = 0;
                            match std::str::from_utf8(&frame[1..end]) {
                                Ok(text) => packets.push(Packet::Text(text.to_owned())),
                                Err(_) => {
                                    packets.push(Packet::Error("invalid UTF-8 in text frame".into()));
                                    self.reset();
                                    break;
                                }
                            }
                        }
                        None => {
                            if self.buffer.len() - 1 > self.max_message_size {
                                packets.push(Packet::Error(format!(
                                    "frame exceeds the maximum of {} bytes",
                                    self.max_message_size
                                )));
                                self.reset();
                            } else {
                                self.scanned = self.buffer.len();
                            }
                            break;
                        }
                    }
                }
                other => {
                    packets.push(Packet::Error(format!("unsupported legacy frame type 0x{other:02x}")));
                    self.reset();
                    break;
                }
            }
        }
        packets
    }
}
