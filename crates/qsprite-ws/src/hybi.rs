//! Modern (hybi draft 07 through RFC 6455) handshake and frame decoder.
//!
//! Every version label shares the same frame format, so a single
//! [`HybiParser`] serves all of them. [`HybiVersion`] only affects which
//! origin header the handshake inspects first.

use std::fmt;

use base64::Engine;
use bytes::{Buf, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tracing::{error, instrument};

use crate::codec::Packet;
use crate::error::{WsError, WsResult};
use crate::frame::{apply_mask, Opcode, FIN, LEN_16, LEN_64, MASK_BIT, MAX_INLINE_LEN, RSV_MASK};
use crate::origin::OriginPolicy;
use crate::request::UpgradeRequest;

/// The WebSocket magic GUID used in the handshake.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const SEC_WEBSOCKET_ORIGIN: &str = "sec-websocket-origin";

/// Protocol-version labels of the modern frame family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HybiVersion {
    /// Drafts hybi-07 through hybi-12 (`Sec-WebSocket-Version` 7..=12).
    Draft07To12,
    /// Drafts hybi-13 through hybi-16, including RFC 6455 (version 13..=16).
    Hybi16,
    /// Draft hybi-17 and anything newer.
    Hybi17,
}

impl HybiVersion {
    /// Map a `Sec-WebSocket-Version` value to a version label.
    ///
    /// Returns `None` for versions below 7, which predate the frame format.
    pub const fn from_version(version: u32) -> Option<Self> {
        match version {
            7..=12 => Some(Self::Draft07To12),
            13..=16 => Some(Self::Hybi16),
            17.. => Some(Self::Hybi17),
            _ => None,
        }
    }

    /// Get the version label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft07To12 => "hybi-07-12",
            Self::Hybi16 => "hybi-16",
            Self::Hybi17 => "hybi-17",
        }
    }

    /// Get the request origin.
    ///
    /// Drafts before 13 carried the origin in `Sec-WebSocket-Origin`; later
    /// revisions use `Origin`. Either header is accepted as a fallback.
    pub fn origin(self, request: &UpgradeRequest) -> Option<&str> {
        let origin = request.header(http::header::ORIGIN);
        let legacy = request.header(SEC_WEBSOCKET_ORIGIN);
        match self {
            Self::Draft07To12 => legacy.or(origin),
            Self::Hybi16 | Self::Hybi17 => origin.or(legacy),
        }
    }
}

impl fmt::Display for HybiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the `Sec-WebSocket-Accept` value for a client key.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Validate the upgrade request and build the `101` response.
///
/// Nothing is written here; a failed precondition therefore leaves the
/// socket untouched.
#[instrument(skip_all, fields(version = %version, token = %token))]
pub fn handshake(
    request: &UpgradeRequest,
    version: HybiVersion,
    origins: &OriginPolicy,
    token: &impl fmt::Display,
) -> WsResult<Bytes> {
    if !request.has_websocket_upgrade() {
        error!("connection invalid: missing websocket upgrade header");
        return Err(WsError::handshake_failed("missing websocket upgrade header"));
    }

    let origin = version.origin(request);
    if !origins.verify(origin) {
        error!("connection invalid: origin mismatch");
        return Err(WsError::origin_rejected(origin.unwrap_or("<missing>")));
    }

    let Some(key) = request.header(http::header::SEC_WEBSOCKET_KEY) else {
        error!("connection invalid: received no key");
        return Err(WsError::handshake_failed("missing Sec-WebSocket-Key header"));
    };

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Session-Token: {token}\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        compute_accept_key(key.trim())
    );
    Ok(Bytes::from(response))
}

/// What the parser is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// The 2-byte base header.
    Header,
    /// A 2-byte extended length.
    Length16,
    /// An 8-byte extended length.
    Length64,
    /// The 4-byte masking key.
    MaskKey,
    /// The payload of the current frame.
    Payload,
}

/// Header fields of the frame being decoded.
#[derive(Debug, Clone, Copy)]
struct FrameHead {
    fin: bool,
    opcode: Opcode,
    masked: bool,
    len: usize,
    mask: [u8; 4],
}

impl Default for FrameHead {
    fn default() -> Self {
        Self {
            fin: true,
            opcode: Opcode::Text,
            masked: false,
            len: 0,
            mask: [0; 4],
        }
    }
}

/// Incremental frame decoder.
///
/// The parser always waits for an exact number of bytes (`needed`) before
/// moving to its next state. Input is copied into `buffer` only up to that
/// count; the remainder of a chunk is consumed by the following states
/// within the same [`feed`](Self::feed) call.
#[derive(Debug)]
pub struct HybiParser {
    expect: Expect,
    needed: usize,
    buffer: BytesMut,
    head: FrameHead,
    active_fragmented_operation: Option<Opcode>,
    fragments: BytesMut,
    max_message_size: usize,
}

impl HybiParser {
    /// Create a parser that rejects messages larger than `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            expect: Expect::Header,
            needed: 2,
            buffer: BytesMut::with_capacity(14),
            head: FrameHead::default(),
            active_fragmented_operation: None,
            fragments: BytesMut::new(),
            max_message_size,
        }
    }

    /// Number of bytes currently held for the pending expectation.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of bytes the pending expectation needs in total.
    pub fn needed(&self) -> usize {
        self.needed
    }

    /// Opcode of the fragmented message in progress, if any.
    pub fn active_fragmented_operation(&self) -> Option<Opcode> {
        self.active_fragmented_operation
    }

    /// Drop all partial state and wait for a new frame.
    fn reset(&mut self) {
        self.expect_bytes(Expect::Header, 2);
        self.head = FrameHead::default();
        self.active_fragmented_operation = None;
        self.fragments.clear();
    }

    /// Decode every complete frame in `data`.
    ///
    /// Packets are returned in wire order. A protocol error or a close frame
    /// resets the parser and discards the rest of the chunk.
    pub fn feed(&mut self, mut data: &[u8]) -> Vec<Packet> {
        let mut packets = Vec::new();
        loop {
            if self.buffer.len() == self.needed {
                let chunk = self.buffer.split();
                match self.advance(chunk) {
                    Ok(Some(packet)) => {
                        let closing = matches!(packet, Packet::Close(_));
                        packets.push(packet);
                        if closing {
                            self.reset();
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(reason) => {
                        packets.push(Packet::Error(reason));
                        self.reset();
                        break;
                    }
                }
                continue;
            }

            if data.is_empty() {
                break;
            }
            let take = (self.needed - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
        }
        packets
    }

    fn expect_bytes(&mut self, expect: Expect, needed: usize) {
        self.expect = expect;
        self.needed = needed;
        self.buffer.clear();
    }

    fn advance(&mut self, chunk: BytesMut) -> Result<Option<Packet>, String> {
        match self.expect {
            Expect::Header => self.on_header(&chunk).map(|()| None),
            Expect::Length16 => {
                let len = usize::from(u16::from_be_bytes([chunk[0], chunk[1]]));
                self.on_length(len).map(|()| None)
            }
            Expect::Length64 => {
                let mut chunk = chunk;
                let upper = chunk.get_u32();
                if upper != 0 {
                    return Err(
                        "packets with length spanning more than 32 bit is currently not supported"
                            .to_string(),
                    );
                }
                let len = usize::try_from(chunk.get_u32())
                    .map_err(|_| "frame length does not fit in memory".to_string())?;
                self.on_length(len).map(|()| None)
            }
            Expect::MaskKey => {
                self.head.mask.copy_from_slice(&chunk);
                self.expect_bytes(Expect::Payload, self.head.len);
                Ok(None)
            }
            Expect::Payload => {
                let mut payload = chunk;
                if self.head.masked {
                    apply_mask(&mut payload, self.head.mask);
                }
                self.expect_bytes(Expect::Header, 2);
                self.on_payload(payload)
            }
        }
    }

    fn on_header(&mut self, chunk: &[u8]) -> Result<(), String> {
        let (b0, b1) = (chunk[0], chunk[1]);

        if b0 & RSV_MASK != 0 {
            return Err("reserved fields must be empty".to_string());
        }
        let raw = b0 & 0x0F;
        let opcode = Opcode::from_u8(raw).ok_or_else(|| format!("no handler for opcode {raw}"))?;
        let fin = b0 & FIN != 0;

        if opcode.is_control() && !fin {
            return Err(match opcode {
                Opcode::Ping => "fragmented ping is not supported".to_string(),
                _ => "fragmented control frames are not supported".to_string(),
            });
        }
        match (opcode, self.active_fragmented_operation) {
            (Opcode::Continuation, None) => {
                return Err("continuation frame cannot follow current opcode".to_string());
            }
            (Opcode::Text | Opcode::Binary, Some(active)) => {
                return Err(format!(
                    "new {opcode:?} frame while a fragmented {active:?} message is in progress"
                ));
            }
            _ => {}
        }

        self.head = FrameHead {
            fin,
            opcode,
            masked: b1 & MASK_BIT != 0,
            len: 0,
            mask: [0; 4],
        };

        match b1 & 0x7F {
            LEN_16 => self.expect_bytes(Expect::Length16, 2),
            LEN_64 => self.expect_bytes(Expect::Length64, 8),
            len => return self.on_length(usize::from(len)),
        }
        Ok(())
    }

    fn on_length(&mut self, len: usize) -> Result<(), String> {
        if self.head.opcode.is_control() && len > MAX_INLINE_LEN {
            return Err(format!("control frame payload of {len} bytes is too large"));
        }
        if self.fragments.len().saturating_add(len) > self.max_message_size {
            return Err(format!(
                "message of {} bytes exceeds the maximum of {}",
                self.fragments.len().saturating_add(len),
                self.max_message_size
            ));
        }

        self.head.len = len;
        if self.head.masked {
            self.expect_bytes(Expect::MaskKey, 4);
        } else {
            self.expect_bytes(Expect::Payload, len);
        }
        Ok(())
    }

    fn on_payload(&mut self, payload: BytesMut) -> Result<Option<Packet>, String> {
        let head = self.head;
        match head.opcode {
            Opcode::Close => {
                let code = (payload.len() >= 2).then(|| u16::from_be_bytes([payload[0], payload[1]]));
                Ok(Some(Packet::Close(code)))
            }
            Opcode::Ping => Ok(Some(Packet::Ping(payload.freeze()))),
            Opcode::Pong => Ok(Some(Packet::Pong(payload.freeze()))),
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                let operation = match head.opcode {
                    Opcode::Continuation => self
                        .active_fragmented_operation
                        .ok_or_else(|| "continuation frame cannot follow current opcode".to_string())?,
                    op => op,
                };

                if !head.fin {
                    self.fragments.extend_from_slice(&payload);
                    self.active_fragmented_operation = Some(operation);
                    return Ok(None);
                }

                let message = if self.active_fragmented_operation.is_some() {
                    self.fragments.extend_from_slice(&payload);
                    self.active_fragmented_operation = None;
                    self.fragments.split().freeze()
                } else {
                    payload.freeze()
                };

                match operation {
                    Opcode::Binary => Ok(Some(Packet::Binary(message))),
                    _ => String::from_utf8(message.to_vec())
                        .map(|text| Some(Packet::Text(text)))
                        .map_err(|_| "invalid UTF-8 in text message".to_string()),
                }
            }
        }
    }
}
