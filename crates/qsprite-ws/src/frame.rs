//! Modern frame layout.
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| payload len |    extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |        (16 or 64 bits)        |
//! |N|V|V|V|       |S|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |     masking key (0 or 4 bytes)     |        payload ...       |
//! +------------------------------------+--------------------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// UTF-8 text.
    Text = 0x1,
    /// Binary data.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping.
    Ping = 0x9,
    /// Pong.
    Pong = 0xA,
}

impl Opcode {
    /// Parse an opcode from the low nibble of the first header byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Whether this is a control opcode (close, ping, pong).
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Get the raw opcode value.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// FIN bit.
pub const FIN: u8 = 0x80;
/// RSV1..RSV3 bits.
pub const RSV_MASK: u8 = 0x70;
/// MASK bit of the second header byte.
pub const MASK_BIT: u8 = 0x80;

/// Largest payload length encoded directly in the base header.
pub const MAX_INLINE_LEN: usize = 125;
/// Marker for a following 2-byte length.
pub const LEN_16: u8 = 126;
/// Marker for a following 8-byte length.
pub const LEN_64: u8 = 127;

/// Normal closure status code.
pub const CLOSE_NORMAL: u16 = 1000;

/// A single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Masking key, present on client-to-server frames.
    pub mask: Option<[u8; 4]>,
    /// Unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a final, unmasked frame.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Create a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text, Bytes::from(text.into()))
    }

    /// Create a binary frame.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, data)
    }

    /// Create a close frame carrying a status code.
    pub fn close(code: Option<u16>) -> Self {
        let payload = code.map_or_else(Bytes::new, |c| Bytes::copy_from_slice(&c.to_be_bytes()));
        Self::new(Opcode::Close, payload)
    }

    /// Set the FIN flag.
    #[must_use]
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Mask the frame with `key` when encoded.
    #[must_use]
    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    /// Size of the header for a payload of `len` bytes, without mask key.
    pub const fn header_len(len: usize) -> usize {
        if len <= MAX_INLINE_LEN {
            2
        } else if len <= u16::MAX as usize {
            4
        } else {
            10
        }
    }

    /// Append the wire encoding of this frame to `dst`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode_into(&self, dst: &mut BytesMut) {
        let len = self.payload.len();
        let mask_len = if self.mask.is_some() { 4 } else { 0 };
        dst.reserve(Self::header_len(len) + mask_len + len);

        let first = (if self.fin { FIN } else { 0 }) | self.opcode.as_u8();
        dst.put_u8(first);

        let mask_bit = if self.mask.is_some() { MASK_BIT } else { 0 };
        if len <= MAX_INLINE_LEN {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= u16::MAX as usize {
            dst.put_u8(mask_bit | LEN_16);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | LEN_64);
            dst.put_u64(len as u64);
        }

        match self.mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }
    }

    /// Encode this frame into a new buffer.
    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode_into(&mut dst);
        dst.freeze()
    }
}

/// XOR `payload` in place with the 4-byte masking key.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::from_u8(0x1), Some(Opcode::Text));
        assert_eq!(Opcode::from_u8(0xA), Some(Opcode::Pong));
        assert_eq!(Opcode::from_u8(0x3), None);
        assert_eq!(Opcode::from_u8(0xB), None);
        assert!(Opcode::Ping.is_control());
        assert!(!Opcode::Continuation.is_control());
    }

    #[test]
    fn test_header_len_classes() {
        assert_eq!(Frame::header_len(0), 2);
        assert_eq!(Frame::header_len(125), 2);
        assert_eq!(Frame::header_len(126), 4);
        assert_eq!(Frame::header_len(65535), 4);
        assert_eq!(Frame::header_len(65536), 10);
    }

    #[test]
    fn test_encode_small_text() {
        let bytes = Frame::text("Hello").encode();
        assert_eq!(&bytes[..], b"\x81\x05Hello");
    }

    #[test]
    fn test_encode_extended_16() {
        let bytes = Frame::binary(vec![0u8; 200]).encode();
        assert_eq!(bytes[0], 0x82);
        assert_eq!(bytes[1], 126);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 200);
        assert_eq!(bytes.len(), 4 + 200);
    }

    #[test]
    fn test_encode_extended_64() {
        let bytes = Frame::binary(vec![0u8; 70_000]).encode();
        assert_eq!(bytes[1], 127);
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[2..10]);
        assert_eq!(u64::from_be_bytes(len), 70_000);
        assert_eq!(bytes.len(), 10 + 70_000);
    }

    #[test]
    fn test_encode_masked() {
        // RFC 6455 section 5.7 sample: masked "Hello".
        let bytes = Frame::text("Hello").with_mask([0x37, 0xfa, 0x21, 0x3d]).encode();
        assert_eq!(
            &bytes[..],
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn test_close_frame_payload() {
        let frame = Frame::close(Some(CLOSE_NORMAL));
        assert_eq!(&frame.payload[..], &[0x03, 0xE8]);
        assert!(Frame::close(None).payload.is_empty());
    }

    #[test]
    fn test_apply_mask_is_involution() {
        let key = [1, 2, 3, 4];
        let mut data = b"some payload".to_vec();
        apply_mask(&mut data, key);
        assert_ne!(&data[..], b"some payload");
        apply_mask(&mut data, key);
        assert_eq!(&data[..], b"some payload");
    }
}
