//! Property tests for the frame decoders.
//!
//! Both parsers must produce the same packets no matter how the inbound
//! byte stream is split into chunks.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use qsprite_ws::hybi::HybiParser;
use qsprite_ws::legacy::{self, LegacyParser};
use qsprite_ws::{Frame, Opcode, Packet};

const MAX: usize = 1024 * 1024;

fn ascii(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(b'a' + b % 26)).collect()
}

fn feed_in_chunks<F>(stream: &[u8], cuts: &[usize], mut feed: F) -> Vec<Packet>
where
    F: FnMut(&[u8]) -> Vec<Packet>,
{
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (stream.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut packets = Vec::new();
    let mut start = 0;
    for point in points.into_iter().chain(std::iter::once(stream.len())) {
        packets.extend(feed(&stream[start..point]));
        start = point;
    }
    packets
}

fn message_strategy() -> impl Strategy<Value = (bool, Vec<u8>, bool)> {
    (any::<bool>(), prop::collection::vec(any::<u8>(), 0..300), any::<bool>())
}

proptest! {
    #[test]
    fn hybi_chunking_is_transparent(
        messages in prop::collection::vec(message_strategy(), 1..8),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let mut stream = BytesMut::new();
        let mut expected = Vec::new();
        for (is_text, payload, fragmented) in &messages {
            let (opcode, packet) = if *is_text {
                let text = ascii(payload);
                (Opcode::Text, Packet::Text(text))
            } else {
                (Opcode::Binary, Packet::Binary(Bytes::from(payload.clone())))
            };
            let body = match &packet {
                Packet::Text(text) => Bytes::from(text.clone()),
                Packet::Binary(data) => data.clone(),
                _ => unreachable!(),
            };

            if *fragmented && body.len() > 1 {
                let mid = body.len() / 2;
                Frame::new(opcode, body.slice(..mid))
                    .with_fin(false)
                    .with_mask([1, 2, 3, 4])
                    .encode_into(&mut stream);
                Frame::new(Opcode::Ping, Bytes::from_static(b"p"))
                    .with_mask([9, 9, 9, 9])
                    .encode_into(&mut stream);
                expected.push(Packet::Ping(Bytes::from_static(b"p")));
                Frame::new(Opcode::Continuation, body.slice(mid..))
                    .with_mask([5, 6, 7, 8])
                    .encode_into(&mut stream);
            } else {
                Frame::new(opcode, body).with_mask([1, 2, 3, 4]).encode_into(&mut stream);
            }
            expected.push(packet);
        }

        let mut parser = HybiParser::new(MAX);
        let packets = feed_in_chunks(&stream, &cuts, |chunk| parser.feed(chunk));
        prop_assert_eq!(packets, expected);
        prop_assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn legacy_chunking_is_transparent(
        texts in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..8),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let mut stream = BytesMut::new();
        let mut expected = Vec::new();
        for raw in &texts {
            let text = ascii(raw);
            stream.extend_from_slice(&legacy::encode_text(&text));
            expected.push(Packet::Text(text));
        }

        let mut parser = LegacyParser::new(MAX);
        let packets = feed_in_chunks(&stream, &cuts, |chunk| parser.feed(chunk));
        prop_assert_eq!(packets, expected);
    }
}

#[test]
fn hybi_payload_lengths_roundtrip() {
    for len in [0usize, 10, 125, 126, 200, 65_535, 65_536, 70_000] {
        let payload = Bytes::from(vec![0x5Au8; len]);
        let frame = Frame::binary(payload.clone()).with_mask([0xA, 0xB, 0xC, 0xD]).encode();

        let mut parser = HybiParser::new(MAX);
        assert_eq!(parser.feed(&frame), vec![Packet::Binary(payload)], "length {len}");
    }
}

#[test]
fn hybi_oversized_message_is_an_error() {
    let frame = Frame::binary(vec![0u8; 2048]).with_mask([1, 1, 1, 1]).encode();
    let mut parser = HybiParser::new(1024);
    match parser.feed(&frame).as_slice() {
        [Packet::Error(reason)] => assert!(reason.contains("exceeds")),
        other => panic!("unexpected packets {other:?}"),
    }
}

#[test]
fn hybi_text_encoding_roundtrip() {
    let dialect = qsprite_ws::Dialect::Hybi(qsprite_ws::HybiVersion::Hybi17);
    for len in [0usize, 10, 200, 70_000] {
        let text: String = (0..len).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let wire = dialect.encode_text(&text);

        let mut decoder = dialect.decoder(MAX);
        assert_eq!(decoder.feed(&wire), vec![Packet::Text(text)], "length {len}");
    }
}
