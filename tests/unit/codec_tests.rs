//! Server output line framing.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use bedrock_warden::process::codec::{ServerLineCodec, MAX_LINE_BYTES};

#[test]
fn splits_lines_and_strips_carriage_returns() {
    let mut codec = ServerLineCodec::new();
    let mut buf = BytesMut::from("Starting Server\r\nVersion 1.16.201\npartial");

    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("Starting Server"));
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("Version 1.16.201"));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
    assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some("partial"));
    assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
}

#[test]
fn over_long_line_is_dropped_and_the_next_line_decodes() {
    let mut codec = ServerLineCodec::new();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&vec![b'x'; MAX_LINE_BYTES + 10]);
    buf.extend_from_slice(b"\nnext\n");

    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("next"));
    assert!(buf.is_empty());
}

#[test]
fn over_long_line_split_across_reads_is_dropped() {
    let mut codec = ServerLineCodec::new();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&vec![b'x'; MAX_LINE_BYTES + 1]);

    assert_eq!(codec.decode(&mut buf).unwrap(), None);
    assert!(buf.is_empty(), "oversized prefix is not buffered");

    buf.extend_from_slice(b"still the same line\nPlayer connected\n");
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("Player connected"));
}

#[test]
fn invalid_utf8_is_replaced_not_rejected() {
    let mut codec = ServerLineCodec::new();
    let mut buf = BytesMut::from(&b"Player \xff joined\r\n"[..]);

    assert_eq!(
        codec.decode(&mut buf).unwrap().as_deref(),
        Some("Player \u{fffd} joined")
    );
}
