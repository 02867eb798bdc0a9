//! Unit tests for the NDJSON codec and inbound line classification.
//!
//! Covers:
//! - framing: single line, batched lines, partial delivery, blank lines,
//!   oversize lines and resynchronization, end of stream
//! - classification: response, notification, agent request, blank line
//! - reader task: EOF produces a single `Closed` frame

use bytes::BytesMut;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;

use agent_conductor::acp::codec::{AcpCodec, MAX_LINE_BYTES};
use agent_conductor::acp::reader::{parse_inbound_line, run_reader, Inbound};
use agent_conductor::AppError;

// ── Framing ─────────────────────────────────────────────────────────────────

/// A complete line is returned without its trailing newline.
#[test]
fn single_line_decodes_without_newline() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");

    let line = codec.decode(&mut buf).expect("decode must succeed");

    assert_eq!(
        line.as_deref(),
        Some("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}"),
        "codec must strip the newline"
    );
}

/// Two lines in one buffer come out as two items.
#[test]
fn batched_lines_decode_one_at_a_time() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("{\"a\":1}\n{\"b\":2}\n");

    let first = codec.decode(&mut buf).expect("first decode");
    let second = codec.decode(&mut buf).expect("second decode");
    let third = codec.decode(&mut buf).expect("third decode");

    assert_eq!(first.as_deref(), Some("{\"a\":1}"));
    assert_eq!(second.as_deref(), Some("{\"b\":2}"));
    assert!(third.is_none(), "buffer must be drained after two lines");
}

/// A line split across reads is buffered until its newline arrives.
#[test]
fn partial_line_waits_for_newline() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",");

    assert!(
        codec.decode(&mut buf).expect("partial decode").is_none(),
        "incomplete line must not be emitted"
    );

    buf.extend_from_slice(b"\"method\":\"x\"}\n");
    let line = codec.decode(&mut buf).expect("completed decode");
    assert_eq!(line.as_deref(), Some("{\"jsonrpc\":\"2.0\",\"method\":\"x\"}"));
}

/// A line longer than the limit is dropped and the next line decodes.
#[test]
fn oversize_line_is_skipped() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from(vec![b'x'; MAX_LINE_BYTES + 16].as_slice());
    buf.extend_from_slice(b"\n{\"ok\":true}\n");

    let line = codec.decode(&mut buf).expect("oversize line is not an error");

    assert_eq!(line.as_deref(), Some("{\"ok\":true}"));
}

/// Blank lines are dropped and a trailing carriage return is stripped.
#[test]
fn blank_lines_and_carriage_returns_are_dropped() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("\n  \r\n{\"a\":1}\r\n");

    let line = codec.decode(&mut buf).expect("decode");

    assert_eq!(line.as_deref(), Some("{\"a\":1}"));
    assert!(buf.is_empty());
}

/// An oversized line arriving in pieces is skipped up to its newline and
/// decoding resumes with the next message.
#[test]
fn oversize_line_resynchronizes_on_next_newline() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from(vec![b'x'; MAX_LINE_BYTES + 1].as_slice());

    assert!(codec.decode(&mut buf).expect("decode").is_none());
    assert!(buf.is_empty(), "oversized bytes are released");

    buf.extend_from_slice(b"xxxx tail of the long line\n{\"ok\":true}\n");
    let line = codec.decode(&mut buf).expect("decode after resync");
    assert_eq!(line.as_deref(), Some("{\"ok\":true}"));
}

/// A line that is not UTF-8 is dropped.
#[test]
fn invalid_utf8_line_is_skipped() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from(&b"\xff\xfe\n{\"a\":1}\n"[..]);

    let line = codec.decode(&mut buf).expect("decode");

    assert_eq!(line.as_deref(), Some("{\"a\":1}"));
}

/// An unterminated final line is still delivered at end of stream.
#[test]
fn final_line_without_newline_is_delivered_at_eof() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from("{\"last\":1}");

    assert!(codec.decode(&mut buf).expect("decode").is_none());
    let line = codec.decode_eof(&mut buf).expect("decode at eof");

    assert_eq!(line.as_deref(), Some("{\"last\":1}"));
}

/// Encoding appends exactly one newline.
#[test]
fn encode_appends_newline() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::new();

    codec
        .encode("{\"id\":1}".to_owned(), &mut buf)
        .expect("encode must succeed");

    assert_eq!(&buf[..], b"{\"id\":1}\n");
}

// ── Classification ──────────────────────────────────────────────────────────

/// A result envelope is a response keyed by its numeric id.
#[test]
fn result_envelope_is_response() {
    let frame = parse_inbound_line(r#"{"jsonrpc":"2.0","id":7,"result":{"sessionId":"s1"}}"#)
        .expect("parse")
        .expect("frame");

    assert_eq!(
        frame,
        Inbound::Response {
            id: 7,
            outcome: Ok(json!({ "sessionId": "s1" })),
        }
    );
}

/// An error envelope carries the agent's code and message.
#[test]
fn error_envelope_is_response_with_error() {
    let frame = parse_inbound_line(
        r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32000,"message":"no such session"}}"#,
    )
    .expect("parse")
    .expect("frame");

    let Inbound::Response { id, outcome } = frame else {
        panic!("expected a response frame");
    };
    assert_eq!(id, 3);
    let err = outcome.expect_err("outcome must be an error");
    assert_eq!(err.code, -32000);
    assert_eq!(err.message, "no such session");
}

/// A method without an id is a notification.
#[test]
fn method_without_id_is_notification() {
    let frame = parse_inbound_line(
        r#"{"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"s1"}}"#,
    )
    .expect("parse")
    .expect("frame");

    assert_eq!(
        frame,
        Inbound::Notification {
            method: "session/update".into(),
            params: json!({ "sessionId": "s1" }),
        }
    );
}

/// A method with an id is an agent request; string ids are kept verbatim.
#[test]
fn method_with_id_is_request() {
    let frame = parse_inbound_line(
        r#"{"jsonrpc":"2.0","id":"perm-1","method":"session/request_permission"}"#,
    )
    .expect("parse")
    .expect("frame");

    assert_eq!(
        frame,
        Inbound::Request {
            id: json!("perm-1"),
            method: "session/request_permission".into(),
            params: serde_json::Value::Null,
        }
    );
}

/// Blank lines produce no frame.
#[test]
fn blank_line_is_skipped() {
    assert!(parse_inbound_line("   ").expect("parse").is_none());
}

/// Invalid JSON is reported as a protocol error.
#[test]
fn malformed_json_is_error() {
    let err = parse_inbound_line("{not json").expect_err("must fail");
    assert!(matches!(err, AppError::Acp(_)), "got {err:?}");
}

// ── Reader task ─────────────────────────────────────────────────────────────

/// Frames are forwarded in order and EOF ends with a `Closed` frame.
#[tokio::test]
async fn reader_forwards_frames_then_reports_close() {
    let (mut agent, client) = tokio::io::duplex(4096);
    let (tx, mut rx) = mpsc::channel(8);
    let reader = tokio::spawn(run_reader(
        "test".into(),
        client,
        tx,
        CancellationToken::new(),
    ));

    agent
        .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\n\nnot json\n")
        .await
        .expect("write");
    drop(agent);

    let first = rx.recv().await.expect("first frame");
    assert!(
        matches!(first, Inbound::Notification { ref method, .. } if method == "ping"),
        "got {first:?}"
    );

    let second = rx.recv().await.expect("close frame");
    assert_eq!(
        second,
        Inbound::Closed {
            reason: "stream closed".into()
        },
        "malformed lines are skipped and EOF closes the stream"
    );

    reader.await.expect("join").expect("reader result");
}

/// An oversized line does not end the stream; later frames still arrive.
#[tokio::test]
async fn reader_survives_oversized_line() {
    let (mut agent, client) = tokio::io::duplex(64 * 1024);
    let (tx, mut rx) = mpsc::channel(8);
    let reader = tokio::spawn(run_reader(
        "test".into(),
        client,
        tx,
        CancellationToken::new(),
    ));

    let writer = tokio::spawn(async move {
        agent
            .write_all(&vec![b'x'; MAX_LINE_BYTES + 1])
            .await
            .expect("write oversized");
        agent
            .write_all(b"\n{\"jsonrpc\":\"2.0\",\"method\":\"after\"}\n")
            .await
            .expect("write frame");
    });

    let frame = rx.recv().await.expect("frame after oversized line");
    assert!(
        matches!(frame, Inbound::Notification { ref method, .. } if method == "after"),
        "got {frame:?}"
    );
    writer.await.expect("writer");
    assert_eq!(
        rx.recv().await.expect("close frame"),
        Inbound::Closed {
            reason: "stream closed".into()
        }
    );
    reader.await.expect("join").expect("reader result");
}
