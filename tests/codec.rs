//! Framing-layer tests for the newline-delimited JSON-RPC codec.

use bytes::BytesMut;
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder};

use lilith_mitm::core::errors::ProxyError;
use lilith_mitm::mcp::codec::JsonRpcCodec;

#[test]
fn decodes_a_single_request_line() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n"[..]);

    let decoded = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(decoded, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
    assert!(buf.is_empty());
}

#[test]
fn waits_for_a_complete_line() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"{\"jsonrpc\":\"2.0\","[..]);

    assert!(codec.decode(&mut buf).unwrap().is_none());

    buf.extend_from_slice(b"\"id\":1,\"method\":\"ping\"}\n");
    assert!(codec.decode(&mut buf).unwrap().is_some());
}

#[test]
fn decodes_multiple_messages_from_one_buffer() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(
        &b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"a\"}\n{\"jsonrpc\":\"2.0\",\"method\":\"b\"}\n"[..],
    );

    let first = codec.decode(&mut buf).unwrap().unwrap();
    let second = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(first["method"], "a");
    assert_eq!(second["method"], "b");
    assert!(codec.decode(&mut buf).unwrap().is_none());
}

#[test]
fn skips_blank_lines() {
    let mut codec = JsonRpcCodec::new();
    let mut buf =
        BytesMut::from(&b"\n   \n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n"[..]);

    let decoded = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(decoded["method"], "ping");
}

#[test]
fn tolerates_crlf_line_endings() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\r\n"[..]);

    assert!(codec.decode(&mut buf).unwrap().is_some());
}

#[test]
fn rejects_invalid_json() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"{nope}\n"[..]);

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProxyError::Decode(_)));
}

#[test]
fn rejects_non_jsonrpc_json() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"{\"hello\": \"world\"}\n"[..]);

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProxyError::Decode(_)));
}

#[test]
fn rejects_structured_ids() {
    let mut codec = JsonRpcCodec::new();
    let mut buf =
        BytesMut::from(&b"{\"jsonrpc\":\"2.0\",\"id\":[1,2],\"method\":\"tools/call\"}\n"[..]);

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProxyError::Decode(_)));
}

#[test]
fn rejects_malformed_error_members() {
    let mut codec = JsonRpcCodec::new();
    let mut buf =
        BytesMut::from(&b"{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":{\"anything\":true}}\n"[..]);

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProxyError::Decode(_)));
}

#[test]
fn rejects_wrong_jsonrpc_version() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"{\"jsonrpc\":\"1.0\",\"id\":1,\"method\":\"ping\"}\n"[..]);

    assert!(codec.decode(&mut buf).is_err());
}

#[test]
fn enforces_the_size_limit() {
    let mut codec = JsonRpcCodec::with_limit(64);
    let big = format!(
        "{{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"{}\"}}\n",
        "x".repeat(256)
    );
    let mut buf = BytesMut::from(big.as_bytes());

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProxyError::Decode(_)));
}

#[test]
fn size_limit_applies_to_unterminated_data() {
    let mut codec = JsonRpcCodec::with_limit(16);
    let mut buf = BytesMut::from(&b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"[..]);

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProxyError::Decode(_)));
}

#[test]
fn eof_mid_message_is_an_error() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::from(&b"{\"jsonrpc\":\"2.0\""[..]);

    let err = codec.decode_eof(&mut buf).unwrap_err();
    assert!(matches!(err, ProxyError::Decode(_)));
}

#[test]
fn eof_on_clean_boundary_is_none() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::new();
    assert!(codec.decode_eof(&mut buf).unwrap().is_none());
}

#[test]
fn encode_appends_a_newline() {
    let mut codec = JsonRpcCodec::new();
    let mut buf = BytesMut::new();
    let value = json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"});

    codec.encode(&value, &mut buf).unwrap();
    assert!(buf.ends_with(b"\n"));

    // What we encode, we can decode.
    let decoded = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn string_and_integer_ids_both_survive() {
    let mut codec = JsonRpcCodec::new();
    for value in [
        json!({"jsonrpc": "2.0", "id": 42, "method": "ping"}),
        json!({"jsonrpc": "2.0", "id": "abc-123", "method": "ping"}),
    ] {
        let mut buf = BytesMut::new();
        codec.encode(&value, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded["id"], value["id"]);
    }
}
