//! Wire-level tests: frames, metadata and envelopes without sockets.

use std::time::Duration;

use bytes::Bytes;
use rpcwire::codec::{BinaryCodec, Codec, MsgPackCodec};
use rpcwire::envelope::{EnvelopeKind, Framing, RequestMessage, ResponseMessage};
use rpcwire::options::{ClientConfig, Multiplexed, RegisterConfig};
use rpcwire::protocol::{
    flags, kind, Frame, FrameBuffer, Status, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
use rpcwire::transport::{Request, Response};

/// A typed payload survives envelope, frame and fragmentation.
#[test]
fn test_request_with_msgpack_payload() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct TestPayload {
        id: i32,
        message: String,
    }

    let payload = TestPayload {
        id: 42,
        message: "Hello, world!".to_string(),
    };
    let request = Request::new("foo", "bar", "hello")
        .with_encoding("msgpack")
        .with_body(MsgPackCodec::encode(&payload).unwrap());

    let client = Framing::for_client(&ClientConfig::from_options(&[&Multiplexed]));
    let mut message = client.encode_request(request).unwrap();
    message.meta.path = "/rpc".to_string();
    message.meta.ttl = Some(Duration::from_millis(1500));
    let bytes = message.into_frame(12345, DEFAULT_MAX_PAYLOAD_SIZE).unwrap().to_vec();

    // Deliver one byte at a time.
    let mut buffer = FrameBuffer::new();
    let mut frames = Vec::new();
    for byte in &bytes {
        frames.extend(buffer.push(std::slice::from_ref(byte)).unwrap());
    }
    assert_eq!(frames.len(), 1);
    assert!(buffer.is_empty());

    let frame = frames.remove(0);
    assert_eq!(frame.request_id(), 12345);
    assert_eq!(frame.header.kind, kind::REQUEST);
    assert!(flags::has_flag(frame.flags(), flags::ENVELOPED));
    assert!(flags::has_flag(frame.flags(), flags::MULTIPLEXED));

    let message = RequestMessage::from_frame(frame).unwrap();
    assert_eq!(message.meta.path, "/rpc");
    assert_eq!(message.meta.ttl, Some(Duration::from_millis(1500)));

    let handler = Framing::for_handler(&RegisterConfig::default(), message.is_multiplexed());
    let request = handler.decode_request(message).unwrap();
    assert_eq!(request.caller, "foo");
    assert_eq!(request.encoding, "msgpack");

    let decoded: TestPayload = MsgPackCodec::decode(&request.body).unwrap();
    assert_eq!(decoded, payload);
}

/// Several responses in one read come out in order.
#[test]
fn test_multiple_frames_sequence() {
    let framing = Framing::for_client(&ClientConfig::default());
    let mut all_bytes = Vec::new();

    for i in 1u32..=5 {
        let response = Response::new(format!("message_{i}"));
        let message = framing.encode_response("bar", "hello", response).unwrap();
        all_bytes.extend(message.into_frame(i * 100, DEFAULT_MAX_PAYLOAD_SIZE).unwrap().to_vec());
    }

    let frames = FrameBuffer::new().push(&all_bytes).unwrap();
    assert_eq!(frames.len(), 5);

    for (i, frame) in frames.into_iter().enumerate() {
        assert_eq!(frame.request_id(), (i as u32 + 1) * 100);
        let message = ResponseMessage::from_frame(frame).unwrap();
        let response = framing.decode_response("bar", "hello", message).unwrap();
        assert_eq!(response.body, Bytes::from(format!("message_{}", i + 1)));
    }
}

/// Failure responses are never enveloped.
#[test]
fn test_failure_response_has_bare_body() {
    let message = ResponseMessage::failure(Status::Unavailable, "inbound at capacity");
    let frame = message.into_frame(9, DEFAULT_MAX_PAYLOAD_SIZE).unwrap();
    assert_eq!(frame.flags(), 0);
    assert!(frame.body.is_empty());
    assert_eq!(frame.size(), HEADER_SIZE + frame.meta.len());

    let message = ResponseMessage::from_frame(frame).unwrap();
    let err = Framing::for_client(&ClientConfig::default())
        .decode_response("bar", "hello", message)
        .unwrap_err();
    assert_eq!(err.to_string(), "inbound at capacity");
}

#[test]
fn test_cancel_frame_is_header_only() {
    let bytes = Frame::cancel(7).to_vec();
    assert_eq!(bytes.len(), HEADER_SIZE);

    let frames = FrameBuffer::new().push(&bytes).unwrap();
    assert_eq!(frames[0].header.kind, kind::CANCEL);
    assert_eq!(frames[0].request_id(), 7);
}

/// The binary envelope uses the strict versioned layout.
#[test]
fn test_binary_envelope_layout() {
    let framing = Framing::for_client(&ClientConfig::default());
    let message = framing
        .encode_request(Request::new("foo", "bar", "hello").with_body(&b"xy"[..]))
        .unwrap();

    let body = &message.body[..];
    assert_eq!(&body[0..4], &(0x8001_0000u32 | EnvelopeKind::Call as u32).to_be_bytes());
    assert_eq!(&body[4..8], &5i32.to_be_bytes());
    assert_eq!(&body[8..13], b"hello");
    assert_eq!(&body[13..17], &1i32.to_be_bytes());
    assert_eq!(&body[17..], b"xy");

    let envelope = BinaryCodec.decode_envelope(message.body).unwrap();
    assert_eq!(envelope.name, "hello");
}

#[test]
fn test_oversized_frame_is_rejected() {
    let frame = Frame::new(
        kind::REQUEST,
        0,
        1,
        Bytes::new(),
        Bytes::from(vec![0u8; 2048]),
    );
    let mut buffer = FrameBuffer::with_max_payload(1024);
    assert!(buffer.push(&frame.to_vec()).is_err());
}
