//! Integration tests for the wire header/message framing, run against the
//! public crate API rather than its internal `#[cfg(test)]` module.

use serde::{Deserialize, Serialize};
use synqx_protocol::{Header, Message, OpCode, ProtocolError, PROTOCOL_VERSION};

#[test]
fn all_opcodes_round_trip_through_u8() {
    let opcodes = [
        OpCode::Identify,
        OpCode::Dispatch,
        OpCode::Abort,
        OpCode::Heartbeat,
        OpCode::Progress,
        OpCode::Conclude,
        OpCode::Err,
        OpCode::Reload,
    ];

    for opcode in opcodes {
        let value = opcode as u8;
        assert_eq!(OpCode::from_u8(value).unwrap(), opcode);
    }
}

#[test]
fn header_is_sixteen_bytes_big_endian() {
    let header = Header::new(OpCode::Dispatch, 0x1234_5678_9ABC_DEF0, 0x1234_5678);
    let packed = header.pack();

    assert_eq!(packed.len(), 16);
    assert_eq!(packed[0], PROTOCOL_VERSION);
    assert_eq!(packed[1], OpCode::Dispatch as u8);
    assert_eq!(&packed[4..12], &0x1234_5678_9ABC_DEF0u64.to_be_bytes());
    assert_eq!(&packed[12..16], &0x1234_5678u32.to_be_bytes());
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct IdentifyPayload {
    capabilities: Vec<String>,
    agent_id: String,
}

#[test]
fn message_survives_encode_and_frame_round_trip() {
    let payload = IdentifyPayload {
        capabilities: vec!["postgres".to_string(), "s3".to_string()],
        agent_id: "rust-agent-001".to_string(),
    };

    let msg = Message::encode(OpCode::Identify, 42, &payload).unwrap();
    let (header_bytes, payload_bytes) = msg.to_frames();
    let decoded = Message::from_frames(&header_bytes, &payload_bytes).unwrap();

    assert_eq!(decoded.header.opcode, OpCode::Identify);
    assert_eq!(decoded.header.correlation_id, 42);

    let decoded_payload: IdentifyPayload = decoded.decode_body().unwrap();
    assert_eq!(decoded_payload, payload);
}

#[test]
fn from_frames_rejects_a_declared_length_the_frame_does_not_match() {
    let payload = IdentifyPayload {
        capabilities: vec![],
        agent_id: "a".to_string(),
    };
    let msg = Message::encode(OpCode::Identify, 1, &payload).unwrap();
    let (header_bytes, _) = msg.to_frames();

    let err = Message::from_frames(&header_bytes, b"short").unwrap_err();
    assert!(matches!(err, ProtocolError::PayloadLengthMismatch { .. }));
}
