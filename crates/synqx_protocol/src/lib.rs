//! Wire protocol and canonical domain types shared between `synqx-controld`
//! and `synqx-agent`.
//!
//! The transport is ZeroMQ DEALER/ROUTER multipart messages. Each message is
//! exactly three frames: `[identity, header, body]` on the ROUTER side, or
//! `[header, body]` on the DEALER side (ZMQ strips the identity frame
//! automatically). `Header` is a fixed 16-byte binary preamble; `body` is a
//! JSON payload whose shape depends on `OpCode`.

pub mod defaults;
pub mod error;
pub mod http_types;
pub mod idempotency;
pub mod naming;
pub mod types;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{de::DeserializeOwned, Serialize};
use std::io::Cursor;

pub use error::{ProtocolError, Result};

/// Current wire protocol version. Bump on any breaking header or opcode
/// change; `Header::unpack` rejects mismatches outright rather than
/// attempting to interpret an unknown layout.
pub const PROTOCOL_VERSION: u8 = 1;

/// Hard ceiling on a single frame's payload, to keep a misbehaving peer from
/// forcing an unbounded allocation.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024 * 1024;

const HEADER_LEN: usize = 16;

/// Operation codes exchanged between the control plane and an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Agent -> control plane, first message on a fresh connection.
    Identify = 1,
    /// Control plane -> agent, assigns a pipeline-run/node to execute.
    Dispatch = 2,
    /// Control plane -> agent, requests cooperative cancellation of a job.
    Abort = 3,
    /// Agent -> control plane, periodic liveness signal.
    Heartbeat = 4,
    /// Agent -> control plane, streamed progress for a running job.
    Progress = 5,
    /// Agent -> control plane, terminal report for a job (success or
    /// failure; the JSON body disambiguates).
    Conclude = 6,
    /// Either direction: a protocol-level error unrelated to a specific job.
    Err = 7,
    /// Control plane -> agent, requests the agent re-read its registration
    /// (used after a group/tag update without a full reconnect).
    Reload = 8,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(OpCode::Identify),
            2 => Ok(OpCode::Dispatch),
            3 => Ok(OpCode::Abort),
            4 => Ok(OpCode::Heartbeat),
            5 => Ok(OpCode::Progress),
            6 => Ok(OpCode::Conclude),
            7 => Ok(OpCode::Err),
            8 => Ok(OpCode::Reload),
            other => Err(ProtocolError::InvalidOpCode(other)),
        }
    }
}

/// Fixed 16-byte binary header: `!BBHQI` (big-endian version, opcode,
/// reserved, correlation_id, payload_len).
///
/// `correlation_id` is a sender-assigned monotonic counter used to match a
/// `Dispatch` with its eventual `Progress`/`Conclude` frames on the wire; it
/// is NOT the domain `JobId` (a UUID doesn't fit in a u64). The JSON body
/// always carries the real `JobId` for anything that needs durable
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub opcode: OpCode,
    pub correlation_id: u64,
    pub payload_len: u32,
}

impl Header {
    pub fn new(opcode: OpCode, correlation_id: u64, payload_len: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            opcode,
            correlation_id,
            payload_len,
        }
    }

    pub fn pack(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            cursor.write_u8(self.version).expect("fixed-size buffer");
            cursor.write_u8(self.opcode as u8).expect("fixed-size buffer");
            cursor.write_u16::<BigEndian>(0).expect("fixed-size buffer");
            cursor
                .write_u64::<BigEndian>(self.correlation_id)
                .expect("fixed-size buffer");
            cursor
                .write_u32::<BigEndian>(self.payload_len)
                .expect("fixed-size buffer");
        }
        buf
    }

    pub fn unpack(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_LEN {
            return Err(ProtocolError::HeaderTooShort {
                expected: HEADER_LEN,
                got: bytes.len(),
            });
        }
        let mut cursor = Cursor::new(bytes);
        let version = cursor.read_u8()?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: version,
            });
        }
        let opcode = OpCode::from_u8(cursor.read_u8()?)?;
        let _reserved = cursor.read_u16::<BigEndian>()?;
        let correlation_id = cursor.read_u64::<BigEndian>()?;
        let payload_len = cursor.read_u32::<BigEndian>()?;
        Ok(Self {
            version,
            opcode,
            correlation_id,
            payload_len,
        })
    }
}

/// A fully decoded wire message: header plus raw JSON payload bytes.
#[derive(Debug, Clone)]
pub struct Message {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Message {
    /// Builds a message by serializing `body` to JSON and computing the
    /// header's `payload_len` from the result.
    pub fn encode<T: Serialize>(
        opcode: OpCode,
        correlation_id: u64,
        body: &T,
    ) -> Result<Self> {
        let payload = serde_json::to_vec(body)?;
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }
        let header = Header::new(opcode, correlation_id, payload.len() as u32);
        Ok(Self { header, payload })
    }

    /// Decodes the two ZMQ frames `[header_bytes, payload_bytes]` into a
    /// `Message`, validating that the header's declared length matches the
    /// frame actually received.
    pub fn from_frames(header_bytes: &[u8], payload_bytes: &[u8]) -> Result<Self> {
        let header = Header::unpack(header_bytes)?;
        if header.payload_len as usize != payload_bytes.len() {
            return Err(ProtocolError::PayloadLengthMismatch {
                expected: header.payload_len as usize,
                got: payload_bytes.len(),
            });
        }
        Ok(Self {
            header,
            payload: payload_bytes.to_vec(),
        })
    }

    /// Serializes this message into the two ZMQ frames a DEALER socket
    /// should send: `[header, payload]`.
    pub fn to_frames(&self) -> (Vec<u8>, Vec<u8>) {
        (self.header.pack().to_vec(), self.payload.clone())
    }

    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}
