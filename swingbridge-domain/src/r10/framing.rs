//! Link layer of the R10 interface characteristics.
//!
//! Outgoing: `len(u16 LE) | body | crc16(u16 LE)` is COBS encoded, wrapped in
//! zero delimiters and written in header-prefixed chunks. Incoming chunks are
//! stripped of the header and fed to a [`FrameAssembler`].

use thiserror::Error;

use crate::bytes::{read_u16_le, read_u32_le};
use crate::checksum::{append_checksum, checksum};
use crate::cobs::{self, CobsError};

pub const HANDSHAKE_OPEN: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0, 0];
pub const HANDSHAKE_REPLY_PREFIX: [u8; 12] = [0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0, 0];
pub const HANDSHAKE_CONTINUE: [u8; 1] = [0x00];

/// Payload bytes per characteristic write, excluding the header byte.
pub const CHUNK_SIZE: usize = 19;

const FRAME_OVERHEAD: usize = 4;
const ENVELOPE_LEN: usize = 16;
/// Longest COBS encoding of a frame whose length fits the u16 length field.
pub const MAX_ENCODED_FRAME: usize = u16::MAX as usize + u16::MAX as usize / 254 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    DeviceInfo,
    Config,
    ProtoResponse,
    ProtoRequest,
    Ack,
    Unknown([u8; 2]),
}

impl MessageType {
    pub fn from_bytes(bytes: [u8; 2]) -> MessageType {
        match bytes {
            [0xa0, 0x13] => MessageType::DeviceInfo,
            [0xba, 0x13] => MessageType::Config,
            [0xb4, 0x13] => MessageType::ProtoResponse,
            [0xb3, 0x13] => MessageType::ProtoRequest,
            [0x88, 0x13] => MessageType::Ack,
            other => MessageType::Unknown(other),
        }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        match self {
            MessageType::DeviceInfo => [0xa0, 0x13],
            MessageType::Config => [0xba, 0x13],
            MessageType::ProtoResponse => [0xb4, 0x13],
            MessageType::ProtoRequest => [0xb3, 0x13],
            MessageType::Ack => [0x88, 0x13],
            MessageType::Unknown(bytes) => bytes,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("cobs: {0}")]
    Cobs(#[from] CobsError),
    #[error("frame of {0} bytes is too short")]
    TooShort(usize),
    #[error("declared length {declared} but frame has {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: frame says {expected:#06x}, computed {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },
    #[error("protobuf envelope of {0} bytes is malformed")]
    Envelope(usize),
    #[error("no frame delimiter within {0} bytes")]
    Oversized(usize),
}

/// Builds `len | body | crc`, where len counts the whole frame.
pub fn build_frame(body: &[u8]) -> Vec<u8> {
    let len = (body.len() + FRAME_OVERHEAD) as u16;
    let mut frame = Vec::with_capacity(len as usize);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(body);
    append_checksum(&mut frame);
    frame
}

/// Validates length and checksum, returning the body.
pub fn parse_frame(frame: &[u8]) -> Result<&[u8], FrameError> {
    if frame.len() < FRAME_OVERHEAD {
        return Err(FrameError::TooShort(frame.len()));
    }
    let declared = usize::from(read_u16_le(frame, 0).ok_or(FrameError::TooShort(frame.len()))?);
    if declared != frame.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }
    let split = frame.len() - 2;
    let expected = read_u16_le(frame, split).ok_or(FrameError::TooShort(frame.len()))?;
    let actual = checksum(&frame[..split]);
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }
    Ok(&frame[2..split])
}

/// The bytes that go on the wire for `body`, delimiters included.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let mut wire = vec![0x00];
    wire.extend(cobs::encode(&build_frame(body)));
    wire.push(0x00);
    wire
}

pub fn chunk_writes(header: u8, wire: &[u8]) -> Vec<Vec<u8>> {
    wire.chunks(CHUNK_SIZE)
        .map(|chunk| {
            let mut write = Vec::with_capacity(chunk.len() + 1);
            write.push(header);
            write.extend_from_slice(chunk);
            write
        })
        .collect()
}

/// Reassembles zero-delimited frames across notifications.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    in_frame: bool,
    /// Skipping the rest of an oversized frame up to its delimiter.
    discarding: bool,
}

impl FrameAssembler {
    /// Feeds one notification payload (header already stripped) and returns
    /// the body of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Vec<u8>, FrameError>> {
        let mut completed = Vec::new();
        for &byte in chunk {
            if byte == 0x00 {
                if self.discarding {
                    self.reset();
                } else if self.in_frame && !self.buffer.is_empty() {
                    completed.push(self.finish());
                } else {
                    self.in_frame = true;
                    self.buffer.clear();
                }
            } else if !self.discarding {
                if self.buffer.len() >= MAX_ENCODED_FRAME {
                    completed.push(Err(FrameError::Oversized(self.buffer.len())));
                    self.buffer = Vec::new();
                    self.discarding = true;
                    continue;
                }
                self.in_frame = true;
                self.buffer.push(byte);
            }
        }
        completed
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_frame = false;
        self.discarding = false;
    }

    fn finish(&mut self) -> Result<Vec<u8>, FrameError> {
        let encoded = std::mem::take(&mut self.buffer);
        self.in_frame = false;
        let frame = cobs::decode(&encoded)?;
        parse_frame(&frame).map(<[u8]>::to_vec)
    }
}

/// A decoded `B313`/`B413` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoEnvelope {
    pub kind: MessageType,
    pub counter: u8,
    pub payload: Vec<u8>,
}

/// `type(2) | counter | 0x00 | reserved u32 | len u32 | len u32 | payload`
pub fn build_envelope(kind: MessageType, counter: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut body = Vec::with_capacity(ENVELOPE_LEN + payload.len());
    body.extend_from_slice(&kind.to_bytes());
    body.push(counter);
    body.push(0x00);
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(payload);
    body
}

pub fn parse_envelope(body: &[u8]) -> Result<ProtoEnvelope, FrameError> {
    let malformed = || FrameError::Envelope(body.len());
    if body.len() < ENVELOPE_LEN {
        return Err(malformed());
    }
    let len = read_u32_le(body, 8).ok_or_else(malformed)? as usize;
    let payload = body.get(ENVELOPE_LEN..ENVELOPE_LEN + len).ok_or_else(malformed)?;
    Ok(ProtoEnvelope {
        kind: MessageType::from_bytes([body[0], body[1]]),
        counter: body[2],
        payload: payload.to_vec(),
    })
}

/// `88 13 | acknowledged type | counter | 7 zero bytes`
pub fn build_ack(kind: MessageType, counter: u8) -> Vec<u8> {
    let mut body = MessageType::Ack.to_bytes().to_vec();
    body.extend_from_slice(&kind.to_bytes());
    body.push(counter);
    body.extend_from_slice(&[0u8; 7]);
    body
}
