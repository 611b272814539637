//! Fixed-layout big-endian telemetry packets.
//!
//! | field     | bytes | detection                 | no detection |
//! |-----------|-------|---------------------------|--------------|
//! | header    | 1     | `0xAA`                    | `0xAA`       |
//! | msg type  | 1     | `0x01`                    | `0x02`       |
//! | timestamp | 8     | `u64` ms since epoch      | same         |
//! | tag id    | 1     | `u8`                      |              |
//! | position  | 12    | north, east, down `f32` m |              |
//! | rotation  | 12    | roll, pitch, yaw `f32` °  |              |

use std::time::{SystemTime, UNIX_EPOCH};

use landing_vision_core::PoseResult;
use serde::{Deserialize, Serialize};

pub const HEADER: u8 = 0xAA;
pub const MSG_DETECTION: u8 = 0x01;
pub const MSG_NO_DETECTION: u8 = 0x02;

pub const DETECTION_LEN: usize = 35;
pub const NO_DETECTION_LEN: usize = 10;

/// One decoded telemetry message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryPacket {
    Detection {
        timestamp_ms: u64,
        tag_id: u8,
        position: [f32; 3],
        rotation: [f32; 3],
    },
    NoDetection {
        timestamp_ms: u64,
    },
}

impl TelemetryPacket {
    pub fn timestamp_ms(&self) -> u64 {
        match *self {
            Self::Detection { timestamp_ms, .. } | Self::NoDetection { timestamp_ms } => {
                timestamp_ms
            }
        }
    }

    /// Serialize to the wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Detection {
                timestamp_ms,
                tag_id,
                position,
                rotation,
            } => {
                let mut out = Vec::with_capacity(DETECTION_LEN);
                out.push(HEADER);
                out.push(MSG_DETECTION);
                out.extend_from_slice(&timestamp_ms.to_be_bytes());
                out.push(*tag_id);
                for v in position.iter().chain(rotation) {
                    out.extend_from_slice(&v.to_be_bytes());
                }
                out
            }
            Self::NoDetection { timestamp_ms } => {
                let mut out = Vec::with_capacity(NO_DETECTION_LEN);
                out.push(HEADER);
                out.push(MSG_NO_DETECTION);
                out.extend_from_slice(&timestamp_ms.to_be_bytes());
                out
            }
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("marker id {0} does not fit the 1-byte id field")]
    IdOutOfRange(u32),
    #[error("{field}[{index}] = {value} is not representable as a finite f32")]
    NonFinite {
        field: &'static str,
        index: usize,
        value: f64,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet is empty")]
    Empty,
    #[error("bad header byte 0x{0:02X}")]
    BadHeader(u8),
    #[error("unknown message type 0x{0:02X}")]
    UnknownType(u8),
    #[error("message type 0x{msg_type:02X} needs {expected} bytes, got {actual}")]
    Length {
        msg_type: u8,
        expected: usize,
        actual: usize,
    },
}

/// Milliseconds since the Unix epoch, saturating at zero for clocks set
/// before 1970.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn to_f32(field: &'static str, values: &[f64; 3]) -> Result<[f32; 3], EncodingError> {
    let mut out = [0.0_f32; 3];
    for (index, (&value, slot)) in values.iter().zip(out.iter_mut()).enumerate() {
        let narrowed = value as f32;
        if !narrowed.is_finite() {
            return Err(EncodingError::NonFinite {
                field,
                index,
                value,
            });
        }
        *slot = narrowed;
    }
    Ok(out)
}

/// Encode a detection packet (35 bytes).
pub fn encode_detection(timestamp_ms: u64, pose: &PoseResult) -> Result<Vec<u8>, EncodingError> {
    let tag_id = u8::try_from(pose.id).map_err(|_| EncodingError::IdOutOfRange(pose.id))?;
    let packet = TelemetryPacket::Detection {
        timestamp_ms,
        tag_id,
        position: to_f32("position", &pose.position)?,
        rotation: to_f32("rotation", &pose.rotation)?,
    };
    Ok(packet.to_bytes())
}

/// Encode a no-detection packet (10 bytes).
pub fn encode_no_detection(timestamp_ms: u64) -> Vec<u8> {
    TelemetryPacket::NoDetection { timestamp_ms }.to_bytes()
}

fn expected_len(msg_type: u8) -> Result<usize, DecodeError> {
    match msg_type {
        MSG_DETECTION => Ok(DETECTION_LEN),
        MSG_NO_DETECTION => Ok(NO_DETECTION_LEN),
        other => Err(DecodeError::UnknownType(other)),
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

fn read_f32x3(bytes: &[u8]) -> [f32; 3] {
    let mut out = [0.0_f32; 3];
    for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(chunk);
        *slot = f32::from_be_bytes(buf);
    }
    out
}

/// Decode exactly one packet. The slice length must match the message type.
pub fn decode_packet(bytes: &[u8]) -> Result<TelemetryPacket, DecodeError> {
    let (&header, rest) = bytes.split_first().ok_or(DecodeError::Empty)?;
    if header != HEADER {
        return Err(DecodeError::BadHeader(header));
    }
    let msg_type = *rest.first().ok_or(DecodeError::Length {
        msg_type: 0,
        expected: NO_DETECTION_LEN,
        actual: bytes.len(),
    })?;
    let expected = expected_len(msg_type)?;
    if bytes.len() != expected {
        return Err(DecodeError::Length {
            msg_type,
            expected,
            actual: bytes.len(),
        });
    }

    let timestamp_ms = read_u64(&bytes[2..10]);
    Ok(match msg_type {
        MSG_DETECTION => TelemetryPacket::Detection {
            timestamp_ms,
            tag_id: bytes[10],
            position: read_f32x3(&bytes[11..23]),
            rotation: read_f32x3(&bytes[23..35]),
        },
        _ => TelemetryPacket::NoDetection { timestamp_ms },
    })
}

/// Split a concatenated byte stream (e.g. a capture file) into packets.
pub fn split_packets(mut bytes: &[u8]) -> Result<Vec<TelemetryPacket>, DecodeError> {
    let mut packets = Vec::new();
    while !bytes.is_empty() {
        if bytes[0] != HEADER {
            return Err(DecodeError::BadHeader(bytes[0]));
        }
        let Some(&msg_type) = bytes.get(1) else {
            return Err(DecodeError::Length {
                msg_type: 0,
                expected: NO_DETECTION_LEN,
                actual: bytes.len(),
            });
        };
        let len = expected_len(msg_type)?;
        if bytes.len() < len {
            return Err(DecodeError::Length {
                msg_type,
                expected: len,
                actual: bytes.len(),
            });
        }
        packets.push(decode_packet(&bytes[..len])?);
        bytes = &bytes[len..];
    }
    Ok(packets)
}
