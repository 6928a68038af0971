//! Binary codec for encoding and decoding inkfb protocol messages.
//!
//! Wire format:
//! ```text
//! [type:1][payload:fixed-per-type]
//! ```
//! All multi-byte integers are big-endian. Every message type has a fixed
//! payload size, so a whole message always fits in [`MAX_MESSAGE_SIZE`]
//! bytes and one seqpacket datagram carries exactly one message.
//!
//! The layout is spelled out byte by byte instead of mirroring an in-memory
//! struct, so a 32-bit armhf tablet and a 64-bit development host agree on
//! every offset.

use thiserror::Error;

use crate::protocol::messages::{
    ClientMessage, InputKind, MessageType, PixelFormat, ServerMessage, UserInput,
};

/// Upper bound on an encoded message, and the receive buffer size used by
/// every transport in the system.
pub const MAX_MESSAGE_SIZE: usize = 32;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The packet carried no bytes at all.
    #[error("empty packet")]
    EmptyPacket,

    /// The message type byte is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The pixel format byte is not a recognized value.
    #[error("unknown pixel format: {0}")]
    UnknownPixelFormat(u8),

    /// The input kind byte is not a recognized value.
    #[error("unknown input kind: 0x{0:02X}")]
    UnknownInputKind(u8),

    /// The packet is shorter than the fixed payload of its type.
    #[error("truncated {message:?}: need {needed} payload bytes, got {available}")]
    TruncatedMessage {
        message: MessageType,
        needed: usize,
        available: usize,
    },

    /// The packet is longer than the fixed payload of its type.
    #[error("trailing bytes after {message:?}: expected {expected} payload bytes, got {available}")]
    TrailingBytes {
        message: MessageType,
        expected: usize,
        available: usize,
    },
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes a [`ClientMessage`] into its fixed wire layout.
pub fn encode_client_message(msg: &ClientMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_MESSAGE_SIZE);
    buf.push(msg.message_type() as u8);
    match *msg {
        ClientMessage::Initialize { key, format } => {
            buf.extend_from_slice(&key.to_be_bytes());
            buf.push(format as u8);
        }
        ClientMessage::InitializeCustom {
            key,
            format,
            width,
            height,
        } => {
            buf.extend_from_slice(&key.to_be_bytes());
            buf.push(format as u8);
            buf.extend_from_slice(&width.to_be_bytes());
            buf.extend_from_slice(&height.to_be_bytes());
        }
        ClientMessage::UpdateAll | ClientMessage::Terminate => {}
        ClientMessage::UpdatePartial { x, y, w, h } => {
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
            buf.extend_from_slice(&w.to_be_bytes());
            buf.extend_from_slice(&h.to_be_bytes());
        }
    }
    buf
}

/// Encodes a [`ServerMessage`] into its fixed wire layout.
pub fn encode_server_message(msg: &ServerMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_MESSAGE_SIZE);
    buf.push(msg.message_type() as u8);
    match *msg {
        ServerMessage::InitOk { shm_id, shm_size } => {
            buf.extend_from_slice(&shm_id.to_be_bytes());
            buf.extend_from_slice(&shm_size.to_be_bytes());
        }
        ServerMessage::UserInput(input) => {
            buf.push(input.kind as u8);
            buf.push(input.device_id);
            buf.extend_from_slice(&input.x.to_be_bytes());
            buf.extend_from_slice(&input.y.to_be_bytes());
            buf.push(input.pressure);
        }
    }
    buf
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes one [`ClientMessage`] from a whole received packet.
pub fn decode_client_message(bytes: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let (ty, payload) = split_type(bytes)?;
    match ty {
        MessageType::Initialize => {
            let payload = exact_payload(ty, payload, 5)?;
            Ok(ClientMessage::Initialize {
                key: read_u32(payload, 0),
                format: pixel_format(payload[4])?,
            })
        }
        MessageType::InitializeCustom => {
            let payload = exact_payload(ty, payload, 9)?;
            Ok(ClientMessage::InitializeCustom {
                key: read_u32(payload, 0),
                format: pixel_format(payload[4])?,
                width: read_u16(payload, 5),
                height: read_u16(payload, 7),
            })
        }
        MessageType::UpdateAll => {
            exact_payload(ty, payload, 0)?;
            Ok(ClientMessage::UpdateAll)
        }
        MessageType::UpdatePartial => {
            let payload = exact_payload(ty, payload, 16)?;
            Ok(ClientMessage::UpdatePartial {
                x: read_i32(payload, 0),
                y: read_i32(payload, 4),
                w: read_i32(payload, 8),
                h: read_i32(payload, 12),
            })
        }
        MessageType::Terminate => {
            exact_payload(ty, payload, 0)?;
            Ok(ClientMessage::Terminate)
        }
        other => Err(ProtocolError::UnknownMessageType(other as u8)),
    }
}

/// Decodes one [`ServerMessage`] from a whole received packet.
pub fn decode_server_message(bytes: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let (ty, payload) = split_type(bytes)?;
    match ty {
        MessageType::InitOk => {
            let payload = exact_payload(ty, payload, 12)?;
            Ok(ServerMessage::InitOk {
                shm_id: read_i32(payload, 0),
                shm_size: read_u64(payload, 4),
            })
        }
        MessageType::UserInput => {
            let payload = exact_payload(ty, payload, 11)?;
            let kind = InputKind::try_from(payload[0])
                .map_err(|_| ProtocolError::UnknownInputKind(payload[0]))?;
            Ok(ServerMessage::UserInput(UserInput {
                kind,
                device_id: payload[1],
                x: read_i32(payload, 2),
                y: read_i32(payload, 6),
                pressure: payload[10],
            }))
        }
        other => Err(ProtocolError::UnknownMessageType(other as u8)),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn split_type(bytes: &[u8]) -> Result<(MessageType, &[u8]), ProtocolError> {
    let (&ty, payload) = bytes.split_first().ok_or(ProtocolError::EmptyPacket)?;
    let ty = MessageType::try_from(ty).map_err(|_| ProtocolError::UnknownMessageType(ty))?;
    Ok((ty, payload))
}

fn exact_payload(
    ty: MessageType,
    payload: &[u8],
    expected: usize,
) -> Result<&[u8], ProtocolError> {
    if payload.len() < expected {
        return Err(ProtocolError::TruncatedMessage {
            message: ty,
            needed: expected,
            available: payload.len(),
        });
    }
    if payload.len() > expected {
        return Err(ProtocolError::TrailingBytes {
            message: ty,
            expected,
            available: payload.len(),
        });
    }
    Ok(payload)
}

fn pixel_format(byte: u8) -> Result<PixelFormat, ProtocolError> {
    PixelFormat::try_from(byte).map_err(|_| ProtocolError::UnknownPixelFormat(byte))
}

fn read_u16(b: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([b[at], b[at + 1]])
}

fn read_u32(b: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn read_i32(b: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn read_u64(b: &[u8], at: usize) -> u64 {
    u64::from_be_bytes([
        b[at],
        b[at + 1],
        b[at + 2],
        b[at + 3],
        b[at + 4],
        b[at + 5],
        b[at + 6],
        b[at + 7],
    ])
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_layout_is_fixed_and_big_endian() {
        let bytes = encode_client_message(&ClientMessage::Initialize {
            key: 0x01020304,
            format: PixelFormat::Rgb888,
        });
        assert_eq!(bytes, vec![0x01, 0x01, 0x02, 0x03, 0x04, 0x01]);
    }

    #[test]
    fn test_update_all_encodes_to_type_byte_only() {
        assert_eq!(encode_client_message(&ClientMessage::UpdateAll), vec![0x03]);
    }

    #[test]
    fn test_every_encoded_message_fits_the_receive_buffer() {
        let msgs = [
            encode_client_message(&ClientMessage::InitializeCustom {
                key: u32::MAX,
                format: PixelFormat::Rgba8888,
                width: u16::MAX,
                height: u16::MAX,
            }),
            encode_client_message(&ClientMessage::UpdatePartial {
                x: i32::MIN,
                y: i32::MAX,
                w: i32::MAX,
                h: i32::MAX,
            }),
            encode_server_message(&ServerMessage::InitOk {
                shm_id: i32::MAX,
                shm_size: u64::MAX,
            }),
            encode_server_message(&ServerMessage::UserInput(UserInput {
                kind: InputKind::PenUpdate,
                device_id: 255,
                x: i32::MAX,
                y: i32::MIN,
                pressure: 100,
            })),
        ];
        for m in msgs {
            assert!(m.len() <= MAX_MESSAGE_SIZE);
        }
    }

    #[test]
    fn test_empty_packet_is_rejected() {
        assert_eq!(decode_client_message(&[]), Err(ProtocolError::EmptyPacket));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert_eq!(
            decode_client_message(&[0x7F]),
            Err(ProtocolError::UnknownMessageType(0x7F))
        );
    }

    #[test]
    fn test_server_type_on_client_channel_is_rejected() {
        let bytes = encode_server_message(&ServerMessage::InitOk {
            shm_id: 1,
            shm_size: 2,
        });
        assert_eq!(
            decode_client_message(&bytes),
            Err(ProtocolError::UnknownMessageType(0x81))
        );
    }

    #[test]
    fn test_truncated_initialize_is_rejected() {
        let err = decode_client_message(&[0x01, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedMessage { .. }));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bytes = encode_client_message(&ClientMessage::Terminate);
        bytes.push(0xAA);
        let err = decode_client_message(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::TrailingBytes { .. }));
    }

    #[test]
    fn test_unknown_pixel_format_is_rejected() {
        let bytes = [0x01, 0, 0, 0, 1, 9];
        assert_eq!(
            decode_client_message(&bytes),
            Err(ProtocolError::UnknownPixelFormat(9))
        );
    }

    #[test]
    fn test_unknown_input_kind_is_rejected() {
        let mut bytes = encode_server_message(&ServerMessage::UserInput(UserInput {
            kind: InputKind::TouchPress,
            device_id: 0,
            x: 0,
            y: 0,
            pressure: 0,
        }));
        bytes[1] = 0x99;
        assert_eq!(
            decode_server_message(&bytes),
            Err(ProtocolError::UnknownInputKind(0x99))
        );
    }
}
