//! Length-prefixed framing shared with the application-notification channel.
//!
//! The launcher multiplexes textual notification messages between one backend
//! and N listening endpoints over a separate channel. That channel is outside
//! this repository, but it reuses this exact framing, and reserved negative
//! frame types carry system notifications on it:
//!
//! ```text
//! [type:i32][length:i32][payload:length bytes]
//! ```
//!
//! Both integers are big-endian. A declared length above
//! [`MAX_FRAME_PAYLOAD`] is a protocol violation and the caller must close
//! the connection.

use std::io::Read;

use thiserror::Error;

/// Largest accepted frame payload: 10 MiB.
pub const MAX_FRAME_PAYLOAD: usize = 10 * 1024 * 1024;

/// Reserved system frame types (coordinator lifecycle and forced close).
pub const SYSTEM_TERMINATE: i32 = -1;
pub const SYSTEM_NEW_COORDINATOR: i32 = -2;
pub const SYSTEM_LOST_COORDINATOR: i32 = -3;

/// Size of the frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Errors produced while framing or unframing notification messages.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The declared payload length exceeds [`MAX_FRAME_PAYLOAD`].
    #[error("frame payload of {0} bytes exceeds the 10 MiB limit")]
    Oversize(usize),

    /// The declared payload length is negative.
    #[error("negative frame payload length: {0}")]
    NegativeLength(i32),

    /// The buffer ends before the declared payload does.
    #[error("truncated frame: declared {declared} payload bytes, got {available}")]
    Truncated { declared: usize, available: usize },

    /// Reading from the underlying transport failed.
    #[error("frame read failed")]
    Io(#[from] std::io::Error),
}

/// One notification frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: i32,
    pub payload: Vec<u8>,
}

/// Encodes a frame as header + payload in one contiguous buffer.
pub fn encode_frame(frame_type: i32, payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(FramingError::Oversize(payload.len()));
    }
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&frame_type.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as i32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one frame from the beginning of `bytes`, returning it together
/// with the number of bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), FramingError> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(FramingError::Truncated {
            declared: FRAME_HEADER_SIZE,
            available: bytes.len(),
        });
    }
    let frame_type = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let declared = i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if declared < 0 {
        return Err(FramingError::NegativeLength(declared));
    }
    let declared = declared as usize;
    if declared > MAX_FRAME_PAYLOAD {
        return Err(FramingError::Oversize(declared));
    }
    let available = bytes.len() - FRAME_HEADER_SIZE;
    if available < declared {
        return Err(FramingError::Truncated {
            declared,
            available,
        });
    }
    let payload = bytes[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + declared].to_vec();
    Ok((
        Frame {
            frame_type,
            payload,
        },
        FRAME_HEADER_SIZE + declared,
    ))
}

/// Reads one whole frame from a stream transport.
pub fn read_frame(reader: &mut impl Read) -> Result<Frame, FramingError> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header)?;
    let frame_type = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let declared = i32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if declared < 0 {
        return Err(FramingError::NegativeLength(declared));
    }
    let declared = declared as usize;
    if declared > MAX_FRAME_PAYLOAD {
        return Err(FramingError::Oversize(declared));
    }
    let mut payload = vec![0u8; declared];
    reader.read_exact(&mut payload)?;
    Ok(Frame {
        frame_type,
        payload,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let bytes = encode_frame(SYSTEM_NEW_COORDINATOR, b"2").unwrap();
        let (frame, consumed) = decode_frame(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(frame.frame_type, SYSTEM_NEW_COORDINATOR);
        assert_eq!(frame.payload, b"2");
    }

    #[test]
    fn test_oversize_declared_length_is_a_violation() {
        let mut bytes = encode_frame(1, b"x").unwrap();
        bytes[4..8].copy_from_slice(&((MAX_FRAME_PAYLOAD as i32) + 1).to_be_bytes());
        assert!(matches!(
            decode_frame(&bytes),
            Err(FramingError::Oversize(_))
        ));
    }

    #[test]
    fn test_oversize_payload_refuses_to_encode() {
        let payload = vec![0u8; MAX_FRAME_PAYLOAD + 1];
        assert!(matches!(
            encode_frame(1, &payload),
            Err(FramingError::Oversize(_))
        ));
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let mut bytes = encode_frame(1, b"").unwrap();
        bytes[4..8].copy_from_slice(&(-5i32).to_be_bytes());
        assert!(matches!(
            decode_frame(&bytes),
            Err(FramingError::NegativeLength(-5))
        ));
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let bytes = encode_frame(7, b"hello").unwrap();
        assert!(matches!(
            decode_frame(&bytes[..bytes.len() - 2]),
            Err(FramingError::Truncated { .. })
        ));
    }

    #[test]
    fn test_read_frame_from_stream() {
        let bytes = encode_frame(SYSTEM_TERMINATE, b"close").unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        let frame = read_frame(&mut cursor).unwrap();
        assert_eq!(frame.frame_type, SYSTEM_TERMINATE);
        assert_eq!(frame.payload, b"close");
    }
}
