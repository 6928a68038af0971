//! All inkfb protocol message types.
//!
//! Messages are exchanged as whole units over a packet-oriented local
//! transport (SOCK_SEQPACKET): one `send` corresponds to exactly one
//! receivable unit, and the codec never reassembles partial messages.

use serde::{Deserialize, Serialize};

use crate::domain::surface::SurfaceKey;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes on the surface channel.
///
/// Client-to-server types occupy `0x01..=0x05`; server-to-client types have
/// the high bit set so a misdirected message is always an unknown type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client → server
    Initialize = 0x01,
    InitializeCustom = 0x02,
    UpdateAll = 0x03,
    UpdatePartial = 0x04,
    Terminate = 0x05,
    // Server → client
    InitOk = 0x81,
    UserInput = 0x82,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageType::Initialize),
            0x02 => Ok(MessageType::InitializeCustom),
            0x03 => Ok(MessageType::UpdateAll),
            0x04 => Ok(MessageType::UpdatePartial),
            0x05 => Ok(MessageType::Terminate),
            0x81 => Ok(MessageType::InitOk),
            0x82 => Ok(MessageType::UserInput),
            _ => Err(()),
        }
    }
}

// ── Pixel formats ─────────────────────────────────────────────────────────────

/// Raw pixel encoding of a shared surface.
///
/// Each format implies a bytes-per-pixel and a default resolution used when a
/// client initializes without an explicit size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PixelFormat {
    /// 16-bit RGB565, default 1404×1872 (first-generation panels).
    Rgb565 = 0,
    /// 24-bit RGB888, default 1620×2160.
    Rgb888 = 1,
    /// 32-bit RGBA8888, default 1620×2160.
    Rgba8888 = 2,
}

impl PixelFormat {
    /// Bytes occupied by one pixel in shared memory.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgba8888 => 4,
        }
    }

    /// Resolution assumed when an INITIALIZE carries no explicit size.
    pub fn default_resolution(self) -> (u16, u16) {
        match self {
            PixelFormat::Rgb565 => (1404, 1872),
            PixelFormat::Rgb888 | PixelFormat::Rgba8888 => (1620, 2160),
        }
    }
}

impl TryFrom<u8> for PixelFormat {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PixelFormat::Rgb565),
            1 => Ok(PixelFormat::Rgb888),
            2 => Ok(PixelFormat::Rgba8888),
            _ => Err(()),
        }
    }
}

// ── Input events ──────────────────────────────────────────────────────────────

/// Kind of a forwarded input event.
///
/// The high nibble selects the logical device class, so a whole class can be
/// matched with `kind.class()` while the low nibble carries the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum InputKind {
    TouchPress = 0x10,
    TouchRelease = 0x11,
    TouchUpdate = 0x12,
    PenPress = 0x20,
    PenRelease = 0x21,
    PenUpdate = 0x22,
    ButtonPress = 0x30,
    ButtonRelease = 0x31,
}

impl InputKind {
    /// The logical device class this event belongs to.
    pub fn class(self) -> crate::domain::family::DeviceClass {
        use crate::domain::family::DeviceClass;
        match (self as u8) & 0xF0 {
            0x10 => DeviceClass::Touch,
            0x20 => DeviceClass::Pen,
            _ => DeviceClass::Buttons,
        }
    }
}

impl TryFrom<u8> for InputKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(InputKind::TouchPress),
            0x11 => Ok(InputKind::TouchRelease),
            0x12 => Ok(InputKind::TouchUpdate),
            0x20 => Ok(InputKind::PenPress),
            0x21 => Ok(InputKind::PenRelease),
            0x22 => Ok(InputKind::PenUpdate),
            0x30 => Ok(InputKind::ButtonPress),
            0x31 => Ok(InputKind::ButtonRelease),
            _ => Err(()),
        }
    }
}

/// Hardware button identifier carried in the `x` field of button events.
pub mod button {
    pub const LEFT: i32 = 0;
    pub const RIGHT: i32 = 1;
    pub const HOME: i32 = 2;
}

/// A device-independent input event forwarded from the display collaborator.
///
/// `x`/`y` are surface pixel coordinates; `pressure` is a percentage
/// (0–100) that the shim maps into the active family's pressure range.
/// For button events `x` carries one of the [`button`] codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInput {
    pub kind: InputKind,
    pub device_id: u8,
    pub x: i32,
    pub y: i32,
    pub pressure: u8,
}

// ── Message bodies ────────────────────────────────────────────────────────────

/// Messages sent by a backend client to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// First message on a connection: attach to `key` at the format's
    /// default resolution.
    Initialize {
        key: SurfaceKey,
        format: PixelFormat,
    },
    /// First message on a connection: attach to `key` with an explicit size.
    InitializeCustom {
        key: SurfaceKey,
        format: PixelFormat,
        width: u16,
        height: u16,
    },
    /// The whole surface has been rewritten; repaint everything.
    UpdateAll,
    /// One rectangle of the surface has been rewritten.
    UpdatePartial { x: i32, y: i32, w: i32, h: i32 },
    /// Orderly close.
    Terminate,
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ClientMessage::Initialize { .. } => MessageType::Initialize,
            ClientMessage::InitializeCustom { .. } => MessageType::InitializeCustom,
            ClientMessage::UpdateAll => MessageType::UpdateAll,
            ClientMessage::UpdatePartial { .. } => MessageType::UpdatePartial,
            ClientMessage::Terminate => MessageType::Terminate,
        }
    }
}

/// Messages sent by the server to a backend client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Successful attach: the shared-memory object to map.
    InitOk { shm_id: i32, shm_size: u64 },
    /// Asynchronous, unsolicited input event.
    UserInput(UserInput),
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ServerMessage::InitOk { .. } => MessageType::InitOk,
            ServerMessage::UserInput(_) => MessageType::UserInput,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::family::DeviceClass;

    #[test]
    fn test_message_type_roundtrips_through_u8() {
        for ty in [
            MessageType::Initialize,
            MessageType::InitializeCustom,
            MessageType::UpdateAll,
            MessageType::UpdatePartial,
            MessageType::Terminate,
            MessageType::InitOk,
            MessageType::UserInput,
        ] {
            assert_eq!(MessageType::try_from(ty as u8), Ok(ty));
        }
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        assert!(MessageType::try_from(0x00).is_err());
        assert!(MessageType::try_from(0x42).is_err());
        assert!(MessageType::try_from(0xFF).is_err());
    }

    #[test]
    fn test_pixel_format_implies_bytes_per_pixel() {
        assert_eq!(PixelFormat::Rgb565.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Rgb888.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Rgba8888.bytes_per_pixel(), 4);
    }

    #[test]
    fn test_pixel_format_default_resolution() {
        assert_eq!(PixelFormat::Rgb565.default_resolution(), (1404, 1872));
        assert_eq!(PixelFormat::Rgb888.default_resolution(), (1620, 2160));
        assert_eq!(PixelFormat::Rgba8888.default_resolution(), (1620, 2160));
    }

    #[test]
    fn test_input_kind_high_nibble_selects_class() {
        assert_eq!(InputKind::TouchPress.class(), DeviceClass::Touch);
        assert_eq!(InputKind::TouchUpdate.class(), DeviceClass::Touch);
        assert_eq!(InputKind::PenRelease.class(), DeviceClass::Pen);
        assert_eq!(InputKind::ButtonPress.class(), DeviceClass::Buttons);
        assert_eq!(InputKind::ButtonRelease.class(), DeviceClass::Buttons);
    }
}
