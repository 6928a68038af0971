//! # inkfb-core
//!
//! Shared library for inkfb containing the wire protocol codec, the
//! length-prefixed notification framing, surface domain types, and the
//! device-family capability tables.
//!
//! This crate is used by the server, the backend client library, and the
//! device-interception shim. It has zero dependencies on OS APIs or sockets:
//! everything here is pure data and explicit byte layout, so the same code
//! serves a 32-bit armhf tablet and a 64-bit development host.

pub mod domain;
pub mod protocol;

pub use domain::family::{DeviceClass, DeviceFamily, FamilyProfile};
pub use domain::surface::{SurfaceKey, SurfaceSpec, DEFAULT_SURFACE_KEY, SOCKET_PATH};
pub use protocol::codec::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    ProtocolError, MAX_MESSAGE_SIZE,
};
pub use protocol::messages::{
    ClientMessage, InputKind, MessageType, PixelFormat, ServerMessage, UserInput,
};
