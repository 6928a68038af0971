//! Protocol module containing message types, the binary codec, and the
//! length-prefixed notification framing shared with the launcher channel.

pub mod codec;
pub mod framing;
pub mod messages;

pub use codec::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    ProtocolError, MAX_MESSAGE_SIZE,
};
pub use framing::{decode_frame, encode_frame, read_frame, Frame, FramingError};
pub use messages::*;
