//! Backend-side connection library.
//!
//! A backend renders into a shared-memory surface owned by the server; this
//! crate does the whole dance: connect, handshake, map, signal updates, poll
//! for input. The typical backend calls [`ClientConnection::establish`] once
//! at startup and then only touches [`ClientConnection::framebuffer`] and the
//! update calls from its render loop.

pub mod connection;

pub use connection::{surface_key_from_env, ClientConnection, ClientError};
