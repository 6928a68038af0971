//! inkfb-server library entry point.
//!
//! The server is a library first: a display-painting process embeds
//! [`application::registry::SurfaceRegistry`] and registers its controllers
//! against it, while the socket front end in [`server`] accepts backend
//! connections. `main.rs` wires the same pieces into a standalone binary.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;
pub mod server;

pub use application::controller::{DisplayController, RepaintRegion};
pub use application::registry::SurfaceRegistry;
pub use infrastructure::config::ServerConfig;
pub use server::Server;
