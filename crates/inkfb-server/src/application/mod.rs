//! Application layer: the surface registry, the controller boundary, and the
//! per-connection session state machine.

pub mod controller;
pub mod registry;
pub mod session;
