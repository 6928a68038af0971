//! Domain types with no OS dependencies: surface geometry and the
//! device-family capability tables.

pub mod family;
pub mod surface;

pub use family::{DeviceClass, DeviceFamily, FamilyProfile};
pub use surface::{SurfaceKey, SurfaceSpec};
