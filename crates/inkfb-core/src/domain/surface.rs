//! Surface geometry and shared-memory naming.

use serde::{Deserialize, Serialize};

use crate::protocol::messages::PixelFormat;

/// Integer identifying a logical display surface. Assigned out-of-band: the
/// launcher hands it to a backend process through `INKFB_KEY`.
pub type SurfaceKey = u32;

/// The surface key used when a backend is started without a launcher.
pub const DEFAULT_SURFACE_KEY: SurfaceKey = 245209899;

/// Well-known endpoint path of the framebuffer server.
pub const SOCKET_PATH: &str = "/tmp/inkfb.sock";

/// Deterministic POSIX shared-memory object name for an allocated id.
pub fn shm_name(shm_id: i32) -> String {
    format!("/inkfb_{shm_id}")
}

/// Immutable pixel geometry of a surface region.
///
/// Fixed at INITIALIZE time for the lifetime of the region; later attach
/// requests must match it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSpec {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

impl SurfaceSpec {
    /// A spec at the format's default resolution.
    pub fn with_default_resolution(format: PixelFormat) -> Self {
        let (width, height) = format.default_resolution();
        Self {
            format,
            width: u32::from(width),
            height: u32::from(height),
        }
    }

    /// Bytes per scanline.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Total byte size of the backing shared memory.
    pub fn byte_size(&self) -> usize {
        self.stride() * self.height as usize
    }

    /// The rectangle covering the whole surface.
    pub fn full_rect(&self) -> (i32, i32, i32, i32) {
        (0, 0, self.width as i32, self.height as i32)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolution_spec_sizes() {
        let spec = SurfaceSpec::with_default_resolution(PixelFormat::Rgb565);
        assert_eq!((spec.width, spec.height), (1404, 1872));
        assert_eq!(spec.stride(), 2808);
        assert_eq!(spec.byte_size(), 1404 * 1872 * 2);

        let spec = SurfaceSpec::with_default_resolution(PixelFormat::Rgba8888);
        assert_eq!(spec.byte_size(), 1620 * 2160 * 4);
    }

    #[test]
    fn test_shm_name_is_deterministic() {
        assert_eq!(shm_name(17), "/inkfb_17");
        assert_eq!(shm_name(17), shm_name(17));
    }

    #[test]
    fn test_full_rect_covers_surface() {
        let spec = SurfaceSpec {
            format: PixelFormat::Rgb888,
            width: 100,
            height: 50,
        };
        assert_eq!(spec.full_rect(), (0, 0, 100, 50));
    }
}
