//! Framebuffer device emulation.
//!
//! Opening the framebuffer path hands the application the surface's
//! shared-memory descriptor itself, so a subsequent `mmap` lands directly on
//! the server-owned pixels with no copying. The ioctl surface covers what
//! e-ink applications actually call: the standard screeninfo queries and the
//! vendor update-trigger requests.

use std::ffi::CStr;

use inkfb_core::domain::surface::SurfaceSpec;
use inkfb_core::protocol::messages::PixelFormat;
use libc::{c_char, c_int, c_ulong};
use tracing::warn;

use crate::config::FB_PATH;
use crate::interpose::Disposition;

// Standard framebuffer ioctls.
pub const FBIOGET_VSCREENINFO: c_ulong = 0x4600;
pub const FBIOPUT_VSCREENINFO: c_ulong = 0x4601;
pub const FBIOGET_FSCREENINFO: c_ulong = 0x4602;

// Vendor e-ink controller ioctls, as issued by the stock applications.
pub const VENDOR_SET_AUTO_UPDATE_MODE: c_ulong = 0x4048_462D;
pub const VENDOR_SEND_UPDATE: c_ulong = 0x4048_462E;
pub const VENDOR_WAIT_FOR_UPDATE_COMPLETE: c_ulong = 0x4048_462F;

/// Head of the vendor update payload; the remaining fields carry waveform
/// hints the emulation has no use for.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UpdateRegion {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Bitfield {
    pub offset: u32,
    pub length: u32,
    pub msb_right: u32,
}

/// `struct fb_var_screeninfo` from the kernel ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VarScreeninfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub xoffset: u32,
    pub yoffset: u32,
    pub bits_per_pixel: u32,
    pub grayscale: u32,
    pub red: Bitfield,
    pub green: Bitfield,
    pub blue: Bitfield,
    pub transp: Bitfield,
    pub nonstd: u32,
    pub activate: u32,
    pub height: u32,
    pub width: u32,
    pub accel_flags: u32,
    pub pixclock: u32,
    pub left_margin: u32,
    pub right_margin: u32,
    pub upper_margin: u32,
    pub lower_margin: u32,
    pub hsync_len: u32,
    pub vsync_len: u32,
    pub sync: u32,
    pub vmode: u32,
    pub rotate: u32,
    pub colorspace: u32,
    pub reserved: [u32; 4],
}

/// `struct fb_fix_screeninfo` from the kernel ABI.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FixScreeninfo {
    pub id: [u8; 16],
    pub smem_start: libc::c_ulong,
    pub smem_len: u32,
    pub fb_type: u32,
    pub type_aux: u32,
    pub visual: u32,
    pub xpanstep: u16,
    pub ypanstep: u16,
    pub ywrapstep: u16,
    pub line_length: u32,
    pub mmio_start: libc::c_ulong,
    pub mmio_len: u32,
    pub accel: u32,
    pub capabilities: u16,
    pub reserved: [u16; 2],
}

impl Default for FixScreeninfo {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

/// Where update triggers go. The shim world forwards them to the client
/// connection; tests record them.
pub trait UpdateSink {
    fn complete_update(&self);
    fn partial_update(&self, x: i32, y: i32, w: i32, h: i32);
}

/// Fills the variable screen info for a surface geometry.
pub fn fill_var_screeninfo(info: &mut VarScreeninfo, spec: SurfaceSpec) {
    *info = VarScreeninfo {
        xres: spec.width,
        yres: spec.height,
        xres_virtual: spec.width,
        yres_virtual: spec.height,
        bits_per_pixel: 8 * spec.format.bytes_per_pixel() as u32,
        grayscale: 0,
        ..VarScreeninfo::default()
    };
    let (red, green, blue, transp) = match spec.format {
        PixelFormat::Rgb565 => ((11, 5), (5, 6), (0, 5), (0, 0)),
        PixelFormat::Rgb888 => ((16, 8), (8, 8), (0, 8), (0, 0)),
        PixelFormat::Rgba8888 => ((0, 8), (8, 8), (16, 8), (24, 8)),
    };
    info.red = bitfield(red);
    info.green = bitfield(green);
    info.blue = bitfield(blue);
    info.transp = bitfield(transp);
}

/// Fills the fixed screen info for a mapped surface.
pub fn fill_fix_screeninfo(info: &mut FixScreeninfo, base: usize, len: usize, spec: SurfaceSpec) {
    *info = FixScreeninfo::default();
    let id = b"inkfb\0";
    info.id[..id.len()].copy_from_slice(id);
    info.smem_start = base as libc::c_ulong;
    info.smem_len = len as u32;
    info.line_length = spec.stride() as u32;
}

fn bitfield((offset, length): (u32, u32)) -> Bitfield {
    Bitfield {
        offset,
        length,
        msb_right: 0,
    }
}

/// The framebuffer layer of the shim world.
pub struct FramebufferShim {
    shm_fd: c_int,
    base: usize,
    len: usize,
    spec: SurfaceSpec,
}

impl FramebufferShim {
    pub fn new(shm_fd: c_int, base: usize, len: usize, spec: SurfaceSpec) -> Self {
        Self {
            shm_fd,
            base,
            len,
            spec,
        }
    }

    pub fn handle_open(&self, path: &CStr) -> Disposition {
        if path.to_bytes() == FB_PATH.as_bytes() {
            Disposition::Handled(self.shm_fd)
        } else {
            Disposition::NotApplicable
        }
    }

    /// The surface descriptor must survive an application `close`: the shim
    /// still owns it. The close is swallowed.
    pub fn handle_close(&self, fd: c_int) -> Disposition {
        if fd == self.shm_fd {
            Disposition::Handled(0)
        } else {
            Disposition::NotApplicable
        }
    }

    pub fn handle_ioctl(
        &self,
        fd: c_int,
        request: c_ulong,
        arg: *mut c_char,
        updates: &dyn UpdateSink,
    ) -> Disposition {
        if fd != self.shm_fd {
            return Disposition::NotApplicable;
        }
        match request {
            VENDOR_SEND_UPDATE => {
                if arg.is_null() {
                    return Disposition::Handled(0);
                }
                let region = unsafe { *(arg as *const UpdateRegion) };
                if region.left == 0
                    && region.top == 0
                    && region.width == self.spec.width
                    && region.height == self.spec.height
                {
                    updates.complete_update();
                } else {
                    updates.partial_update(
                        region.left as i32,
                        region.top as i32,
                        region.width as i32,
                        region.height as i32,
                    );
                }
                Disposition::Handled(0)
            }
            VENDOR_SET_AUTO_UPDATE_MODE | VENDOR_WAIT_FOR_UPDATE_COMPLETE => {
                Disposition::Handled(0)
            }
            FBIOGET_VSCREENINFO => {
                if !arg.is_null() {
                    let info = unsafe { &mut *(arg as *mut VarScreeninfo) };
                    fill_var_screeninfo(info, self.spec);
                }
                Disposition::Handled(0)
            }
            FBIOPUT_VSCREENINFO => Disposition::Handled(0),
            FBIOGET_FSCREENINFO => {
                if !arg.is_null() {
                    let info = unsafe { &mut *(arg as *mut FixScreeninfo) };
                    fill_fix_screeninfo(info, self.base, self.len, self.spec);
                }
                Disposition::Handled(0)
            }
            other => {
                // The stock applications issue a handful of exotic panel
                // ioctls; accepting them is harmless, failing them is not.
                warn!("unhandled framebuffer ioctl {other:#x}");
                Disposition::Handled(0)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        partial: Mutex<Vec<(i32, i32, i32, i32)>>,
        complete: Mutex<usize>,
    }

    impl UpdateSink for RecordingSink {
        fn complete_update(&self) {
            *self.complete.lock().unwrap() += 1;
        }

        fn partial_update(&self, x: i32, y: i32, w: i32, h: i32) {
            self.partial.lock().unwrap().push((x, y, w, h));
        }
    }

    fn rgb565_shim() -> FramebufferShim {
        let spec = SurfaceSpec {
            format: PixelFormat::Rgb565,
            width: 1404,
            height: 1872,
        };
        FramebufferShim::new(7, 0x1000, spec.byte_size(), spec)
    }

    #[test]
    fn test_open_matches_only_the_fb_path() {
        let shim = rgb565_shim();
        let fb = std::ffi::CString::new(FB_PATH).unwrap();
        let other = std::ffi::CString::new("/dev/fb1").unwrap();
        assert_eq!(shim.handle_open(&fb), Disposition::Handled(7));
        assert_eq!(shim.handle_open(&other), Disposition::NotApplicable);
    }

    #[test]
    fn test_close_of_the_surface_fd_is_swallowed() {
        let shim = rgb565_shim();
        assert_eq!(shim.handle_close(7), Disposition::Handled(0));
        assert_eq!(shim.handle_close(8), Disposition::NotApplicable);
    }

    #[test]
    fn test_var_screeninfo_reports_geometry_and_rgb565_layout() {
        let shim = rgb565_shim();
        let sink = RecordingSink::default();
        let mut info = VarScreeninfo::default();
        let disposition = shim.handle_ioctl(
            7,
            FBIOGET_VSCREENINFO,
            &mut info as *mut VarScreeninfo as *mut c_char,
            &sink,
        );
        assert_eq!(disposition, Disposition::Handled(0));
        assert_eq!((info.xres, info.yres), (1404, 1872));
        assert_eq!(info.bits_per_pixel, 16);
        assert_eq!((info.red.offset, info.red.length), (11, 5));
        assert_eq!((info.green.offset, info.green.length), (5, 6));
        assert_eq!((info.blue.offset, info.blue.length), (0, 5));
    }

    #[test]
    fn test_fix_screeninfo_reports_mapping_and_stride() {
        let shim = rgb565_shim();
        let sink = RecordingSink::default();
        let mut info = FixScreeninfo::default();
        shim.handle_ioctl(
            7,
            FBIOGET_FSCREENINFO,
            &mut info as *mut FixScreeninfo as *mut c_char,
            &sink,
        );
        assert_eq!(info.smem_start, 0x1000);
        assert_eq!(info.smem_len, 1404 * 1872 * 2);
        assert_eq!(info.line_length, 1404 * 2);
        assert_eq!(&info.id[..6], b"inkfb\0");
    }

    #[test]
    fn test_vendor_update_becomes_a_partial_update() {
        let shim = rgb565_shim();
        let sink = RecordingSink::default();
        let mut region = UpdateRegion {
            top: 20,
            left: 10,
            width: 300,
            height: 400,
        };
        shim.handle_ioctl(
            7,
            VENDOR_SEND_UPDATE,
            &mut region as *mut UpdateRegion as *mut c_char,
            &sink,
        );
        assert_eq!(sink.partial.lock().unwrap().as_slice(), &[(10, 20, 300, 400)]);
        assert_eq!(*sink.complete.lock().unwrap(), 0);
    }

    #[test]
    fn test_full_surface_vendor_update_becomes_a_complete_update() {
        let shim = rgb565_shim();
        let sink = RecordingSink::default();
        let mut region = UpdateRegion {
            top: 0,
            left: 0,
            width: 1404,
            height: 1872,
        };
        shim.handle_ioctl(
            7,
            VENDOR_SEND_UPDATE,
            &mut region as *mut UpdateRegion as *mut c_char,
            &sink,
        );
        assert_eq!(*sink.complete.lock().unwrap(), 1);
        assert!(sink.partial.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_ioctl_on_the_surface_fd_is_accepted() {
        let shim = rgb565_shim();
        let sink = RecordingSink::default();
        assert_eq!(
            shim.handle_ioctl(7, 0xdead, std::ptr::null_mut(), &sink),
            Disposition::Handled(0)
        );
        // A foreign fd is left alone.
        assert_eq!(
            shim.handle_ioctl(9, FBIOGET_VSCREENINFO, std::ptr::null_mut(), &sink),
            Disposition::NotApplicable
        );
    }
}
