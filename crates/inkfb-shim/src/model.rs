//! Machine model spoofing.
//!
//! Applications sniff the hardware generation from a sysfs model string and
//! refuse to start on anything unexpected. When enabled, an open of the
//! model path is answered with an anonymous in-memory file pre-filled with
//! the emulated family's model string.

use std::ffi::CString;
use std::os::fd::RawFd;

use tracing::warn;

/// Builds a read-positioned memfd containing `model`. `None` when the
/// kernel refuses; the caller then falls through to the real file.
pub fn spoof_model_fd(model: &str) -> Option<RawFd> {
    let name = CString::new("model").ok()?;
    let fd = unsafe { libc::memfd_create(name.as_ptr(), 0) };
    if fd < 0 {
        warn!("memfd_create failed, model spoof disabled");
        return None;
    }
    let bytes = model.as_bytes();
    let written = unsafe {
        libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len())
    };
    if written != bytes.len() as isize {
        unsafe { libc::close(fd) };
        return None;
    }
    unsafe { libc::lseek(fd, 0, libc::SEEK_SET) };
    Some(fd)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spoofed_fd_reads_back_the_model_string() {
        let fd = spoof_model_fd("inkfb tablet 1.0").unwrap();
        let mut buf = [0u8; 64];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        assert_eq!(&buf[..n as usize], b"inkfb tablet 1.0");
        // Positioned at the start, reads to EOF afterwards.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        assert_eq!(n, 0);
        unsafe { libc::close(fd) };
    }
}
