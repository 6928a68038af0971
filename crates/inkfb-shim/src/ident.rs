//! Device-identity fingerprints.
//!
//! Path comparison is not enough to recognize a device: applications reach
//! the same hardware through `/dev/input/event0`, `/dev/input/by-path/…`
//! symlinks, or pre-opened descriptors. An identity folds what `fstat`
//! reports into one comparable word, so every route to a device resolves to
//! the same fingerprint.

use std::ffi::CStr;

use libc::c_int;

use crate::interpose::RealLibc;

/// A stable fingerprint for one file or device.
///
/// Character devices fingerprint by `rdev`, block devices by `rdev` with a
/// different marker, regular files by inode. The marker lives in bits 62–63;
/// any bits the base value carries up there are folded down first so two
/// classes can never collide on the marker alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(u64);

const MARKER_REGULAR: u64 = 0;
const MARKER_CHAR: u64 = 1;
const MARKER_BLOCK: u64 = 2;

impl DeviceIdentity {
    /// Fingerprints an open descriptor. `None` for a bad fd, a stat failure,
    /// or a file kind that has no stable identity (sockets, pipes).
    pub fn from_fd(fd: c_int) -> Option<Self> {
        if fd < 0 {
            return None;
        }
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } != 0 {
            return None;
        }
        let (base, marker) = match st.st_mode & libc::S_IFMT {
            libc::S_IFCHR => (st.st_rdev as u64, MARKER_CHAR),
            libc::S_IFBLK => (st.st_rdev as u64, MARKER_BLOCK),
            libc::S_IFREG => (st.st_ino as u64, MARKER_REGULAR),
            _ => return None,
        };
        Some(Self::fold(base, marker))
    }

    /// Fingerprints a path by briefly opening it through the real libc
    /// `open`, never the interposed one. Failure to open silently yields
    /// `None`: a path that cannot be resolved is simply not emulated.
    pub fn from_path(real: &RealLibc, path: &CStr) -> Option<Self> {
        let fd = real.open(path.as_ptr(), libc::O_RDONLY, 0);
        if fd < 0 {
            return None;
        }
        let identity = Self::from_fd(fd);
        real.close(fd);
        identity
    }

    fn fold(base: u64, marker: u64) -> Self {
        Self((base ^ ((base >> 62) & 0b11)) | (marker << 62))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
