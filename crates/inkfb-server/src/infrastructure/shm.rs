//! POSIX shared-memory surface regions.
//!
//! The server is the exclusive owner of every region's backing object:
//! backends only ever map the name the server hands out, and when a region
//! is destroyed the object is unlinked so a later INITIALIZE with the same
//! surface key produces a brand-new identity.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use inkfb_core::domain::surface::{shm_name, SurfaceSpec};
use thiserror::Error;
use tracing::debug;

/// Errors raised while allocating or mapping a region.
#[derive(Debug, Error)]
pub enum ShmError {
    #[error("shm_open({name}) failed: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("ftruncate to {size} bytes failed: {source}")]
    Truncate {
        size: usize,
        #[source]
        source: io::Error,
    },

    #[error("mmap of {size} bytes failed: {source}")]
    Map {
        size: usize,
        #[source]
        source: io::Error,
    },
}

/// A mapped shared-memory surface region owned by the server.
///
/// The mapping stays valid for the lifetime of this value; the painting
/// collaborator receives it behind an `Arc` and reads pixels through
/// [`ShmRegion::bytes`].
#[derive(Debug)]
pub struct ShmRegion {
    ptr: *mut u8,
    len: usize,
    shm_id: i32,
    spec: SurfaceSpec,
    _fd: OwnedFd,
}

// The raw pointer aliases a MAP_SHARED mapping. Backends write through their
// own mapping in a different address space; the single-writer discipline is
// a protocol property, not a memory-safety one.
unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl ShmRegion {
    /// Allocates a fresh region for `spec` under a random non-negative id.
    pub fn create(spec: SurfaceSpec) -> Result<Self, ShmError> {
        let shm_id = (rand::random::<u32>() & 0x7FFF_FFFF) as i32;
        let name = shm_name(shm_id);
        let size = spec.byte_size();
        let c_name = CString::new(name.clone()).expect("shm names contain no NUL");

        unsafe {
            // A stale object under this id (crashed previous instance)
            // would otherwise be resurrected with the wrong size.
            libc::shm_unlink(c_name.as_ptr());
        }
        let raw = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT,
                (libc::S_IRUSR | libc::S_IWUSR) as libc::c_uint,
            )
        };
        if raw < 0 {
            return Err(ShmError::Open {
                name,
                source: io::Error::last_os_error(),
            });
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        if unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(ShmError::Truncate { size, source: err });
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(ShmError::Map { size, source: err });
        }

        debug!(shm_id, size, "allocated surface region");
        Ok(Self {
            ptr: ptr as *mut u8,
            len: size,
            shm_id,
            spec,
            _fd: fd,
        })
    }

    /// The allocated shared-memory id, sent to clients in INIT_OK.
    pub fn shm_id(&self) -> i32 {
        self.shm_id
    }

    /// Total mapped byte size.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The immutable geometry this region was created with.
    pub fn spec(&self) -> SurfaceSpec {
        self.spec
    }

    /// Read view of the pixel bytes.
    ///
    /// A backend may be mid-write while this is read; a torn frame is a
    /// tolerable visual artifact, never a safety issue, because the reader
    /// and writer live in separate address spaces.
    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Base address of the mapping, reported in fixed screen info.
    pub fn base_ptr(&self) -> *const u8 {
        self.ptr
    }
}

impl AsRawFd for ShmRegion {
    fn as_raw_fd(&self) -> RawFd {
        self._fd.as_raw_fd()
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        let name = shm_name(self.shm_id);
        if let Ok(c_name) = CString::new(name) {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.len);
                libc::shm_unlink(c_name.as_ptr());
            }
        }
        debug!(shm_id = self.shm_id, "released surface region");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
