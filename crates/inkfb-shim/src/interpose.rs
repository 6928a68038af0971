//! The interception seam.
//!
//! Every interposed libc symbol asks a chain of handlers whether the call is
//! theirs; a handler answers with a [`Disposition`]. `NotApplicable` falls
//! through to the real libc function, resolved once per process with
//! `dlsym(RTLD_NEXT, …)` via [`RealLibc`].

use std::ffi::CStr;
use std::sync::OnceLock;

use libc::{c_char, c_int, c_ulong, c_void};

/// Outcome of offering a libc call to one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The handler consumed the call; return this value to the application.
    Handled(c_int),
    /// Not this handler's file descriptor or path; try the next one.
    NotApplicable,
}

type OpenFn = unsafe extern "C" fn(*const c_char, c_int, libc::mode_t) -> c_int;
type OpenatFn = unsafe extern "C" fn(c_int, *const c_char, c_int, libc::mode_t) -> c_int;
type FopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut libc::FILE;
type CloseFn = unsafe extern "C" fn(c_int) -> c_int;
type IoctlFn = unsafe extern "C" fn(c_int, c_ulong, *mut c_char) -> c_int;

/// The real libc entry points underneath the interposed symbols.
///
/// Resolved lazily the first time the shim world is built. A symbol the
/// platform does not export stays `None` and its wrapper reports failure
/// instead of crashing.
#[derive(Clone, Copy)]
pub struct RealLibc {
    open: Option<OpenFn>,
    open64: Option<OpenFn>,
    openat: Option<OpenatFn>,
    fopen: Option<FopenFn>,
    fopen64: Option<FopenFn>,
    close: Option<CloseFn>,
    ioctl: Option<IoctlFn>,
    ioctl_time64: Option<IoctlFn>,
}

unsafe fn resolve<T>(name: &CStr) -> Option<T> {
    let raw: *mut c_void = libc::dlsym(libc::RTLD_NEXT, name.as_ptr());
    if raw.is_null() {
        return None;
    }
    // Function pointers and data pointers share a representation on every
    // platform dlsym exists on.
    Some(std::mem::transmute_copy(&raw))
}

impl RealLibc {
    pub fn load() -> Self {
        unsafe {
            Self {
                open: resolve(c"open"),
                open64: resolve(c"open64"),
                openat: resolve(c"openat"),
                fopen: resolve(c"fopen"),
                fopen64: resolve(c"fopen64"),
                close: resolve(c"close"),
                ioctl: resolve(c"ioctl"),
                ioctl_time64: resolve(c"__ioctl_time64"),
            }
        }
    }

    pub fn open(&self, path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
        match self.open {
            Some(f) => unsafe { f(path, flags, mode) },
            None => fail_enosys(),
        }
    }

    pub fn open64(&self, path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
        match self.open64 {
            Some(f) => unsafe { f(path, flags, mode) },
            None => self.open(path, flags, mode),
        }
    }

    pub fn openat(
        &self,
        dirfd: c_int,
        path: *const c_char,
        flags: c_int,
        mode: libc::mode_t,
    ) -> c_int {
        match self.openat {
            Some(f) => unsafe { f(dirfd, path, flags, mode) },
            None => fail_enosys(),
        }
    }

    pub fn fopen(&self, path: *const c_char, mode: *const c_char) -> *mut libc::FILE {
        match self.fopen {
            Some(f) => unsafe { f(path, mode) },
            None => std::ptr::null_mut(),
        }
    }

    pub fn fopen64(&self, path: *const c_char, mode: *const c_char) -> *mut libc::FILE {
        match self.fopen64 {
            Some(f) => unsafe { f(path, mode) },
            None => self.fopen(path, mode),
        }
    }

    pub fn close(&self, fd: c_int) -> c_int {
        match self.close {
            Some(f) => unsafe { f(fd) },
            None => fail_enosys(),
        }
    }

    pub fn ioctl(&self, fd: c_int, request: c_ulong, arg: *mut c_char) -> c_int {
        match self.ioctl {
            Some(f) => unsafe { f(fd, request, arg) },
            None => fail_enosys(),
        }
    }

    pub fn ioctl_time64(&self, fd: c_int, request: c_ulong, arg: *mut c_char) -> c_int {
        match self.ioctl_time64 {
            Some(f) => unsafe { f(fd, request, arg) },
            None => self.ioctl(fd, request, arg),
        }
    }
}

static REAL: OnceLock<RealLibc> = OnceLock::new();

/// The process-wide resolved table. Independent of the shim world, so the
/// pass-through path works even while the world is mid-construction.
pub fn real_libc() -> &'static RealLibc {
    REAL.get_or_init(RealLibc::load)
}

fn fail_enosys() -> c_int {
    unsafe {
        *libc::__errno_location() = libc::ENOSYS;
    }
    -1
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_real_open_and_close_resolve_and_work() {
        let real = RealLibc::load();
        let path = CString::new("/dev/null").unwrap();
        let fd = real.open(path.as_ptr(), libc::O_RDONLY, 0);
        assert!(fd >= 0);
        assert_eq!(real.close(fd), 0);
    }

    #[test]
    fn test_fopen_resolves() {
        let real = RealLibc::load();
        let path = CString::new("/dev/null").unwrap();
        let mode = CString::new("r").unwrap();
        let file = real.fopen(path.as_ptr(), mode.as_ptr());
        assert!(!file.is_null());
        unsafe { libc::fclose(file) };
    }
}
