//! LD_PRELOAD device-interception shim.
//!
//! Preloaded into an unmodified e-ink application, this library interposes
//! the libc file API and redirects the framebuffer, the input devices, and
//! the machine-model sysfs file onto an inkfb surface:
//!
//! - opening the framebuffer path yields the surface's shared memory,
//! - the e-ink update ioctls become protocol update messages,
//! - opening a known input device yields an emulated evdev queue fed from
//!   the server's forwarded user input,
//! - opening the model path yields a spoofed model string.
//!
//! Everything else passes through untouched.

pub mod config;
pub mod events;
pub mod fb;
pub mod ident;
pub mod input;
pub mod interpose;
pub mod model;
pub mod queues;
pub mod world;

use std::ffi::CStr;

use libc::{c_char, c_int, c_ulong};

use crate::config::MODEL_PATH;
use crate::ident::DeviceIdentity;
use crate::interpose::Disposition;
use crate::world::{enter, world, World};

fn shim_open(world: &'static World, path: *const c_char, flags: c_int) -> Disposition {
    if path.is_null() {
        return Disposition::NotApplicable;
    }
    let path = unsafe { CStr::from_ptr(path) };

    if world.config.shim_model && path.to_bytes() == MODEL_PATH.as_bytes() {
        if let Some(fd) = model::spoof_model_fd(world.config.family.profile().model) {
            return Disposition::Handled(fd);
        }
    }
    if let Some(fb) = &world.fb {
        if let Disposition::Handled(fd) = fb.handle_open(path) {
            return Disposition::Handled(fd);
        }
    }
    if let Some(input) = &world.input {
        let identity = DeviceIdentity::from_path(&world.real, path);
        if let Disposition::Handled(fd) = input.handle_open(identity, flags, &world.queues) {
            return Disposition::Handled(fd);
        }
    }
    Disposition::NotApplicable
}

fn shim_close(world: &'static World, fd: c_int) -> Disposition {
    if let Some(fb) = &world.fb {
        if let Disposition::Handled(rc) = fb.handle_close(fd) {
            return Disposition::Handled(rc);
        }
    }
    if let Some(input) = &world.input {
        if let Disposition::Handled(rc) = input.handle_close(fd, &world.queues) {
            return Disposition::Handled(rc);
        }
    }
    Disposition::NotApplicable
}

fn shim_ioctl(world: &'static World, fd: c_int, request: c_ulong, arg: *mut c_char) -> Disposition {
    if let Some(fb) = &world.fb {
        if let Disposition::Handled(rc) = fb.handle_ioctl(fd, request, arg, world) {
            return Disposition::Handled(rc);
        }
    }
    if let Some(input) = &world.input {
        if let Disposition::Handled(rc) = input.handle_ioctl(fd, request, arg, &world.queues) {
            return Disposition::Handled(rc);
        }
    }
    Disposition::NotApplicable
}

/// # Safety
/// Called by the dynamic linker in place of libc `open`; `path` follows the
/// libc contract.
#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
    match enter() {
        None => interpose::real_libc().open(path, flags, mode),
        Some(_guard) => {
            let world = world();
            match shim_open(world, path, flags) {
                Disposition::Handled(fd) => fd,
                Disposition::NotApplicable => world.real.open(path, flags, mode),
            }
        }
    }
}

/// # Safety
/// See [`open`].
#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
    match enter() {
        None => interpose::real_libc().open64(path, flags, mode),
        Some(_guard) => {
            let world = world();
            match shim_open(world, path, flags) {
                Disposition::Handled(fd) => fd,
                Disposition::NotApplicable => world.real.open64(path, flags, mode),
            }
        }
    }
}

/// # Safety
/// See [`open`].
#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: libc::mode_t,
) -> c_int {
    match enter() {
        None => interpose::real_libc().openat(dirfd, path, flags, mode),
        Some(_guard) => {
            let world = world();
            match shim_open(world, path, flags) {
                Disposition::Handled(fd) => fd,
                Disposition::NotApplicable => world.real.openat(dirfd, path, flags, mode),
            }
        }
    }
}

/// # Safety
/// Called in place of libc `fopen`; `path` and `mode` follow the libc
/// contract.
#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn fopen(path: *const c_char, mode: *const c_char) -> *mut libc::FILE {
    match enter() {
        None => interpose::real_libc().fopen(path, mode),
        Some(_guard) => {
            let world = world();
            match shim_open(world, path, 0) {
                Disposition::Handled(fd) => libc::fdopen(fd, mode),
                Disposition::NotApplicable => world.real.fopen(path, mode),
            }
        }
    }
}

/// # Safety
/// See [`fopen`].
#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn fopen64(path: *const c_char, mode: *const c_char) -> *mut libc::FILE {
    match enter() {
        None => interpose::real_libc().fopen64(path, mode),
        Some(_guard) => {
            let world = world();
            match shim_open(world, path, 0) {
                Disposition::Handled(fd) => libc::fdopen(fd, mode),
                Disposition::NotApplicable => world.real.fopen64(path, mode),
            }
        }
    }
}

/// # Safety
/// Called in place of libc `close`.
#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn close(fd: c_int) -> c_int {
    match enter() {
        None => interpose::real_libc().close(fd),
        Some(_guard) => {
            let world = world();
            match shim_close(world, fd) {
                Disposition::Handled(rc) => rc,
                Disposition::NotApplicable => world.real.close(fd),
            }
        }
    }
}

/// # Safety
/// Called in place of libc `ioctl`; `arg` points at the request-specific
/// payload, when the request carries one.
#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn ioctl(fd: c_int, request: c_ulong, arg: *mut c_char) -> c_int {
    match enter() {
        None => interpose::real_libc().ioctl(fd, request, arg),
        Some(_guard) => {
            let world = world();
            match shim_ioctl(world, fd, request, arg) {
                Disposition::Handled(rc) => rc,
                Disposition::NotApplicable => world.real.ioctl(fd, request, arg),
            }
        }
    }
}

/// # Safety
/// See [`ioctl`]. Interposed separately because time64-enabled builds route
/// through this symbol instead.
#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn __ioctl_time64(fd: c_int, request: c_ulong, arg: *mut c_char) -> c_int {
    match enter() {
        None => interpose::real_libc().ioctl_time64(fd, request, arg),
        Some(_guard) => {
            let world = world();
            match shim_ioctl(world, fd, request, arg) {
                Disposition::Handled(rc) => rc,
                Disposition::NotApplicable => world.real.ioctl_time64(fd, request, arg),
            }
        }
    }
}
