//! Evdev input device emulation.
//!
//! Opens of configured device paths are answered with emulated queue fds;
//! ioctls on those fds answer the standard evdev capability queries from
//! the family table; a background thread drains the server connection,
//! translates surface-pixel input into each family's axis space, and fans
//! the resulting event sequences out to every queue of the class.

use std::ffi::CStr;

use inkfb_core::domain::family::{DeviceClass, FamilyProfile};
use inkfb_core::protocol::messages::UserInput;
use libc::{c_char, c_int, c_ulong};
use tracing::trace;

use crate::config::IdentitySets;
use crate::events::{
    self, AbsInfo, InputEvent, IoctlRequest, EVIOC_NR_ABS_BASE, EVIOC_NR_BIT_BASE, EVIOC_NR_NAME,
    EV_ABS, EV_KEY,
};
use crate::ident::DeviceIdentity;
use crate::interpose::Disposition;
use crate::queues::QueueGeneration;

/// The input layer of the shim world.
pub struct InputShim {
    profile: &'static FamilyProfile,
    identities: IdentitySets,
}

impl InputShim {
    pub fn new(profile: &'static FamilyProfile, identities: IdentitySets) -> Self {
        Self {
            profile,
            identities,
        }
    }

    /// Answers an open of a configured device path with a fresh queue fd.
    pub fn handle_open(
        &self,
        identity: Option<DeviceIdentity>,
        flags: c_int,
        queues: &QueueGeneration,
    ) -> Disposition {
        let Some(class) = identity.and_then(|ident| self.identities.class_of(ident)) else {
            return Disposition::NotApplicable;
        };
        match queues.open_queue(class, flags) {
            Ok(fd) => Disposition::Handled(fd),
            Err(_) => {
                // Out of descriptors; report the failure the way open would.
                unsafe { *libc::__errno_location() = libc::EMFILE };
                Disposition::Handled(-1)
            }
        }
    }

    pub fn handle_close(&self, fd: c_int, queues: &QueueGeneration) -> Disposition {
        if queues.close_queue(fd) {
            Disposition::Handled(0)
        } else {
            Disposition::NotApplicable
        }
    }

    /// Emulates the evdev ioctl surface on queue fds.
    ///
    /// Anything that is not a recognized capability query is accepted with
    /// a zero result; the queues have no real driver underneath to ask.
    pub fn handle_ioctl(
        &self,
        fd: c_int,
        request: c_ulong,
        arg: *mut c_char,
        queues: &QueueGeneration,
    ) -> Disposition {
        let Some(class) = queues.class_of(fd) else {
            return Disposition::NotApplicable;
        };
        let decoded = IoctlRequest::decompose(request);
        if arg.is_null() {
            return Disposition::Handled(0);
        }

        if decoded.is_evdev_read(EVIOC_NR_NAME) {
            copy_name(self.profile.device_name(class), arg, decoded.size);
            return Disposition::Handled(0);
        }

        if decoded.dir == events::IOC_READ
            && decoded.magic == events::EVDEV_MAGIC
            && decoded.nr >= EVIOC_NR_ABS_BASE
            && decoded.nr < EVIOC_NR_ABS_BASE + 0x40
        {
            let axis = decoded.nr - EVIOC_NR_ABS_BASE;
            let info = match class {
                DeviceClass::Touch => events::touch_absinfo(self.profile, axis),
                DeviceClass::Pen => events::pen_absinfo(self.profile, axis),
                DeviceClass::Buttons => None,
            };
            if let Some(info) = info {
                unsafe { *(arg as *mut AbsInfo) = info };
            }
            return Disposition::Handled(0);
        }

        if decoded.dir == events::IOC_READ && decoded.magic == events::EVDEV_MAGIC {
            let buf = unsafe { std::slice::from_raw_parts_mut(arg as *mut u8, decoded.size) };
            if decoded.nr == EVIOC_NR_BIT_BASE {
                let bits = match class {
                    DeviceClass::Touch => events::TOUCH_TYPE_BITS,
                    DeviceClass::Pen => events::PEN_TYPE_BITS,
                    DeviceClass::Buttons => events::BUTTONS_TYPE_BITS,
                };
                events::fill_type_bits(bits, buf);
                return Disposition::Handled(0);
            }
            if decoded.nr == EVIOC_NR_BIT_BASE + u32::from(EV_ABS) {
                let bits = match class {
                    DeviceClass::Touch => events::TOUCH_ABS_BITS,
                    DeviceClass::Pen => events::PEN_ABS_BITS,
                    DeviceClass::Buttons => &[][..],
                };
                events::fill_type_bits(bits, buf);
                return Disposition::Handled(0);
            }
            if decoded.nr == EVIOC_NR_BIT_BASE + u32::from(EV_KEY) {
                let bits = match class {
                    DeviceClass::Touch => &[][..],
                    DeviceClass::Pen => events::PEN_KEY_BITS,
                    DeviceClass::Buttons => events::BUTTONS_KEY_BITS,
                };
                events::fill_type_bits(bits, buf);
                return Disposition::Handled(0);
            }
        }

        Disposition::Handled(0)
    }

    /// Translates one protocol input into its evdev sequence and delivers
    /// it through the generation chain.
    pub fn dispatch(
        &self,
        input: UserInput,
        width: i32,
        height: i32,
        queues: &QueueGeneration,
    ) {
        let (class, sequence) = translate(self.profile, input, width, height);
        if sequence.is_empty() {
            return;
        }
        trace!(?class, kind = ?input.kind, x = input.x, y = input.y, "dispatching input");
        queues.push_to_class(class, &sequence);
    }
}

/// Pure translation step: protocol input to (class, event sequence).
pub fn translate(
    profile: &FamilyProfile,
    input: UserInput,
    width: i32,
    height: i32,
) -> (DeviceClass, Vec<InputEvent>) {
    let class = input.kind.class();
    let sequence = match class {
        DeviceClass::Touch => {
            let (x, y) = profile.touch_point(input.x, input.y, width, height);
            events::touch_sequence(input.kind, x, y)
        }
        DeviceClass::Pen => {
            let (x, y) = profile.pen_point(input.x, input.y, width, height);
            let pressure = profile.pen_pressure(input.pressure);
            events::pen_sequence(input.kind, x, y, pressure)
        }
        DeviceClass::Buttons => events::button_sequence(input.kind, input.x),
    };
    (class, sequence)
}

fn copy_name(name: &str, arg: *mut c_char, size: usize) {
    if size == 0 {
        return;
    }
    let bytes = name.as_bytes();
    let n = bytes.len().min(size - 1);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), arg as *mut u8, n);
        *arg.add(n) = 0;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ABS_MT_POSITION_X, ABS_X, BTN_TOOL_PEN};
    use crate::interpose::RealLibc;
    use inkfb_core::domain::family::DeviceFamily;
    use inkfb_core::protocol::messages::InputKind;
    use std::ffi::CString;

    fn touch_only_shim() -> (InputShim, QueueGeneration, DeviceIdentity) {
        let real = RealLibc::load();
        let c_path = CString::new("/dev/null").unwrap();
        let ident = DeviceIdentity::from_path(&real, &c_path).unwrap();
        let mut sets = IdentitySets::default();
        sets.touch.insert(ident);
        (
            InputShim::new(DeviceFamily::Gen1.profile(), sets),
            QueueGeneration::new(None),
            ident,
        )
    }

    fn ioc_read(nr: u32, size: usize) -> c_ulong {
        ((2u64 << 30) | ((size as u64) << 16) | ((b'E' as u64) << 8) | u64::from(nr)) as c_ulong
    }

    #[test]
    fn test_open_is_gated_on_configured_identities() {
        let (shim, queues, ident) = touch_only_shim();
        assert_eq!(shim.handle_open(None, 0, &queues), Disposition::NotApplicable);

        let disposition = shim.handle_open(Some(ident), 0, &queues);
        let Disposition::Handled(fd) = disposition else {
            panic!("expected a queue fd");
        };
        assert!(fd >= 0);
        assert_eq!(queues.class_of(fd), Some(DeviceClass::Touch));
        assert_eq!(shim.handle_close(fd, &queues), Disposition::Handled(0));
        assert_eq!(shim.handle_close(fd, &queues), Disposition::NotApplicable);
    }

    #[test]
    fn test_name_query_reports_the_family_device_name() {
        let (shim, queues, ident) = touch_only_shim();
        let Disposition::Handled(fd) = shim.handle_open(Some(ident), 0, &queues) else {
            panic!("expected a queue fd");
        };
        let mut name = [0u8; 32];
        shim.handle_ioctl(
            fd,
            ioc_read(EVIOC_NR_NAME, name.len()),
            name.as_mut_ptr() as *mut c_char,
            &queues,
        );
        let end = name.iter().position(|&b| b == 0).unwrap();
        assert_eq!(&name[..end], b"cyttsp5_mt");
    }

    #[test]
    fn test_absinfo_query_reports_touch_range() {
        let (shim, queues, ident) = touch_only_shim();
        let Disposition::Handled(fd) = shim.handle_open(Some(ident), 0, &queues) else {
            panic!("expected a queue fd");
        };
        let mut info = AbsInfo::default();
        shim.handle_ioctl(
            fd,
            ioc_read(
                EVIOC_NR_ABS_BASE + u32::from(ABS_MT_POSITION_X),
                std::mem::size_of::<AbsInfo>(),
            ),
            &mut info as *mut AbsInfo as *mut c_char,
            &queues,
        );
        assert_eq!(info.maximum, 767);
    }

    #[test]
    fn test_capability_bits_match_the_class() {
        let (shim, queues, ident) = touch_only_shim();
        let Disposition::Handled(fd) = shim.handle_open(Some(ident), 0, &queues) else {
            panic!("expected a queue fd");
        };
        let mut bits = [0u8; 48];
        shim.handle_ioctl(
            fd,
            ioc_read(EVIOC_NR_BIT_BASE + u32::from(EV_ABS), bits.len()),
            bits.as_mut_ptr() as *mut c_char,
            &queues,
        );
        assert!(events::bit_is_set(ABS_MT_POSITION_X, &bits));
        assert!(!events::bit_is_set(ABS_X, &bits));
    }

    #[test]
    fn test_translate_routes_pen_input_through_the_family_table() {
        let input = UserInput {
            kind: InputKind::PenUpdate,
            device_id: 0,
            x: 702,
            y: 936,
            pressure: 100,
        };
        let (class, seq) = translate(DeviceFamily::Gen1.profile(), input, 1404, 1872);
        assert_eq!(class, DeviceClass::Pen);
        assert_eq!(seq[0].code, BTN_TOOL_PEN);
        let abs_x = seq.iter().find(|e| e.kind == EV_ABS && e.code == ABS_X).unwrap();
        assert_eq!(abs_x.value, 10484);
    }

    #[test]
    fn test_foreign_fd_is_not_applicable() {
        let (shim, queues, _) = touch_only_shim();
        assert_eq!(
            shim.handle_ioctl(999, ioc_read(EVIOC_NR_NAME, 8), std::ptr::null_mut(), &queues),
            Disposition::NotApplicable
        );
    }
}
