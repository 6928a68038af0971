//! Evdev wire structures, constants, and event sequencing.
//!
//! The emulated devices speak the kernel input protocol: `input_event`
//! records through the queue pipes, `input_absinfo` and capability bitmaps
//! through ioctls. The sequences produced here mirror what the real drivers
//! emit, so consumers that parse evdev streams need no special cases.

use inkfb_core::domain::family::FamilyProfile;
use inkfb_core::protocol::messages::{button, InputKind};

// Event types
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;

pub const SYN_REPORT: u16 = 0;

// Key and button codes
pub const KEY_HOME: u16 = 102;
pub const KEY_LEFT: u16 = 105;
pub const KEY_RIGHT: u16 = 106;
pub const KEY_POWER: u16 = 116;
pub const KEY_WAKEUP: u16 = 143;
pub const BTN_TOOL_PEN: u16 = 0x140;
pub const BTN_TOOL_RUBBER: u16 = 0x141;
pub const BTN_TOUCH: u16 = 0x14a;
pub const BTN_STYLUS: u16 = 0x14b;
pub const BTN_STYLUS2: u16 = 0x14c;

// Absolute axes
pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_PRESSURE: u16 = 0x18;
pub const ABS_DISTANCE: u16 = 0x19;
pub const ABS_TILT_X: u16 = 0x1a;
pub const ABS_TILT_Y: u16 = 0x1b;
pub const ABS_MT_SLOT: u16 = 0x2f;
pub const ABS_MT_TOUCH_MAJOR: u16 = 0x30;
pub const ABS_MT_TOUCH_MINOR: u16 = 0x31;
pub const ABS_MT_ORIENTATION: u16 = 0x34;
pub const ABS_MT_POSITION_X: u16 = 0x35;
pub const ABS_MT_POSITION_Y: u16 = 0x36;
pub const ABS_MT_TOOL_TYPE: u16 = 0x37;
pub const ABS_MT_TRACKING_ID: u16 = 0x39;
pub const ABS_MT_PRESSURE: u16 = 0x3a;

/// The kernel `input_event` record, as read from an evdev fd.
// libc::timeval carries no trait derives, so neither does this.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct InputEvent {
    pub time: libc::timeval,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub fn now(kind: u16, code: u16, value: i32) -> Self {
        let mut time = libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        unsafe {
            libc::gettimeofday(&mut time, std::ptr::null_mut());
        }
        Self {
            time,
            kind,
            code,
            value,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        let len = std::mem::size_of::<Self>();
        unsafe { std::slice::from_raw_parts(self as *const Self as *const u8, len) }
    }
}

/// The kernel `input_absinfo` record, filled by EVIOCGABS emulation.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbsInfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

impl AbsInfo {
    pub fn range(maximum: i32, fuzz: i32) -> Self {
        Self {
            maximum,
            fuzz,
            ..Self::default()
        }
    }
}

// _IOC field layout shared by every evdev request.
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;

pub const IOC_READ: u32 = 2;

/// The evdev ioctl magic (`'E'`).
pub const EVDEV_MAGIC: u32 = b'E' as u32;

/// A decomposed ioctl request word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoctlRequest {
    pub dir: u32,
    pub magic: u32,
    pub nr: u32,
    pub size: usize,
}

impl IoctlRequest {
    pub fn decompose(request: libc::c_ulong) -> Self {
        let request = request as u32;
        Self {
            dir: (request >> IOC_DIRSHIFT) & 0x3,
            magic: (request >> IOC_TYPESHIFT) & 0xff,
            nr: (request >> IOC_NRSHIFT) & 0xff,
            size: ((request >> IOC_SIZESHIFT) & 0x3fff) as usize,
        }
    }

    /// True for a read of evdev request number `nr`, any size.
    pub fn is_evdev_read(&self, nr: u32) -> bool {
        self.dir == IOC_READ && self.magic == EVDEV_MAGIC && self.nr == nr
    }
}

// Evdev request numbers (the nr field).
pub const EVIOC_NR_NAME: u32 = 0x06;
pub const EVIOC_NR_BIT_BASE: u32 = 0x20;
pub const EVIOC_NR_ABS_BASE: u32 = 0x40;

/// Sets one capability bit in a caller-provided bitmap buffer.
///
/// The kernel hands these maps out as long words, but the copy is
/// byte-granular on little-endian, so byte addressing matches.
pub fn set_bit(bit: u16, buf: &mut [u8]) {
    let byte = usize::from(bit) / 8;
    if byte < buf.len() {
        buf[byte] |= 1 << (bit % 8);
    }
}

pub fn bit_is_set(bit: u16, buf: &[u8]) -> bool {
    let byte = usize::from(bit) / 8;
    byte < buf.len() && buf[byte] & (1 << (bit % 8)) != 0
}

/// Maps a protocol button code to its key code.
pub fn button_key(code: i32) -> Option<u16> {
    match code {
        button::LEFT => Some(KEY_LEFT),
        button::RIGHT => Some(KEY_RIGHT),
        button::HOME => Some(KEY_HOME),
        _ => None,
    }
}

/// The touchscreen event sequence for one protocol input.
///
/// Press opens slot 1 with a fixed tracking id and reports the contact;
/// update moves the contact without re-reporting BTN_TOUCH; release closes
/// the tracking id. Every sequence ends with a SYN_REPORT.
pub fn touch_sequence(kind: InputKind, x: i32, y: i32) -> Vec<InputEvent> {
    let mut seq = Vec::with_capacity(6);
    match kind {
        InputKind::TouchPress => {
            seq.push(InputEvent::now(EV_ABS, ABS_MT_SLOT, 1));
            seq.push(InputEvent::now(EV_ABS, ABS_MT_TRACKING_ID, 50));
            seq.push(InputEvent::now(EV_ABS, ABS_MT_POSITION_X, x));
            seq.push(InputEvent::now(EV_ABS, ABS_MT_POSITION_Y, y));
            seq.push(InputEvent::now(EV_KEY, BTN_TOUCH, 1));
        }
        InputKind::TouchUpdate => {
            seq.push(InputEvent::now(EV_ABS, ABS_MT_POSITION_X, x));
            seq.push(InputEvent::now(EV_ABS, ABS_MT_POSITION_Y, y));
        }
        InputKind::TouchRelease => {
            seq.push(InputEvent::now(EV_ABS, ABS_MT_TRACKING_ID, -1));
            seq.push(InputEvent::now(EV_KEY, BTN_TOUCH, 0));
        }
        _ => return seq,
    }
    seq.push(InputEvent::now(EV_SYN, SYN_REPORT, 0));
    seq
}

/// The digitizer event sequence for one protocol input.
pub fn pen_sequence(kind: InputKind, x: i32, y: i32, pressure: i32) -> Vec<InputEvent> {
    let mut seq = Vec::with_capacity(6);
    match kind {
        InputKind::PenPress => {
            seq.push(InputEvent::now(EV_KEY, BTN_TOOL_PEN, 1));
            seq.push(InputEvent::now(EV_KEY, BTN_TOUCH, 1));
        }
        InputKind::PenRelease => {
            seq.push(InputEvent::now(EV_KEY, BTN_TOOL_PEN, 1));
            seq.push(InputEvent::now(EV_KEY, BTN_TOUCH, 0));
        }
        InputKind::PenUpdate => {
            seq.push(InputEvent::now(EV_KEY, BTN_TOOL_PEN, 1));
        }
        _ => return seq,
    }
    seq.push(InputEvent::now(EV_ABS, ABS_X, x));
    seq.push(InputEvent::now(EV_ABS, ABS_Y, y));
    seq.push(InputEvent::now(EV_ABS, ABS_PRESSURE, pressure));
    seq.push(InputEvent::now(EV_SYN, SYN_REPORT, 0));
    seq
}

/// The hardware-button event sequence for one protocol input.
pub fn button_sequence(kind: InputKind, code: i32) -> Vec<InputEvent> {
    let Some(key) = button_key(code) else {
        return Vec::new();
    };
    let value = match kind {
        InputKind::ButtonPress => 1,
        InputKind::ButtonRelease => 0,
        _ => return Vec::new(),
    };
    vec![
        InputEvent::now(EV_KEY, key, value),
        InputEvent::now(EV_SYN, SYN_REPORT, 0),
    ]
}

/// Fills the EVIOCGABS reply for one axis, or reports the axis unknown.
pub fn touch_absinfo(profile: &FamilyProfile, axis: u32) -> Option<AbsInfo> {
    match axis as u16 {
        ABS_MT_POSITION_X => Some(AbsInfo::range(profile.touch_max_x, 100)),
        ABS_MT_POSITION_Y => Some(AbsInfo::range(profile.touch_max_y, 100)),
        ABS_MT_ORIENTATION => Some(AbsInfo {
            minimum: profile.orientation_min,
            maximum: profile.orientation_max,
            ..AbsInfo::default()
        }),
        ABS_MT_SLOT => Some(AbsInfo::range(profile.touch_slots, 0)),
        _ => None,
    }
}

pub fn pen_absinfo(profile: &FamilyProfile, axis: u32) -> Option<AbsInfo> {
    match axis as u16 {
        ABS_X => Some(AbsInfo::range(profile.pen_max_x, 0)),
        ABS_Y => Some(AbsInfo::range(profile.pen_max_y, 0)),
        ABS_PRESSURE => Some(AbsInfo::range(profile.pressure_max, 0)),
        _ => None,
    }
}

/// Fills the EVIOCGBIT(0) reply: which event types the device emits.
pub fn fill_type_bits(class_bits: &[u16], buf: &mut [u8]) {
    for &bit in class_bits {
        set_bit(bit, buf);
    }
}

pub const TOUCH_TYPE_BITS: &[u16] = &[EV_ABS, EV_REL];
pub const PEN_TYPE_BITS: &[u16] = &[EV_SYN, EV_KEY, EV_ABS];
pub const BUTTONS_TYPE_BITS: &[u16] = &[EV_SYN, EV_KEY];

pub const TOUCH_ABS_BITS: &[u16] = &[
    ABS_MT_POSITION_X,
    ABS_MT_POSITION_Y,
    ABS_MT_PRESSURE,
    ABS_MT_TOUCH_MAJOR,
    ABS_MT_TOUCH_MINOR,
    ABS_MT_ORIENTATION,
    ABS_MT_SLOT,
    ABS_MT_TOOL_TYPE,
    ABS_MT_TRACKING_ID,
];

pub const PEN_ABS_BITS: &[u16] = &[
    ABS_X,
    ABS_Y,
    ABS_PRESSURE,
    ABS_DISTANCE,
    ABS_TILT_X,
    ABS_TILT_Y,
];

pub const PEN_KEY_BITS: &[u16] = &[
    BTN_TOOL_PEN,
    BTN_TOOL_RUBBER,
    BTN_TOUCH,
    BTN_STYLUS,
    BTN_STYLUS2,
];

pub const BUTTONS_KEY_BITS: &[u16] = &[KEY_HOME, KEY_LEFT, KEY_RIGHT, KEY_WAKEUP, KEY_POWER];

// ── Tests ─────────────────────────────────────────────────────────────────────
