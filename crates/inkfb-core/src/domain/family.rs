//! Device-family capability tables.
//!
//! A *family* is a hardware generation profile: coordinate ranges of the
//! digitizer and touchscreen, pressure range, evdev device names, and the
//! default input device paths. Every family is one row in an explicit table
//! and all consumers go through [`FamilyProfile`].
//!
//! Coordinate translation lives here because it is pure integer arithmetic
//! shared by tests and the shim: the protocol carries surface pixels, the
//! synthesized devices speak each family's axis space.

use serde::{Deserialize, Serialize};

/// Logical class of an emulated input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Touch,
    Pen,
    Buttons,
}

/// Hardware generation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFamily {
    /// First generation: inverted touch axes, pen space rotated 90°.
    Gen1,
    /// Second generation color panel.
    Gen2,
    /// Compact second generation color panel.
    Gen2Mini,
}

impl DeviceFamily {
    /// The capability row for this family.
    pub fn profile(self) -> &'static FamilyProfile {
        match self {
            DeviceFamily::Gen1 => &GEN1,
            DeviceFamily::Gen2 => &GEN2,
            DeviceFamily::Gen2Mini => &GEN2_MINI,
        }
    }

    /// Parses the `INKFB_SHIM_INPUT_MODE` selector.
    pub fn from_selector(s: &str) -> Option<Self> {
        match s {
            "GEN1" => Some(DeviceFamily::Gen1),
            "GEN2" => Some(DeviceFamily::Gen2),
            "GEN2MINI" => Some(DeviceFamily::Gen2Mini),
            _ => None,
        }
    }
}

/// One row of the device-capability table.
#[derive(Debug)]
pub struct FamilyProfile {
    pub family: DeviceFamily,

    // Axis ranges
    pub touch_max_x: i32,
    pub touch_max_y: i32,
    pub pen_max_x: i32,
    pub pen_max_y: i32,
    pub pressure_max: i32,
    /// Touch axes count down from the maximum (origin mirrored).
    pub touch_inverted: bool,
    /// Pen space is rotated 90° against the display.
    pub pen_rotated: bool,

    // Evdev identity reported to capability queries
    pub touch_name: &'static str,
    pub pen_name: &'static str,
    pub buttons_name: &'static str,
    pub touch_slots: i32,
    pub orientation_min: i32,
    pub orientation_max: i32,

    /// Machine model string served by the model spoof.
    pub model: &'static str,

    // Default device paths, used when no identity override is configured
    pub pen_path: &'static str,
    pub touch_path: &'static str,
    pub buttons_path: &'static str,
}

static GEN1: FamilyProfile = FamilyProfile {
    family: DeviceFamily::Gen1,
    touch_max_x: 767,
    touch_max_y: 1023,
    pen_max_x: 20967,
    pen_max_y: 15725,
    pressure_max: 4095,
    touch_inverted: true,
    pen_rotated: true,
    touch_name: "cyttsp5_mt",
    pen_name: "Wacom I2C Digitizer",
    buttons_name: "gpio_buttons",
    touch_slots: 3,
    orientation_min: -127,
    orientation_max: 127,
    model: "inkfb tablet 1.0",
    pen_path: "/dev/input/event0",
    touch_path: "/dev/input/event1",
    buttons_path: "/dev/input/event2",
};

static GEN2: FamilyProfile = FamilyProfile {
    family: DeviceFamily::Gen2,
    touch_max_x: 2064,
    touch_max_y: 2832,
    pen_max_x: 11180,
    pen_max_y: 15340,
    pressure_max: 4096,
    touch_inverted: false,
    pen_rotated: false,
    touch_name: "cyttsp5_mt",
    pen_name: "Wacom I2C Digitizer",
    buttons_name: "gpio_buttons",
    touch_slots: 3,
    orientation_min: -127,
    orientation_max: 127,
    model: "inkfb tablet 2.0",
    pen_path: "/dev/input/event2",
    touch_path: "/dev/input/event3",
    buttons_path: "/dev/input/event1",
};

static GEN2_MINI: FamilyProfile = FamilyProfile {
    family: DeviceFamily::Gen2Mini,
    touch_max_x: 1248,
    touch_max_y: 2208,
    pen_max_x: 6760,
    pen_max_y: 11960,
    pressure_max: 4096,
    touch_inverted: false,
    pen_rotated: false,
    touch_name: "cyttsp5_mt",
    pen_name: "Wacom I2C Digitizer",
    buttons_name: "gpio_buttons",
    touch_slots: 3,
    orientation_min: -127,
    orientation_max: 127,
    model: "inkfb tablet 2.0 mini",
    pen_path: "/dev/input/event2",
    touch_path: "/dev/input/event3",
    buttons_path: "/dev/input/event1",
};

impl FamilyProfile {
    /// Translates a surface pixel into the family's touchscreen axis space.
    ///
    /// Integer arithmetic; deterministic for fixed inputs. For Gen1 on the
    /// default 1404×1872 surface, the midpoint (702, 936) maps to (384, 512).
    pub fn touch_point(&self, x: i32, y: i32, width: i32, height: i32) -> (i32, i32) {
        let sx = x * self.touch_max_x / width;
        let sy = y * self.touch_max_y / height;
        if self.touch_inverted {
            (self.touch_max_x - sx, self.touch_max_y - sy)
        } else {
            (sx, sy)
        }
    }

    /// Translates a surface pixel into the family's digitizer axis space.
    pub fn pen_point(&self, x: i32, y: i32, width: i32, height: i32) -> (i32, i32) {
        if self.pen_rotated {
            (
                self.pen_max_x - y * self.pen_max_x / height,
                x * self.pen_max_y / width,
            )
        } else {
            (x * self.pen_max_x / width, y * self.pen_max_y / height)
        }
    }

    /// Maps a pressure percentage (0–100) into the family's pressure range.
    pub fn pen_pressure(&self, percent: u8) -> i32 {
        i32::from(percent.min(100)) * self.pressure_max / 100
    }

    /// The device name reported for a class.
    pub fn device_name(&self, class: DeviceClass) -> &'static str {
        match class {
            DeviceClass::Touch => self.touch_name,
            DeviceClass::Pen => self.pen_name,
            DeviceClass::Buttons => self.buttons_name,
        }
    }

    /// The default device path for a class.
    pub fn device_path(&self, class: DeviceClass) -> &'static str {
        match class {
            DeviceClass::Touch => self.touch_path,
            DeviceClass::Pen => self.pen_path,
            DeviceClass::Buttons => self.buttons_path,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen1_touch_midpoint_matches_documented_value() {
        let p = DeviceFamily::Gen1.profile();
        assert_eq!(p.touch_point(702, 936, 1404, 1872), (384, 512));
    }

    #[test]
    fn test_gen1_touch_axes_are_inverted() {
        let p = DeviceFamily::Gen1.profile();
        assert_eq!(p.touch_point(0, 0, 1404, 1872), (767, 1023));
        assert_eq!(p.touch_point(1404, 1872, 1404, 1872), (0, 0));
    }

    #[test]
    fn test_gen1_pen_space_is_rotated() {
        let p = DeviceFamily::Gen1.profile();
        // The display origin lands at the digitizer's maximum x.
        assert_eq!(p.pen_point(0, 0, 1404, 1872), (20967, 0));
        // x advances along the digitizer's y axis.
        assert_eq!(p.pen_point(1404, 0, 1404, 1872), (20967, 15725));
        assert_eq!(p.pen_point(702, 936, 1404, 1872), (10484, 7862));
    }

    #[test]
    fn test_gen2_mapping_is_straight_scaling() {
        let p = DeviceFamily::Gen2.profile();
        assert_eq!(p.touch_point(810, 1080, 1620, 2160), (1032, 1416));
        assert_eq!(p.pen_point(810, 1080, 1620, 2160), (5590, 7670));
    }

    #[test]
    fn test_pressure_maps_percent_into_family_range() {
        assert_eq!(DeviceFamily::Gen1.profile().pen_pressure(0), 0);
        assert_eq!(DeviceFamily::Gen1.profile().pen_pressure(100), 4095);
        assert_eq!(DeviceFamily::Gen2.profile().pen_pressure(50), 2048);
        // Out-of-range percentages clamp instead of overshooting.
        assert_eq!(DeviceFamily::Gen2.profile().pen_pressure(200), 4096);
    }

    #[test]
    fn test_translation_is_deterministic() {
        let p = DeviceFamily::Gen2Mini.profile();
        let a = p.touch_point(301, 907, 954, 1696);
        let b = p.touch_point(301, 907, 954, 1696);
        assert_eq!(a, b);
    }

    #[test]
    fn test_family_selector_parsing() {
        assert_eq!(DeviceFamily::from_selector("GEN1"), Some(DeviceFamily::Gen1));
        assert_eq!(
            DeviceFamily::from_selector("GEN2MINI"),
            Some(DeviceFamily::Gen2Mini)
        );
        assert_eq!(DeviceFamily::from_selector("gen1"), None);
    }
}
