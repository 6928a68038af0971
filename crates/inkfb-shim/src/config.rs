//! Environment-driven shim configuration.
//!
//! The shim is injected, not launched, so all of its configuration arrives
//! through environment variables set by whatever started the application:
//!
//! - `INKFB_KEY` — surface key to attach to (default: the shared default key)
//! - `INKFB_SHIM_MODE` — pixel format: `RGB565`, `RGB888`, `RGBA8888`
//! - `INKFB_SHIM_INPUT_MODE` — device family: `GEN1`, `GEN2`, `GEN2MINI`
//! - `INKFB_SHIM_FB` / `INKFB_SHIM_INPUT` / `INKFB_SHIM_MODEL` — `"1"`/`"0"`
//!   toggles for the three emulation layers (all default on)
//! - `INKFB_INPUT_PEN` / `INKFB_INPUT_TOUCH` / `INKFB_INPUT_BUTTONS` —
//!   comma-separated device path overrides; without them the family's
//!   default path table applies

use std::collections::HashSet;
use std::ffi::CString;

use inkfb_core::domain::family::{DeviceClass, DeviceFamily};
use inkfb_core::domain::surface::{SurfaceKey, DEFAULT_SURFACE_KEY};
use inkfb_core::protocol::messages::PixelFormat;
use tracing::{error, warn};

use crate::ident::DeviceIdentity;
use crate::interpose::RealLibc;

pub const KEY_ENV: &str = "INKFB_KEY";
pub const MODE_ENV: &str = "INKFB_SHIM_MODE";
pub const INPUT_MODE_ENV: &str = "INKFB_SHIM_INPUT_MODE";
pub const FB_TOGGLE_ENV: &str = "INKFB_SHIM_FB";
pub const INPUT_TOGGLE_ENV: &str = "INKFB_SHIM_INPUT";
pub const MODEL_TOGGLE_ENV: &str = "INKFB_SHIM_MODEL";
pub const PEN_PATHS_ENV: &str = "INKFB_INPUT_PEN";
pub const TOUCH_PATHS_ENV: &str = "INKFB_INPUT_TOUCH";
pub const BUTTONS_PATHS_ENV: &str = "INKFB_INPUT_BUTTONS";

/// Path of the emulated framebuffer device.
pub const FB_PATH: &str = "/dev/fb0";

/// Sysfs path of the machine model string.
pub const MODEL_PATH: &str = "/sys/devices/soc0/machine";

#[derive(Debug, Clone)]
pub struct ShimConfig {
    pub key: SurfaceKey,
    pub format: PixelFormat,
    pub family: DeviceFamily,
    pub shim_fb: bool,
    pub shim_input: bool,
    pub shim_model: bool,
    pub pen_paths: Vec<String>,
    pub touch_paths: Vec<String>,
    pub buttons_paths: Vec<String>,
}

impl ShimConfig {
    /// Reads the whole configuration from the environment.
    ///
    /// An unrecognized `INKFB_SHIM_MODE` aborts: silently rendering in the
    /// wrong pixel format would corrupt every frame.
    pub fn from_env() -> Self {
        let key = std::env::var(KEY_ENV)
            .ok()
            .and_then(|raw| parse_key(&raw))
            .unwrap_or(DEFAULT_SURFACE_KEY);

        let format = match std::env::var(MODE_ENV) {
            Err(_) => PixelFormat::Rgb565,
            Ok(raw) => match parse_format(&raw) {
                Some(format) => format,
                None => {
                    error!(mode = %raw, "unsupported {MODE_ENV}");
                    std::process::abort();
                }
            },
        };

        let family = match std::env::var(INPUT_MODE_ENV) {
            Err(_) => DeviceFamily::Gen1,
            Ok(raw) => match DeviceFamily::from_selector(&raw) {
                Some(family) => family,
                None => {
                    warn!(mode = %raw, "unknown {INPUT_MODE_ENV}, keeping GEN1");
                    DeviceFamily::Gen1
                }
            },
        };

        let profile = family.profile();
        Self {
            key,
            format,
            family,
            shim_fb: env_toggle(FB_TOGGLE_ENV, true),
            shim_input: env_toggle(INPUT_TOGGLE_ENV, true),
            shim_model: env_toggle(MODEL_TOGGLE_ENV, true),
            pen_paths: env_paths(PEN_PATHS_ENV, profile.device_path(DeviceClass::Pen)),
            touch_paths: env_paths(TOUCH_PATHS_ENV, profile.device_path(DeviceClass::Touch)),
            buttons_paths: env_paths(BUTTONS_PATHS_ENV, profile.device_path(DeviceClass::Buttons)),
        }
    }

    /// Resolves the configured device paths into identity sets.
    ///
    /// A path that cannot be opened or fingerprinted is dropped: emulation
    /// for that route is silently unavailable, everything else still works.
    pub fn resolve_identities(&self, real: &RealLibc) -> IdentitySets {
        IdentitySets {
            pen: resolve_set(real, &self.pen_paths),
            touch: resolve_set(real, &self.touch_paths),
            buttons: resolve_set(real, &self.buttons_paths),
        }
    }
}

/// The fingerprints the input layer intercepts, one set per device class.
#[derive(Debug, Default)]
pub struct IdentitySets {
    pub pen: HashSet<DeviceIdentity>,
    pub touch: HashSet<DeviceIdentity>,
    pub buttons: HashSet<DeviceIdentity>,
}

impl IdentitySets {
    pub fn class_of(&self, identity: DeviceIdentity) -> Option<DeviceClass> {
        if self.pen.contains(&identity) {
            Some(DeviceClass::Pen)
        } else if self.touch.contains(&identity) {
            Some(DeviceClass::Touch)
        } else if self.buttons.contains(&identity) {
            Some(DeviceClass::Buttons)
        } else {
            None
        }
    }
}

fn resolve_set(real: &RealLibc, paths: &[String]) -> HashSet<DeviceIdentity> {
    paths
        .iter()
        .filter_map(|path| {
            let c_path = CString::new(path.as_str()).ok()?;
            DeviceIdentity::from_path(real, &c_path)
        })
        .collect()
}

fn parse_key(raw: &str) -> Option<SurfaceKey> {
    raw.trim().parse().ok()
}

fn parse_format(raw: &str) -> Option<PixelFormat> {
    match raw {
        "RGB565" => Some(PixelFormat::Rgb565),
        "RGB888" => Some(PixelFormat::Rgb888),
        "RGBA8888" => Some(PixelFormat::Rgba8888),
        _ => None,
    }
}

fn env_toggle(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Err(_) => default,
        Ok(value) => value == "1",
    }
}

fn env_paths(name: &str, default: &str) -> Vec<String> {
    match std::env::var(name) {
        Err(_) => vec![default.to_string()],
        Ok(value) => value
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
