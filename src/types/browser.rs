//! Browsers a checkpoint is rendered in.
//!
//! A browser is either a desktop engine at a fixed window size or a device
//! the engine emulates. Emulated devices have no size of their own; the
//! render reports the device size back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `name` prefix that selects device emulation when parsing a browser.
pub const EMULATION_PREFIX: &str = "emulate";

const DEFAULT_WIDTH: u32 = 1024;
const DEFAULT_HEIGHT: u32 = 768;

/// Window or device screen size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Viewport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dimensions: Vec<&str> = s.split('x').map(str::trim).collect();
        let [width, height] = dimensions.as_slice() else {
            return Err(format!("size '{s}' is not WIDTHxHEIGHT"));
        };
        let axis = |value: &str, name: &str| match value.parse::<u32>() {
            Ok(0) => Err(format!("size '{s}' has a zero {name}")),
            Ok(pixels) => Ok(pixels),
            Err(_) => Err(format!("size '{s}' has an invalid {name} '{value}'")),
        };
        Ok(Self {
            width: axis(width, "width")?,
            height: axis(height, "height")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenOrientation {
    Portrait,
    Landscape,
}

impl ScreenOrientation {
    pub fn as_str(self) -> &'static str {
        match self {
            ScreenOrientation::Portrait => "portrait",
            ScreenOrientation::Landscape => "landscape",
        }
    }
}

impl FromStr for ScreenOrientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(ScreenOrientation::Portrait),
            "landscape" => Ok(ScreenOrientation::Landscape),
            other => Err(format!(
                "unknown screen orientation '{other}' (expected portrait or landscape)"
            )),
        }
    }
}

/// A desktop engine at a window size, or an emulated device when
/// `device_name` is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    #[serde(default = "default_browser_name")]
    pub name: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_orientation: Option<ScreenOrientation>,
}

fn default_browser_name() -> String {
    "chrome".to_string()
}

impl Default for BrowserInfo {
    fn default() -> Self {
        Self::desktop(default_browser_name(), DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl BrowserInfo {
    pub fn desktop(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            device_name: None,
            screen_orientation: None,
        }
    }

    /// Chrome emulating `device_name`.
    pub fn device(device_name: impl Into<String>, orientation: Option<ScreenOrientation>) -> Self {
        Self {
            name: default_browser_name(),
            width: 0,
            height: 0,
            device_name: Some(device_name.into()),
            screen_orientation: orientation,
        }
    }

    pub fn is_emulated(&self) -> bool {
        self.device_name.is_some()
    }

    /// Size to open the session with. `None` for emulated devices and for
    /// desktops without a size.
    pub fn viewport(&self) -> Option<Viewport> {
        if self.is_emulated() || self.width == 0 || self.height == 0 {
            return None;
        }
        Some(Viewport {
            width: self.width,
            height: self.height,
        })
    }

    /// How the session describes the device: `<device> (Chrome emulation)`
    /// or `Desktop`.
    pub fn device_info(&self) -> String {
        match &self.device_name {
            Some(device) => format!("{device} (Chrome emulation)"),
            None => "Desktop".to_string(),
        }
    }

    /// Name used in logs and reports.
    pub fn label(&self) -> &str {
        self.device_name.as_deref().unwrap_or(&self.name)
    }
}

/// Parses `name:WIDTHxHEIGHT`, a bare `WIDTHxHEIGHT` (chrome), or
/// `emulate:DEVICE[@orientation]`.
impl FromStr for BrowserInfo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = match s.split_once(':') {
            Some((name, rest)) => (name.trim(), rest),
            None => ("chrome", s),
        };
        if name.is_empty() {
            return Err(format!("Invalid browser '{s}': missing name before ':'"));
        }

        if name.eq_ignore_ascii_case(EMULATION_PREFIX) {
            let (device, orientation) = match rest.rsplit_once('@') {
                Some((device, orientation)) => (
                    device,
                    Some(
                        orientation
                            .parse()
                            .map_err(|e| format!("Invalid browser '{s}': {e}"))?,
                    ),
                ),
                None => (rest, None),
            };
            let device = device.trim();
            if device.is_empty() {
                return Err(format!("Invalid browser '{s}': missing device name"));
            }
            return Ok(Self::device(device, orientation));
        }

        let size: Viewport = rest.parse().map_err(|e| format!("Invalid browser '{s}': {e}"))?;
        Ok(Self::desktop(name, size.width, size.height))
    }
}
