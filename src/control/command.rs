//! Command type definitions for the device's HTTP control endpoints.
//!
//! Paths and query parameter names are the contract with the ESP firmware
//! and must stay byte-exact.

use std::str::FromStr;

/// Operating mode of the lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightMode {
    /// Light follows the ambient light sensor.
    Auto,
    #[default]
    Manual,
}

impl LightMode {
    pub const ALL: [LightMode; 2] = [LightMode::Auto, LightMode::Manual];
}

impl std::fmt::Display for LightMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LightMode::Auto => write!(f, "AUTO"),
            LightMode::Manual => write!(f, "MANUAL"),
        }
    }
}

impl FromStr for LightMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(LightMode::Auto),
            "MANUAL" => Ok(LightMode::Manual),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

/// Lighting effect preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    #[default]
    Static,
    Night,
    Music,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Static, Preset::Night, Preset::Music];
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preset::Static => write!(f, "STATIC"),
            Preset::Night => write!(f, "NIGHT"),
            Preset::Music => write!(f, "MUSIC"),
        }
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STATIC" => Ok(Preset::Static),
            "NIGHT" => Ok(Preset::Night),
            "MUSIC" => Ok(Preset::Music),
            other => Err(format!("Unknown preset: {}", other)),
        }
    }
}

/// Commands understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Connectivity check.
    Health,
    Power { on: bool },
    Mode(LightMode),
    Preset(Preset),
    /// Set the colour; channels are 0-255.
    Rgb { r: u8, g: u8, b: u8 },
    /// Set the brightness, 0-255.
    Brightness(u8),
}

/// A request waiting in the dispatch queue.
///
/// `target` is the path (plus query) relative to the device address; `label`
/// is only used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandJob {
    pub target: String,
    pub label: String,
}

impl DeviceCommand {
    /// Path and query of the endpoint, relative to the device address.
    pub fn path(&self) -> String {
        match self {
            DeviceCommand::Health => "/api/health".to_string(),
            DeviceCommand::Power { on } => format!("/api/power?on={}", if *on { 1 } else { 0 }),
            DeviceCommand::Mode(mode) => format!("/api/mode?name={}", mode),
            DeviceCommand::Preset(preset) => format!("/api/preset?name={}", preset),
            DeviceCommand::Rgb { r, g, b } => format!("/api/rgb?r={}&g={}&b={}", r, g, b),
            DeviceCommand::Brightness(v) => format!("/api/bri?v={}", v),
        }
    }

    /// Human-readable label for the status log.
    pub fn label(&self) -> String {
        match self {
            DeviceCommand::Health => "/api/health".to_string(),
            DeviceCommand::Power { on: true } => "POWER ON".to_string(),
            DeviceCommand::Power { on: false } => "POWER OFF".to_string(),
            DeviceCommand::Mode(mode) => format!("MODE {}", mode),
            DeviceCommand::Preset(preset) => format!("PRESET {}", preset),
            DeviceCommand::Rgb { r, g, b } => format!("RGB {},{},{}", r, g, b),
            DeviceCommand::Brightness(v) => format!("BRI {}", v),
        }
    }

    pub fn to_job(&self) -> CommandJob {
        CommandJob {
            target: self.path(),
            label: self.label(),
        }
    }
}
