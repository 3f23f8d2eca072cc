//! Device communication modes and A/B slot handling.

use std::fmt;

/// Mode the device is currently reachable in.
///
/// The three live modes are mutually exclusive; a reboot out of one
/// invalidates any handle obtained in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// Booted Android, reachable over ADB.
    Normal,
    /// Bootloader, reachable over Fastboot.
    Bootloader,
    /// Qualcomm Emergency Download mode (9008).
    Edl,
    /// Not detected in any known mode.
    Unknown,
}

impl Default for DeviceMode {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Normal => write!(f, "NORMAL"),
            DeviceMode::Bootloader => write!(f, "BOOTLOADER"),
            DeviceMode::Edl => write!(f, "EDL"),
            DeviceMode::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Handle to a device confirmed in EDL mode.
///
/// Wraps the serial device path the 9008 endpoint enumerated at.
/// Invalidated by any reboot; obtain a fresh one through the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdlHandle(String);

impl EdlHandle {
    pub fn new(port: impl Into<String>) -> Self {
        Self(port.into())
    }

    /// Port name as enumerated (`COM7`).
    pub fn port(&self) -> &str {
        &self.0
    }

    /// Raw device path in the form the vendor tools expect (`\\.\COM7`).
    pub fn raw_device_path(&self) -> String {
        format!(r"\\.\{}", self.0)
    }
}

impl fmt::Display for EdlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Active slot of an A/B-partitioned device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSuffix {
    A,
    B,
}

impl SlotSuffix {
    /// Parse a raw slot value from either query path.
    ///
    /// Accepts the ADB property form (`_a`/`_b`) and the fastboot
    /// variable form (`a`/`b`). Anything else means a non-A/B device or
    /// a failed query and maps to `None` with a warning; it is never an
    /// error and never a guess.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "_a" | "a" => Some(SlotSuffix::A),
            "_b" | "b" => Some(SlotSuffix::B),
            other => {
                tracing::warn!(
                    raw = %other,
                    "Could not get valid slot suffix, assuming non-A/B device"
                );
                None
            }
        }
    }

    /// Suffix as it appears in partition names (`_a`/`_b`).
    pub fn as_suffix(&self) -> &'static str {
        match self {
            SlotSuffix::A => "_a",
            SlotSuffix::B => "_b",
        }
    }
}

impl fmt::Display for SlotSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_suffix())
    }
}
