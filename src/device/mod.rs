//! Simulator and host device identification
//!
//! Resolves the identifier Xcode uses for a test destination:
//! - iOS: the UDID of the newest simulator runtime for a device name
//! - Mac: the host's hardware UUID
//!
//! Both lookups shell out, so results are cached on the [`DeviceLocator`]
//! that performed them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex_lite::Regex;
use tracing::{debug, info};

use crate::runner::{Invocation, RunnerError, ToolRunner};
use crate::target::Platform;

/// Errors from device lookup
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// No simulator matched; carries the raw listing for diagnosis
    #[error("no simulator found matching '{device}'")]
    NotFound { device: String, listing: String },

    #[error("{tool} exited with status {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: i32,
        stderr: String,
    },

    #[error("hardware UUID not present in system_profiler output")]
    HardwareIdMissing,

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl DeviceError {
    /// Raw device listing, when the error carries one
    pub fn listing(&self) -> Option<&str> {
        match self {
            DeviceError::NotFound { listing, .. } => Some(listing),
            _ => None,
        }
    }
}

/// Simulator runtime version, compared as (major, minor, patch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl OsVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse "17", "17.0" or "17.0.1"; missing components are zero.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor, patch })
    }

    /// True iff `self` is strictly newer than `other`
    pub fn is_newer_than(&self, other: &OsVersion) -> bool {
        self > other
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// One parsed line of the device listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorEntry {
    pub name: String,
    pub os: OsVersion,
    pub udid: String,
}

fn listing_pattern() -> Regex {
    // "iPhone 15 Simulator (17.0) (0F1E...)" or "iPhone 6 (12.4) [0F1E...]"
    Regex::new(r"^\s*(.+?) \((\d+(?:\.\d+){0,2})\) [\[(]([A-Za-z0-9-]+)[\])]")
        .expect("device listing pattern is a valid regex")
}

/// Whether a listed device name is `device`, ignoring case and a trailing
/// " Simulator"
fn names_device(listed: &str, device: &str) -> bool {
    let listed = listed.to_lowercase();
    let listed = listed.strip_suffix(" simulator").unwrap_or(&listed);
    listed == device.trim().to_lowercase()
}

/// Parse device listing lines whose device name is `device`.
pub fn parse_simulators(listing: &str, device: &str) -> Vec<SimulatorEntry> {
    let pattern = listing_pattern();

    listing
        .lines()
        .filter_map(|line| {
            let caps = pattern.captures(line)?;
            Some(SimulatorEntry {
                name: caps.get(1)?.as_str().trim().to_string(),
                os: OsVersion::parse(caps.get(2)?.as_str())?,
                udid: caps.get(3)?.as_str().to_string(),
            })
        })
        .filter(|entry| names_device(&entry.name, device))
        .collect()
}

/// Pick the entry with the highest OS version; ties keep the first seen.
pub fn select_newest(entries: &[SimulatorEntry]) -> Option<&SimulatorEntry> {
    let mut newest: Option<&SimulatorEntry> = None;
    for entry in entries {
        match newest {
            Some(current) if !entry.os.is_newer_than(&current.os) => {}
            _ => newest = Some(entry),
        }
    }
    newest
}

/// Extract "Hardware UUID: ..." from `system_profiler SPHardwareDataType`
pub fn parse_hardware_uuid(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() == "Hardware UUID" {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

/// Looks up device identifiers, memoizing each answer for its own lifetime
pub struct DeviceLocator {
    runner: Arc<dyn ToolRunner>,
    simulators: HashMap<String, String>,
    hardware_id: Option<String>,
}

impl DeviceLocator {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            simulators: HashMap::new(),
            hardware_id: None,
        }
    }

    /// Identifier of the destination device for `platform`.
    ///
    /// `device_name` is only consulted for iOS.
    pub fn device_id(&mut self, platform: Platform, device_name: &str) -> Result<String, DeviceError> {
        match platform {
            Platform::Ios => self.simulator_id(device_name),
            Platform::Mac => self.host_hardware_id(),
        }
    }

    /// UDID of the newest simulator named `device_name`
    pub fn simulator_id(&mut self, device_name: &str) -> Result<String, DeviceError> {
        if let Some(udid) = self.simulators.get(device_name) {
            return Ok(udid.clone());
        }

        let listing = Invocation::new("xcrun").args(["xctrace", "list", "devices"]);
        let output = self.runner.capture(&listing)?;
        if !output.succeeded() {
            return Err(DeviceError::ToolFailed {
                tool: "xctrace".to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }

        // xctrace prints part of its listing on stderr on some Xcode versions
        let text = if output.stderr.trim().is_empty() {
            output.stdout
        } else {
            format!("{}\n{}", output.stdout, output.stderr)
        };

        let entries = parse_simulators(&text, device_name);
        let newest = select_newest(&entries).ok_or_else(|| DeviceError::NotFound {
            device: device_name.to_string(),
            listing: text.clone(),
        })?;

        info!(device = device_name, os = %newest.os, udid = %newest.udid, "located simulator");
        self.simulators.insert(device_name.to_string(), newest.udid.clone());
        Ok(newest.udid.clone())
    }

    /// Hardware UUID of this Mac, queried once
    pub fn host_hardware_id(&mut self) -> Result<String, DeviceError> {
        if let Some(ref id) = self.hardware_id {
            return Ok(id.clone());
        }

        let query = Invocation::new("system_profiler").arg("SPHardwareDataType");
        let output = self.runner.capture(&query)?;
        if !output.succeeded() {
            return Err(DeviceError::ToolFailed {
                tool: "system_profiler".to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let id = parse_hardware_uuid(&output.stdout).ok_or(DeviceError::HardwareIdMissing)?;
        debug!(hardware_id = %id, "resolved host hardware id");
        self.hardware_id = Some(id.clone());
        Ok(id)
    }
}
