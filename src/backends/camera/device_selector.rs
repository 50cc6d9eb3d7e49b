// SPDX-License-Identifier: GPL-3.0-only

//! Capture device selection
//!
//! Enumerates devices through the platform and picks a target. Label
//! heuristics are best-effort: labels are platform-supplied free text, so a
//! front camera that does not say so will not be found.

use super::types::{CaptureDevice, Facing};
use super::DecodePlatform;
use crate::constants::{FRONT_FACING_PATTERNS, REAR_FACING_PATTERNS};
use crate::errors::{ScanError, ScanResult};
use tracing::{debug, info, warn};

/// Helper invoked by the controller to enumerate and pick devices
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceSelector {
    facing: Facing,
}

impl DeviceSelector {
    /// Create a selector that prefers the given facing direction
    pub fn new(facing: Facing) -> Self {
        Self { facing }
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Enumerate devices, failing with `ScanError::NoDevice` when none exist
    pub async fn enumerate(&self, platform: &dyn DecodePlatform) -> ScanResult<Vec<CaptureDevice>> {
        let devices = platform.enumerate_devices().await.map_err(|e| {
            warn!(platform = platform.name(), error = %e, "Device enumeration rejected");
            ScanError::from_enumeration(e)
        })?;

        if devices.is_empty() {
            warn!(platform = platform.name(), "Device enumeration returned no devices");
            return Err(ScanError::NoDevice("no capture devices found".to_string()));
        }

        debug!(count = devices.len(), "Enumerated capture devices");
        Ok(devices)
    }

    /// Pick the device id to use
    ///
    /// Priority: `previous_id` if still present > first label matching the
    /// preferred facing > first enumerated device. Returns `None` only for an
    /// empty list.
    pub fn pick_preferred(&self, devices: &[CaptureDevice], previous_id: Option<&str>) -> Option<String> {
        if let Some(previous) = previous_id
            && devices.iter().any(|d| d.id == previous)
        {
            debug!(device = %previous, "Reusing previously selected device");
            return Some(previous.to_string());
        }

        if let Some(device) = self.find_facing(devices) {
            info!(device = %device, facing = %self.facing, "Selected device by label");
            return Some(device.id.clone());
        }

        let first = devices.first()?;
        info!(device = %first, "No facing match, falling back to first device");
        Some(first.id.clone())
    }

    /// Find the first device whose label indicates the preferred facing
    pub fn find_facing<'a>(&self, devices: &'a [CaptureDevice]) -> Option<&'a CaptureDevice> {
        let patterns = match self.facing {
            Facing::User => FRONT_FACING_PATTERNS,
            Facing::Environment => REAR_FACING_PATTERNS,
        };
        devices.iter().find(|d| label_matches(&d.label, patterns))
    }
}

/// Case-insensitive substring match against any pattern
fn label_matches(label: &str, patterns: &[&str]) -> bool {
    let label = label.to_lowercase();
    patterns.iter().any(|p| label.contains(p))
}
