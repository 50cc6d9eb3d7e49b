// SPDX-License-Identifier: MPL-2.0

//! Error types for scan sessions
//!
//! Two layers exist. Platforms report [`BackendError`] from their device and
//! engine calls. The session controller classifies those into [`ScanError`],
//! which is what observers see alongside a state change. No public controller
//! operation returns a `ScanError`; they are delivered as notifications.

use std::fmt;

/// Result type alias for platform calls
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for session-level operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors reported by a decode platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No capture device matched the request, or enumeration found nothing
    DeviceNotFound(String),
    /// The platform refused camera access
    PermissionDenied(String),
    /// A capability request (facing mode, resolution) cannot be satisfied
    OverConstrained(String),
    /// Engine failed to start for any other reason
    InitializationFailed(String),
    /// Engine failed while stopping or clearing
    StopFailed(String),
    /// General I/O error
    Io(String),
    /// Other errors
    Other(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            BackendError::OverConstrained(msg) => write!(f, "Constraint not satisfiable: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::StopFailed(msg) => write!(f, "Stop failed: {}", msg),
            BackendError::Io(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => BackendError::PermissionDenied(err.to_string()),
            std::io::ErrorKind::NotFound => BackendError::DeviceNotFound(err.to_string()),
            _ => BackendError::Io(err.to_string()),
        }
    }
}

/// Session-level error taxonomy surfaced to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Enumeration returned no devices or was rejected
    NoDevice(String),
    /// Requested camera constraint is unsatisfiable (retryable once via fallback)
    Capability(String),
    /// Any other start failure; fatal for the current attempt
    EngineStart(String),
    /// Failure during stop/clear; never blocks the transition to idle
    EngineStop(String),
    /// Decoded payload rejected by the decode handler; scanning continues
    InvalidDecode(String),
}

impl ScanError {
    /// Classify a platform error raised while acquiring a device
    pub fn from_start(err: BackendError) -> Self {
        match err {
            BackendError::OverConstrained(msg) => ScanError::Capability(msg),
            BackendError::DeviceNotFound(msg) | BackendError::PermissionDenied(msg) => {
                ScanError::NoDevice(msg)
            }
            other => ScanError::EngineStart(other.to_string()),
        }
    }

    /// Classify a platform error raised while enumerating devices
    pub fn from_enumeration(err: BackendError) -> Self {
        ScanError::NoDevice(err.to_string())
    }

    /// Whether this error allows one retry with an explicitly selected device
    pub fn is_capability(&self) -> bool {
        matches!(self, ScanError::Capability(_))
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::NoDevice(msg) => write!(f, "No camera available: {}", msg),
            ScanError::Capability(msg) => write!(f, "Camera constraint not satisfiable: {}", msg),
            ScanError::EngineStart(msg) => write!(f, "Failed to start camera: {}", msg),
            ScanError::EngineStop(msg) => write!(f, "Failed to release camera: {}", msg),
            ScanError::InvalidDecode(msg) => write!(f, "Invalid code: {}", msg),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<BackendError> for ScanError {
    fn from(err: BackendError) -> Self {
        ScanError::from_start(err)
    }
}

/// Errors loading or saving JSON files (settings, allow-lists)
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    /// No per-user config directory on this platform
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Invalid JSON: {}", e),
            ConfigError::NoConfigDir => write!(f, "No config directory available"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::NoConfigDir => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_over_constraint_is_capability_error() {
        let err = ScanError::from_start(BackendError::OverConstrained("facingMode".into()));
        assert!(err.is_capability());
    }

    #[test]
    fn test_permission_denied_is_no_device() {
        let err = ScanError::from_start(BackendError::PermissionDenied("denied".into()));
        assert_eq!(err, ScanError::NoDevice("denied".into()));
    }

    #[test]
    fn test_other_start_failure_is_engine_start() {
        let err = ScanError::from_start(BackendError::InitializationFailed("busy".into()));
        assert!(matches!(err, ScanError::EngineStart(_)));
        assert!(!err.is_capability());
    }

    #[test]
    fn test_io_not_found_maps_to_device_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "/dev/video9");
        assert!(matches!(BackendError::from(io), BackendError::DeviceNotFound(_)));
    }

    #[test]
    fn test_config_error_keeps_source() {
        let err = ConfigError::from(serde_json::from_str::<u32>("nope").unwrap_err());
        assert!(err.to_string().starts_with("Invalid JSON"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
