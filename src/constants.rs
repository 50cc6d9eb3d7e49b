// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Directory name under the user config dir
pub const APP_DIR: &str = "scan-session";

/// Settings file inside [`APP_DIR`]
pub const CONFIG_FILE: &str = "config.json";

/// Default render target bound to the decode engine
pub const DEFAULT_RENDER_TARGET: &str = "reader";

/// Default number of frames per second handed to the decoder
pub const DEFAULT_DECODE_FPS: u32 = 10;

/// Upper bound accepted for the decode rate
pub const MAX_DECODE_FPS: u32 = 60;

/// Default square scan region edge in pixels
pub const DEFAULT_SCAN_REGION: u32 = 250;

/// Frames are downscaled to this dimension before QR detection
pub const DECODE_MAX_DIMENSION: u32 = 640;

/// Length of the numeric check-in code
pub const CHECKIN_CODE_LEN: usize = 4;

/// Capture resolution requested from V4L2 devices
pub const CAPTURE_WIDTH: u32 = 640;
pub const CAPTURE_HEIGHT: u32 = 480;

/// Number of mmap buffers for V4L2 streams
pub const CAPTURE_BUFFER_COUNT: u32 = 4;

/// Timing constants for session transitions
pub mod timing {
    use super::Duration;

    /// Settle delay between releasing a camera and acquiring it again.
    ///
    /// Some drivers reject an immediate re-open of a just-released stream.
    pub const RESTART_SETTLE_DELAY: Duration = Duration::from_millis(1000);

    /// Lower and upper bounds for a configured settle delay
    pub const MIN_RESTART_DELAY: Duration = Duration::from_millis(0);
    pub const MAX_RESTART_DELAY: Duration = Duration::from_millis(5000);

    /// How long `start_capture` waits for the capture thread to open the device
    pub const DEVICE_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Label fragments that identify a user-facing camera
///
/// Matched case-insensitively against platform-supplied labels.
pub const FRONT_FACING_PATTERNS: &[&str] = &["front", "user", "selfie", "facetime"];

/// Label fragments that identify a rear camera
pub const REAR_FACING_PATTERNS: &[&str] = &["back", "rear", "environment", "world"];
