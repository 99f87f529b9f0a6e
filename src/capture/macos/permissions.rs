//! macOS permission handling

use core_graphics::access::ScreenCaptureAccess;

/// Check if screen recording permission is granted
pub fn has_screen_recording_permission() -> bool {
    ScreenCaptureAccess::preflight()
}

/// Show the system screen recording prompt.
///
/// Returns true if access was already granted; the user's answer only takes
/// effect after the process restarts.
pub fn request_screen_recording_permission() -> bool {
    ScreenCaptureAccess::request()
}
