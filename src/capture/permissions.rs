//! Permission providers

use super::traits::PermissionProvider;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Permissions as reported by the operating system.
///
/// Screen recording is gated by the macOS TCC database; other platforms
/// need no explicit grant. Microphone access is requested by the audio
/// backend when the input device is opened, so it is reported as granted.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPermissions;

#[async_trait]
impl PermissionProvider for SystemPermissions {
    fn has_screen_recording_permission(&self) -> bool {
        #[cfg(target_os = "macos")]
        {
            super::macos::permissions::has_screen_recording_permission()
        }

        #[cfg(not(target_os = "macos"))]
        {
            true
        }
    }

    fn has_microphone_permission(&self) -> bool {
        true
    }

    fn request_screen_recording_permission(&self) {
        #[cfg(target_os = "macos")]
        {
            if !super::macos::permissions::request_screen_recording_permission() {
                tracing::warn!("Screen recording permission not granted; the prompt was shown");
            }
        }
    }

    async fn request_microphone_permission(&self) -> bool {
        true
    }
}

/// Fixed answers, for headless runs and tests
#[derive(Debug)]
pub struct StaticPermissions {
    screen: AtomicBool,
    microphone: AtomicBool,
    grant_microphone_on_request: bool,
    screen_requests: AtomicUsize,
    microphone_requests: AtomicUsize,
}

impl StaticPermissions {
    pub fn new(screen: bool, microphone: bool) -> Self {
        Self {
            screen: AtomicBool::new(screen),
            microphone: AtomicBool::new(microphone),
            grant_microphone_on_request: false,
            screen_requests: AtomicUsize::new(0),
            microphone_requests: AtomicUsize::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(true, true)
    }

    /// Grant the microphone when it is requested
    pub fn granting_microphone_on_request(mut self) -> Self {
        self.grant_microphone_on_request = true;
        self
    }

    pub fn set_screen(&self, granted: bool) {
        self.screen.store(granted, Ordering::SeqCst);
    }

    pub fn screen_requests(&self) -> usize {
        self.screen_requests.load(Ordering::SeqCst)
    }

    pub fn microphone_requests(&self) -> usize {
        self.microphone_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    fn has_screen_recording_permission(&self) -> bool {
        self.screen.load(Ordering::SeqCst)
    }

    fn has_microphone_permission(&self) -> bool {
        self.microphone.load(Ordering::SeqCst)
    }

    fn request_screen_recording_permission(&self) {
        self.screen_requests.fetch_add(1, Ordering::SeqCst);
    }

    async fn request_microphone_permission(&self) -> bool {
        self.microphone_requests.fetch_add(1, Ordering::SeqCst);
        if self.grant_microphone_on_request {
            self.microphone.store(true, Ordering::SeqCst);
        }
        self.microphone.load(Ordering::SeqCst)
    }
}
