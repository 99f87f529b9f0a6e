//! Capture trait definitions
//!
//! Platform-agnostic interfaces between capture sources, the stream session
//! and the OS permission layer.

use super::config::CaptureConfiguration;
use super::selection::ContentFilter;
use crate::media::SampleBuffer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// OS-level authorization a recording may need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionKind {
    ScreenRecording,
    Microphone,
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionKind::ScreenRecording => f.write_str("screen recording"),
            PermissionKind::Microphone => f.write_str("microphone"),
        }
    }
}

/// Capture errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No content selected for capture")]
    NoContentSelected,

    #[error("Permission denied: {0}")]
    PermissionDenied(PermissionKind),

    #[error("Failed to create capture stream: {0}")]
    StreamCreationFailed(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Capture stream stopped: {0}")]
    StreamInterrupted(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Why a running stream ended without being asked to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTermination {
    /// The user stopped sharing the target, e.g. closed the captured window
    UserStopped,
    /// The stream failed internally
    Error(String),
}

/// A termination as reported by a `StreamSession`, tagged with the start
/// it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEnded {
    pub generation: u64,
    pub reason: StreamTermination,
}

/// Where a running capture source delivers its output
pub trait StreamOutput: Send + Sync {
    /// Push one sample synchronously on the producing thread
    fn deliver(&self, sample: SampleBuffer);

    /// Report that the stream ended on its own. Only the first report per
    /// start is forwarded.
    fn terminate(&self, reason: StreamTermination);
}

/// A live producer of video and audio samples
#[async_trait]
pub trait CaptureSource: Send + Sync {
    fn name(&self) -> &str;

    /// Start delivering samples to `output`. Returns once the stream is
    /// running.
    async fn start(
        &mut self,
        filter: &ContentFilter,
        config: &CaptureConfiguration,
        output: Arc<dyn StreamOutput>,
    ) -> CaptureResult<()>;

    /// Retarget a running stream without stopping it
    async fn update_filter(&mut self, filter: &ContentFilter) -> CaptureResult<()>;

    /// Stop delivery. Safe to call when not running.
    async fn stop(&mut self);

    /// Whether the source records the microphone itself
    fn captures_microphone(&self) -> bool;
}

/// Gatekeeper for OS capture authorization
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    fn has_screen_recording_permission(&self) -> bool;

    fn has_microphone_permission(&self) -> bool;

    /// Trigger the system screen recording prompt
    fn request_screen_recording_permission(&self);

    async fn request_microphone_permission(&self) -> bool;
}
