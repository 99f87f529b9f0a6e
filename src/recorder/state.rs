//! Recording state management
//!
//! Defines the controller's state machine and the summary of a saved
//! recording.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Current state of the recording controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Capture stream running, samples flowing into the encoder
    Recording,
    /// Stream stopped, output file being finalized
    Stopping,
}

impl RecordingState {
    pub fn is_recording(&self) -> bool {
        *self == RecordingState::Recording
    }
}

/// Information about a recording in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRecording {
    pub id: Uuid,
    pub output_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl ActiveRecording {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            output_path,
            started_at: Utc::now(),
        }
    }
}

/// Result of a completed recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub id: Uuid,
    /// Path to the finalized container file
    pub output_path: PathBuf,
    /// Wall-clock duration in milliseconds
    pub duration_ms: f64,
    pub frames_written: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RecordingState::Stopping).unwrap(), "\"stopping\"");
        assert_eq!(RecordingState::default(), RecordingState::Idle);
        assert!(RecordingState::Recording.is_recording());
        assert!(!RecordingState::Stopping.is_recording());
    }

    #[test]
    fn test_summary_uses_camel_case() {
        let recording = ActiveRecording::new(PathBuf::from("/tmp/out.mov"));
        let summary = RecordingSummary {
            id: recording.id,
            output_path: recording.output_path.clone(),
            duration_ms: 1500.0,
            frames_written: 90,
            started_at: recording.started_at,
            finished_at: Utc::now(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["framesWritten"], 90);
        assert_eq!(json["outputPath"], "/tmp/out.mov");
    }
}
