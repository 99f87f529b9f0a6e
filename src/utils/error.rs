//! Error types and handling
//!
//! `RecorderError` wraps every component error; `ErrorResponse` is the
//! serializable form handed to notification sinks.

use crate::capture::CaptureError;
use crate::encoder::EncoderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecorderError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RecorderError::Capture(e) => match e {
                CaptureError::NoContentSelected => "NO_CONTENT_SELECTED",
                CaptureError::PermissionDenied(_) => "PERMISSION_DENIED",
                CaptureError::StreamCreationFailed(_) => "STREAM_CREATION_FAILED",
                CaptureError::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
                CaptureError::StreamInterrupted(_) => "STREAM_INTERRUPTED",
            },
            RecorderError::Encoder(e) => match e {
                EncoderError::Io(_) => "IO_ERROR",
                EncoderError::WriterCreationFailed(_) => "WRITER_CREATION_FAILED",
                EncoderError::WriterNotReady | EncoderError::WriterBusy | EncoderError::StartFailed(_) => {
                    "WRITER_NOT_READY"
                }
                EncoderError::NoFramesWritten => "NO_FRAMES_WRITTEN",
                EncoderError::WritingFailed(_) => "WRITING_FAILED",
            },
            RecorderError::Io(_) => "IO_ERROR",
            RecorderError::Serialization(_) | RecorderError::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Error response for notification sinks and callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl From<&RecorderError> for ErrorResponse {
    fn from(error: &RecorderError) -> Self {
        ErrorResponse::new(error.code(), error.to_string())
    }
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        ErrorResponse::from(&error)
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PermissionKind;

    #[test]
    fn test_codes() {
        let cases: Vec<(RecorderError, &str)> = vec![
            (CaptureError::NoContentSelected.into(), "NO_CONTENT_SELECTED"),
            (CaptureError::PermissionDenied(PermissionKind::Microphone).into(), "PERMISSION_DENIED"),
            (EncoderError::NoFramesWritten.into(), "NO_FRAMES_WRITTEN"),
            (EncoderError::WritingFailed("disk full".into()).into(), "WRITING_FAILED"),
            (EncoderError::WriterBusy.into(), "WRITER_NOT_READY"),
            (RecorderError::Config("bad".into()), "CONFIG_ERROR"),
        ];
        for (error, code) in cases {
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let response = ErrorResponse::from(RecorderError::from(CaptureError::PermissionDenied(
            PermissionKind::ScreenRecording,
        )));
        assert_eq!(response.message, "Permission denied: screen recording");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], "PERMISSION_DENIED");
        assert_eq!(json["message"], "Permission denied: screen recording");
    }
}
