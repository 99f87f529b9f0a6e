//! Encoder error types

use super::writer::WriterError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create the container writer: {0}")]
    WriterCreationFailed(String),

    #[error("The writer is not ready for this operation")]
    WriterNotReady,

    #[error("A recording is already being written")]
    WriterBusy,

    #[error("Failed to start writing: {0}")]
    StartFailed(String),

    #[error("No video frames were captured. Check screen recording permissions.")]
    NoFramesWritten,

    #[error("Writing failed: {0}")]
    WritingFailed(String),
}

impl From<WriterError> for EncoderError {
    fn from(error: WriterError) -> Self {
        match error {
            WriterError::Creation(message) => EncoderError::WriterCreationFailed(message),
            other => EncoderError::WritingFailed(other.to_string()),
        }
    }
}

pub type EncoderResult<T> = Result<T, EncoderError>;
