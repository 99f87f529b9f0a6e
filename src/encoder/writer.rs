//! Container writer abstraction
//!
//! A `ContainerWriter` is the underlying muxer the `MediaEncoder` drives. It
//! owns per-track inputs, reports backpressure through `is_ready_for_more`,
//! and finalizes asynchronously.

use super::profile::{AudioSettings, ContainerFormat, VideoSettings};
use crate::media::{MediaTime, SampleBuffer, TrackKind};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a container backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriterError {
    #[error("Failed to create writer: {0}")]
    Creation(String),

    #[error("Writer is not in a writable state")]
    NotWriting,

    #[error("Track {0} is not configured")]
    TrackNotConfigured(TrackKind),

    #[error("Track {0} cannot accept more data")]
    NotReady(TrackKind),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// Lifecycle of a container backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterStatus {
    Unknown,
    Writing,
    Completed,
    Failed(String),
    Cancelled,
}

/// Tracks and codec parameters for one output file
#[derive(Debug, Clone, PartialEq)]
pub struct WriterConfig {
    pub output_path: PathBuf,
    pub container: ContainerFormat,
    pub video: VideoSettings,
    pub system_audio: Option<AudioSettings>,
    pub microphone: Option<AudioSettings>,
}

impl WriterConfig {
    pub fn has_track(&self, track: TrackKind) -> bool {
        match track {
            TrackKind::Video => true,
            TrackKind::SystemAudio => self.system_audio.is_some(),
            TrackKind::Microphone => self.microphone.is_some(),
        }
    }
}

/// The underlying muxer for one output file.
///
/// All methods take `&self`; implementations serialize their own state. The
/// encoder calls the synchronous methods under its lock and awaits `finish`
/// without it.
#[async_trait]
pub trait ContainerWriter: Send + Sync {
    /// Transition from `Unknown` to `Writing`
    fn start_writing(&self) -> Result<(), WriterError>;

    /// Set the time origin of the output timeline
    fn start_session(&self, at: MediaTime);

    /// Whether the track input can take another sample right now
    fn is_ready_for_more(&self, track: TrackKind) -> bool;

    /// Append one sample to its track
    fn append(&self, sample: SampleBuffer) -> Result<(), WriterError>;

    /// Close every track input; later appends are rejected
    fn mark_finished(&self);

    /// Finalize the output file. The outcome is reported through `status`.
    async fn finish(&self);

    /// Abort writing and release every resource held by the writer
    fn cancel(&self);

    fn status(&self) -> WriterStatus;
}

/// Creates a writer for each new recording
pub trait WriterFactory: Send + Sync {
    fn create(&self, config: &WriterConfig) -> Result<Arc<dyn ContainerWriter>, WriterError>;
}
