//! Single-writer media encoder
//!
//! Accepts samples from up to three concurrent capture threads and
//! serializes them into one container file. Every append takes the encoder
//! lock for the duration of the call; finalization is split into two locked
//! phases around an unlocked asynchronous wait.

use super::error::{EncoderError, EncoderResult};
use super::profile::{AudioSettings, EncodingProfile, VideoSettings};
use super::writer::{ContainerWriter, WriterConfig, WriterError, WriterFactory, WriterStatus};
use crate::media::{FrameSize, MediaTime, SampleBuffer, SampleSink, TrackKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lifecycle of the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderState {
    Unconfigured,
    Configured,
    Writing,
    /// Inputs are closed and the writer is finalizing
    Finalizing,
    Finished,
    Failed,
}

/// Mutable state of one recording
struct EncoderSession {
    generation: u64,
    output_path: PathBuf,
    writer: Arc<dyn ContainerWriter>,
    has_started_session: bool,
    session_start_time: Option<MediaTime>,
    last_video_presentation_time: Option<MediaTime>,
    frames_written: u64,
}

impl EncoderSession {
    fn start_session(&mut self, at: MediaTime, track: TrackKind) {
        self.writer.start_session(at);
        self.session_start_time = Some(at);
        self.has_started_session = true;
        tracing::info!("Session started at {} by {} track", at, track);
    }
}

struct EncoderInner {
    state: EncoderState,
    session: Option<EncoderSession>,
    next_generation: u64,
}

/// Data captured by the first finalize phase and consumed by the last
struct PendingFinish {
    generation: u64,
    writer: Arc<dyn ContainerWriter>,
    output_path: PathBuf,
}

pub struct MediaEncoder {
    factory: Arc<dyn WriterFactory>,
    inner: Mutex<EncoderInner>,
}

impl MediaEncoder {
    pub fn new(factory: Arc<dyn WriterFactory>) -> Self {
        Self {
            factory,
            inner: Mutex::new(EncoderInner {
                state: EncoderState::Unconfigured,
                session: None,
                next_generation: 0,
            }),
        }
    }

    pub fn state(&self) -> EncoderState {
        self.inner.lock().state
    }

    /// Number of video frames accepted in the current session
    pub fn frames_written(&self) -> u64 {
        self.inner.lock().session.as_ref().map(|s| s.frames_written).unwrap_or(0)
    }

    pub fn session_start_time(&self) -> Option<MediaTime> {
        self.inner.lock().session.as_ref().and_then(|s| s.session_start_time)
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.inner.lock().session.as_ref().map(|s| s.output_path.clone())
    }

    /// Create the output container and its tracks.
    ///
    /// Any file already at `output_path` is replaced.
    pub fn setup(&self, output_path: &Path, profile: &EncodingProfile, frame_size: FrameSize) -> EncoderResult<()> {
        let mut inner = self.inner.lock();
        if matches!(inner.state, EncoderState::Writing | EncoderState::Finalizing) {
            return Err(EncoderError::WriterBusy);
        }

        if let Some(previous) = inner.session.take() {
            previous.writer.cancel();
        }
        inner.state = EncoderState::Unconfigured;

        if let Some(directory) = output_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(directory)?;
        }
        remove_output_file(output_path)?;

        let config = WriterConfig {
            output_path: output_path.to_path_buf(),
            container: profile.container,
            video: VideoSettings::derive(profile, frame_size),
            system_audio: profile
                .capture_system_audio
                .then(|| AudioSettings::for_codec(profile.audio_codec)),
            microphone: profile
                .capture_microphone
                .then(|| AudioSettings::for_codec(profile.audio_codec)),
        };

        let writer = self.factory.create(&config).map_err(|e| match e {
            WriterError::Creation(message) => EncoderError::WriterCreationFailed(message),
            other => EncoderError::WriterCreationFailed(other.to_string()),
        })?;

        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.session = Some(EncoderSession {
            generation,
            output_path: output_path.to_path_buf(),
            writer,
            has_started_session: false,
            session_start_time: None,
            last_video_presentation_time: None,
            frames_written: 0,
        });
        inner.state = EncoderState::Configured;

        tracing::info!(
            "Encoder configured for output: {} ({} {:?}, system audio: {}, microphone: {})",
            output_path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            frame_size,
            profile.video_codec,
            config.system_audio.is_some(),
            config.microphone.is_some()
        );
        Ok(())
    }

    pub fn start_writing(&self) -> EncoderResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != EncoderState::Configured {
            return Err(EncoderError::WriterNotReady);
        }
        let session = inner.session.as_ref().ok_or(EncoderError::WriterNotReady)?;
        session
            .writer
            .start_writing()
            .map_err(|e| EncoderError::StartFailed(e.to_string()))?;

        inner.state = EncoderState::Writing;
        tracing::info!("Encoder started writing");
        Ok(())
    }

    /// Append a captured video frame.
    ///
    /// Incomplete frames, frames arriving while the track is not ready, and
    /// frames whose timestamp does not advance past the last accepted one are
    /// dropped silently.
    pub fn append_video(&self, sample: SampleBuffer) {
        if !sample.is_complete() {
            return;
        }
        if sample.video_frame().is_none() {
            tracing::warn!("No image data in complete video sample");
            return;
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state != EncoderState::Writing {
            return;
        }
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        if !session.writer.is_ready_for_more(TrackKind::Video) {
            return;
        }

        let presentation_time = sample.presentation_time;
        if !session.has_started_session {
            session.start_session(presentation_time, TrackKind::Video);
        } else if let Some(last) = session.last_video_presentation_time {
            if presentation_time <= last {
                tracing::trace!("Dropping non-monotonic video frame at {}", presentation_time);
                return;
            }
        }

        match session.writer.append(sample) {
            Ok(()) => {
                session.last_video_presentation_time = Some(presentation_time);
                session.frames_written += 1;
                if session.frames_written == 1 {
                    tracing::info!("First video frame appended successfully");
                }
            }
            Err(e) => log_append_error(TrackKind::Video, &e),
        }
    }

    /// Append a system audio block. The first accepted block starts the
    /// session if no video frame has.
    pub fn append_system_audio(&self, sample: SampleBuffer) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state != EncoderState::Writing {
            return;
        }
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        if !session.writer.is_ready_for_more(TrackKind::SystemAudio) {
            return;
        }

        if !session.has_started_session {
            session.start_session(sample.presentation_time, TrackKind::SystemAudio);
        }

        if let Err(e) = session.writer.append(sample) {
            log_append_error(TrackKind::SystemAudio, &e);
        }
    }

    pub fn append_microphone(&self, sample: SampleBuffer) {
        let guard = self.inner.lock();
        if guard.state != EncoderState::Writing {
            return;
        }
        let Some(session) = guard.session.as_ref() else {
            return;
        };
        if !session.writer.is_ready_for_more(TrackKind::Microphone) {
            return;
        }

        if let Err(e) = session.writer.append(sample) {
            log_append_error(TrackKind::Microphone, &e);
        }
    }

    /// Finalize the output file and return its path.
    ///
    /// Fails with `NoFramesWritten` (after cancelling, so no file is left
    /// behind) when no video frame was accepted.
    pub async fn finish_writing(&self) -> EncoderResult<PathBuf> {
        let pending = match self.begin_finish() {
            Ok(pending) => pending,
            Err(EncoderError::NoFramesWritten) => {
                self.cancel();
                return Err(EncoderError::NoFramesWritten);
            }
            Err(e) => return Err(e),
        };

        pending.writer.finish().await;

        self.complete_finish(pending)
    }

    fn begin_finish(&self) -> EncoderResult<PendingFinish> {
        let mut inner = self.inner.lock();
        if inner.state != EncoderState::Writing {
            return Err(EncoderError::WriterNotReady);
        }
        let session = inner.session.as_ref().ok_or(EncoderError::WriterNotReady)?;

        tracing::info!(
            "Finishing writing - session started: {}, frames written: {}",
            session.has_started_session,
            session.frames_written
        );

        if session.frames_written == 0 {
            tracing::error!("No frames were written - nothing to finalize");
            return Err(EncoderError::NoFramesWritten);
        }

        session.writer.mark_finished();
        let pending = PendingFinish {
            generation: session.generation,
            writer: session.writer.clone(),
            output_path: session.output_path.clone(),
        };
        inner.state = EncoderState::Finalizing;
        Ok(pending)
    }

    fn complete_finish(&self, pending: PendingFinish) -> EncoderResult<PathBuf> {
        let mut inner = self.inner.lock();
        let current = inner.session.as_ref().map(|s| s.generation);
        if current != Some(pending.generation) {
            // Cancelled while the writer was finalizing
            return Err(EncoderError::WriterNotReady);
        }

        match pending.writer.status() {
            WriterStatus::Completed => {}
            WriterStatus::Failed(message) => {
                tracing::error!("Writer failed: {}", message);
                inner.state = EncoderState::Failed;
                return Err(EncoderError::WritingFailed(message));
            }
            other => {
                inner.state = EncoderState::Failed;
                return Err(EncoderError::WritingFailed(format!(
                    "writer finished in unexpected state {:?}",
                    other
                )));
            }
        }

        let frames = inner.session.take().map(|s| s.frames_written).unwrap_or(0);
        inner.state = EncoderState::Finished;
        tracing::info!(
            "Encoder finished writing {} frames to: {}",
            frames,
            pending.output_path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        );
        Ok(pending.output_path)
    }

    /// Abort the current recording, delete any partial output and return
    /// to `Unconfigured`. Safe to call in any state.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.session.take() {
            session.writer.cancel();
            if let Err(e) = remove_output_file(&session.output_path) {
                tracing::warn!("Failed to remove partial output {:?}: {}", session.output_path, e);
            }
            tracing::info!("Encoder cancelled");
        }
        inner.state = EncoderState::Unconfigured;
    }
}

impl SampleSink for MediaEncoder {
    fn deliver(&self, sample: SampleBuffer) {
        match sample.kind {
            TrackKind::Video => self.append_video(sample),
            TrackKind::SystemAudio => self.append_system_audio(sample),
            TrackKind::Microphone => self.append_microphone(sample),
        }
    }
}

/// Backpressure is an expected drop; anything else is a real failure
fn log_append_error(track: TrackKind, error: &WriterError) {
    match error {
        WriterError::NotReady(_) => tracing::trace!("Dropping {} sample: {}", track, error),
        _ => tracing::error!("Failed to append {} sample: {}", track, error),
    }
}

fn remove_output_file(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
