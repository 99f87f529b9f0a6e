//! Recording controller
//!
//! Drives the stream session and the media encoder through one recording:
//! `Idle -> Recording -> Stopping -> Idle`. Control operations are
//! serialized on an async mutex; state reads never wait on it.
//!
//! An unexpected end of the capture stream, whether the user stopped
//! sharing or the stream failed, runs the normal stop path so whatever was
//! captured is saved.

use super::notify::{EventNotifier, NotificationSink};
use super::output::{DirectoryOutput, OutputLocation};
use super::preview::{LivePreview, NoPreview};
use super::settings::RecorderSettings;
use super::state::{ActiveRecording, RecordingState, RecordingSummary};
use crate::capture::{
    CaptureConfiguration, CaptureError, CaptureSource, ContentSelection, PermissionProvider, StreamEnded,
    StreamSession, StreamTermination,
};
use crate::encoder::{MediaEncoder, WriterFactory};
use crate::utils::error::{ErrorResponse, RecorderError, RecorderResult};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};

/// State only touched by control operations
struct Core {
    stream: StreamSession,
    /// Taken when the termination watcher is spawned
    terminations: Option<mpsc::UnboundedReceiver<StreamEnded>>,
}

struct Shared {
    core: Mutex<Core>,
    encoder: Arc<MediaEncoder>,
    state: RwLock<RecordingState>,
    settings: RwLock<RecorderSettings>,
    selection: RwLock<Option<ContentSelection>>,
    last_error: RwLock<Option<ErrorResponse>>,
    started_at: RwLock<Option<Instant>>,
    active: RwLock<Option<ActiveRecording>>,
    output: Arc<dyn OutputLocation>,
    notifier: Arc<dyn NotificationSink>,
    preview: Arc<dyn LivePreview>,
}

/// Builder for [`RecordingController`]
pub struct RecordingControllerBuilder {
    source: Box<dyn CaptureSource>,
    permissions: Arc<dyn PermissionProvider>,
    factory: Arc<dyn WriterFactory>,
    settings: RecorderSettings,
    output: Option<Arc<dyn OutputLocation>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    preview: Option<Arc<dyn LivePreview>>,
}

impl RecordingControllerBuilder {
    pub fn settings(mut self, settings: RecorderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn output(mut self, output: Arc<dyn OutputLocation>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn preview(mut self, preview: Arc<dyn LivePreview>) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn build(self) -> RecordingController {
        let encoder = Arc::new(MediaEncoder::new(self.factory));
        let mut stream = StreamSession::new(self.source, self.permissions);
        stream.register_sink(encoder.clone());
        let (termination_tx, termination_rx) = mpsc::unbounded_channel();
        stream.register_termination(termination_tx);

        RecordingController {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    stream,
                    terminations: Some(termination_rx),
                }),
                encoder,
                state: RwLock::new(RecordingState::Idle),
                settings: RwLock::new(self.settings.normalized()),
                selection: RwLock::new(None),
                last_error: RwLock::new(None),
                started_at: RwLock::new(None),
                active: RwLock::new(None),
                output: self.output.unwrap_or_else(|| Arc::new(DirectoryOutput::default())),
                notifier: self.notifier.unwrap_or_else(|| Arc::new(EventNotifier::new())),
                preview: self.preview.unwrap_or_else(|| Arc::new(NoPreview)),
            }),
        }
    }
}

/// Cheaply cloneable handle to one recorder
#[derive(Clone)]
pub struct RecordingController {
    shared: Arc<Shared>,
}

impl RecordingController {
    pub fn builder(
        source: Box<dyn CaptureSource>,
        permissions: Arc<dyn PermissionProvider>,
        factory: Arc<dyn WriterFactory>,
    ) -> RecordingControllerBuilder {
        RecordingControllerBuilder {
            source,
            permissions,
            factory,
            settings: RecorderSettings::default(),
            output: None,
            notifier: None,
            preview: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        *self.shared.state.read()
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    pub fn can_start_recording(&self) -> bool {
        self.state() == RecordingState::Idle && self.has_content_selected()
    }

    pub fn has_content_selected(&self) -> bool {
        self.shared.selection.read().is_some()
    }

    pub fn selection(&self) -> Option<ContentSelection> {
        self.shared.selection.read().clone()
    }

    pub fn last_error(&self) -> Option<ErrorResponse> {
        self.shared.last_error.read().clone()
    }

    pub fn settings(&self) -> RecorderSettings {
        self.shared.settings.read().clone()
    }

    /// Replace the settings; they apply from the next recording on
    pub fn update_settings(&self, settings: RecorderSettings) {
        *self.shared.settings.write() = settings.normalized();
    }

    /// Time since the current recording started, zero when not recording
    pub fn duration(&self) -> Duration {
        self.shared
            .started_at
            .read()
            .map(|started| started.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration())
    }

    /// Use a new capture target. While recording, the live stream is
    /// retargeted; while idle, the preview follows the selection.
    pub async fn select_content(&self, selection: ContentSelection) -> RecorderResult<()> {
        let mut core = self.shared.core.lock().await;
        tracing::info!("Content selected: {}", selection.filter.target.description());
        *self.shared.selection.write() = Some(selection.clone());

        if core.stream.is_running() {
            core.stream.update_filter(&selection).await?;
        } else {
            self.shared.preview.show(&selection);
        }
        Ok(())
    }

    /// The picker was dismissed: drop the selection and the preview
    pub fn cancel_selection(&self) {
        tracing::info!("Selection cancelled, clearing preview");
        self.shared.selection.write().take();
        self.shared.preview.clear();
    }

    pub fn clear_selection(&self) {
        self.shared.selection.write().take();
    }

    /// Start a recording of the current selection.
    ///
    /// Does nothing unless idle with content selected. On failure every
    /// partially started resource is released, the state returns to
    /// `Idle` and the error is kept as `last_error`.
    pub async fn start_recording(&self) -> RecorderResult<()> {
        let mut core = self.shared.core.lock().await;
        if let Some(terminations) = core.terminations.take() {
            tokio::spawn(watch_terminations(Arc::downgrade(&self.shared), terminations));
        }

        if self.state() != RecordingState::Idle {
            tracing::warn!("Cannot start recording: already {:?}", self.state());
            return Ok(());
        }
        let Some(selection) = self.selection() else {
            tracing::warn!("Cannot start recording: no content selected");
            return Ok(());
        };

        tracing::info!("Starting recording sequence...");
        self.set_state(RecordingState::Recording);
        self.shared.last_error.write().take();

        match self.begin_recording(&mut core, &selection).await {
            Ok(recording) => {
                *self.shared.started_at.write() = Some(Instant::now());
                self.shared.notifier.recording_started(recording.id, &recording.output_path);
                tracing::info!("Recording {} started", recording.id);
                *self.shared.active.write() = Some(recording);
                Ok(())
            }
            Err(e) => {
                self.shared.encoder.cancel();
                core.stream.stop().await;
                self.set_state(RecordingState::Idle);
                tracing::error!("Failed to start recording: {}", e);
                *self.shared.last_error.write() = Some(ErrorResponse::from(&e));
                Err(e)
            }
        }
    }

    async fn begin_recording(&self, core: &mut Core, selection: &ContentSelection) -> RecorderResult<ActiveRecording> {
        self.shared.preview.suspend();

        let settings = self.settings();
        let frame_size = selection.frame_size();
        tracing::info!("Video size: {}", frame_size);

        let output_path = self.shared.output.next_output_path(&settings)?;
        self.shared
            .encoder
            .setup(&output_path, &settings.encoding_profile(), frame_size)?;
        self.shared.encoder.start_writing()?;

        let config = CaptureConfiguration::derive(&settings, frame_size, selection.source_rect);
        core.stream.start(Some(selection), &config).await?;
        Ok(ActiveRecording::new(output_path))
    }

    /// Stop the current recording and finalize its file.
    ///
    /// Returns `None` when nothing was recording. Always ends in `Idle`;
    /// the outcome is also reported to the notification sink.
    pub async fn stop_recording(&self) -> RecorderResult<Option<RecordingSummary>> {
        let mut core = self.shared.core.lock().await;
        self.finish_recording(&mut core).await
    }

    async fn finish_recording(&self, core: &mut Core) -> RecorderResult<Option<RecordingSummary>> {
        if self.state() != RecordingState::Recording {
            return Ok(None);
        }

        self.set_state(RecordingState::Stopping);
        let duration = self.duration();
        self.shared.started_at.write().take();
        let active = self.shared.active.write().take();

        core.stream.stop().await;
        let frames_written = self.shared.encoder.frames_written();

        match self.shared.encoder.finish_writing().await {
            Ok(output_path) => {
                self.set_state(RecordingState::Idle);
                let finished_at = Utc::now();
                let summary = RecordingSummary {
                    id: active.as_ref().map(|a| a.id).unwrap_or_default(),
                    output_path,
                    duration_ms: duration.as_secs_f64() * 1000.0,
                    frames_written,
                    started_at: active.map(|a| a.started_at).unwrap_or(finished_at),
                    finished_at,
                };
                tracing::info!(
                    "Recording stopped and saved to: {} ({} frames, {:.0}ms)",
                    summary.output_path.display(),
                    summary.frames_written,
                    summary.duration_ms
                );
                self.shared.notifier.recording_saved(&summary);
                Ok(Some(summary))
            }
            Err(e) => {
                self.shared.encoder.cancel();
                self.set_state(RecordingState::Idle);
                let e = RecorderError::from(e);
                tracing::error!("Failed to stop recording: {}", e);
                let response = ErrorResponse::from(&e);
                *self.shared.last_error.write() = Some(response.clone());
                self.shared.notifier.recording_failed(&response);
                Err(e)
            }
        }
    }

    /// Salvage the recording when the stream it belongs to ends on its own.
    /// Terminations of earlier streams, or arriving after the recording was
    /// stopped, are ignored.
    async fn handle_termination(&self, ended: StreamEnded) {
        let mut core = self.shared.core.lock().await;
        if !self.is_recording() || !core.stream.is_running() || core.stream.generation() != ended.generation {
            tracing::debug!("Ignoring end of stream {}: {:?}", ended.generation, ended.reason);
            return;
        }

        let message = match ended.reason {
            StreamTermination::UserStopped => {
                tracing::info!("User stopped sharing, saving recording...");
                None
            }
            StreamTermination::Error(message) => {
                tracing::warn!("Stream stopped unexpectedly ({}), attempting to save recording...", message);
                let error = RecorderError::from(CaptureError::StreamInterrupted(message.clone()));
                *self.shared.last_error.write() = Some(ErrorResponse::from(&error));
                Some(message)
            }
        };
        self.shared.notifier.recording_stopped_unexpectedly(message.as_deref());

        if let Err(e) = self.finish_recording(&mut core).await {
            tracing::warn!("Could not save recording after stream ended: {}", e);
        }
    }

    fn set_state(&self, state: RecordingState) {
        let previous = std::mem::replace(&mut *self.shared.state.write(), state);
        if previous != state {
            tracing::debug!("Recording state: {:?} -> {:?}", previous, state);
        }
    }
}

async fn watch_terminations(shared: Weak<Shared>, mut terminations: mpsc::UnboundedReceiver<StreamEnded>) {
    while let Some(ended) = terminations.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        RecordingController { shared }.handle_termination(ended).await;
    }
}

/// `mm:ss`, or `h:mm:ss` from one hour on
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
