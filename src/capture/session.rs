//! Live capture stream session
//!
//! A `StreamSession` turns a content selection and capture configuration
//! into running sample delivery. Samples go straight to the registered
//! sink on the thread that produced them; unexpected stream ends are
//! reported once on the registered termination channel.

use super::config::CaptureConfiguration;
use super::microphone::MicrophoneInput;
use super::selection::ContentSelection;
use super::traits::{
    CaptureError, CaptureResult, CaptureSource, PermissionKind, PermissionProvider, StreamEnded, StreamOutput,
    StreamTermination,
};
use crate::media::{SampleBuffer, SampleSink, TrackKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Delivery endpoint handed to a running source.
///
/// Drops incomplete video frames, forwards everything else to the sink, and
/// lets at most one termination through. Closing it detaches both.
struct SessionOutput {
    generation: u64,
    sink: Arc<dyn SampleSink>,
    terminations: Mutex<Option<mpsc::UnboundedSender<StreamEnded>>>,
    active: AtomicBool,
    terminated: AtomicBool,
}

impl SessionOutput {
    fn new(generation: u64, sink: Arc<dyn SampleSink>, terminations: Option<mpsc::UnboundedSender<StreamEnded>>) -> Self {
        Self {
            generation,
            sink,
            terminations: Mutex::new(terminations),
            active: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
        }
    }

    fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.terminations.lock().take();
    }
}

impl StreamOutput for SessionOutput {
    fn deliver(&self, sample: SampleBuffer) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        if sample.kind == TrackKind::Video && !sample.is_complete() {
            tracing::trace!("Dropping {:?} video frame", sample.status);
            return;
        }
        self.sink.deliver(sample);
    }

    fn terminate(&self, reason: StreamTermination) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        match &reason {
            StreamTermination::UserStopped => tracing::info!("Capture stream stopped by user"),
            StreamTermination::Error(message) => tracing::error!("Capture stream stopped with error: {}", message),
        }
        if let Some(sender) = self.terminations.lock().as_ref() {
            let _ = sender.send(StreamEnded {
                generation: self.generation,
                reason,
            });
        }
    }
}

pub struct StreamSession {
    source: Box<dyn CaptureSource>,
    permissions: Arc<dyn PermissionProvider>,
    sink: Option<Arc<dyn SampleSink>>,
    terminations: Option<mpsc::UnboundedSender<StreamEnded>>,
    output: Option<Arc<SessionOutput>>,
    microphone: Option<MicrophoneInput>,
    generation: u64,
}

impl StreamSession {
    pub fn new(source: Box<dyn CaptureSource>, permissions: Arc<dyn PermissionProvider>) -> Self {
        Self {
            source,
            permissions,
            sink: None,
            terminations: None,
            output: None,
            microphone: None,
            generation: 0,
        }
    }

    /// Register the consumer of every delivered sample
    pub fn register_sink(&mut self, sink: Arc<dyn SampleSink>) {
        self.sink = Some(sink);
    }

    /// Register where unexpected stream ends are reported
    pub fn register_termination(&mut self, sender: mpsc::UnboundedSender<StreamEnded>) {
        self.terminations = Some(sender);
    }

    pub fn is_running(&self) -> bool {
        self.output.is_some()
    }

    /// Identifies the most recent start; terminations carry it
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Start capturing. Returns once the source reports it is running.
    pub async fn start(&mut self, selection: Option<&ContentSelection>, config: &CaptureConfiguration) -> CaptureResult<()> {
        let selection = selection.ok_or(CaptureError::NoContentSelected)?;

        let has_screen = self.permissions.has_screen_recording_permission();
        tracing::info!("Screen recording permission check: {}", has_screen);
        if !has_screen {
            self.permissions.request_screen_recording_permission();
            return Err(CaptureError::PermissionDenied(PermissionKind::ScreenRecording));
        }

        if config.captures_microphone && !self.permissions.has_microphone_permission() {
            let granted = self.permissions.request_microphone_permission().await;
            tracing::info!("Microphone permission request: {}", granted);
            if !granted {
                return Err(CaptureError::PermissionDenied(PermissionKind::Microphone));
            }
        }

        let sink = self
            .sink
            .clone()
            .ok_or_else(|| CaptureError::StreamCreationFailed("no sample consumer registered".to_string()))?;

        if self.is_running() {
            self.stop().await;
        }

        self.generation += 1;
        let output = Arc::new(SessionOutput::new(self.generation, sink, self.terminations.clone()));
        if let Err(e) = self.source.start(&selection.filter, config, output.clone()).await {
            output.close();
            return Err(e);
        }

        if config.captures_microphone && !self.source.captures_microphone() {
            match MicrophoneInput::open(config.microphone_device_id.as_deref(), output.clone()).await {
                Ok(input) => self.microphone = Some(input),
                Err(e) => {
                    output.close();
                    self.source.stop().await;
                    return Err(e);
                }
            }
        }

        self.output = Some(output);
        tracing::info!(
            "Capture stream started: {} ({}, system audio: {}, microphone: {})",
            selection.filter.target.description(),
            config.frame_size,
            config.captures_system_audio,
            config.captures_microphone
        );
        Ok(())
    }

    /// Swap the capture target without stopping delivery
    pub async fn update_filter(&mut self, selection: &ContentSelection) -> CaptureResult<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.source.update_filter(&selection.filter).await?;
        tracing::info!("Capture filter updated: {}", selection.filter.target.description());
        Ok(())
    }

    /// Stop delivery. Idempotent; terminations reported after this call are
    /// discarded.
    pub async fn stop(&mut self) {
        let Some(output) = self.output.take() else {
            return;
        };
        output.close();
        if let Some(mut microphone) = self.microphone.take() {
            microphone.stop();
        }
        self.source.stop().await;
        tracing::info!("Capture stream stopped");
    }
}
