//! Recording notifications
//!
//! The controller reports outcomes through a `NotificationSink`. Sinks are
//! fire-and-forget: they run on the control context and must not block.

use super::state::RecordingSummary;
use crate::utils::error::ErrorResponse;
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

pub trait NotificationSink: Send + Sync {
    fn recording_started(&self, _id: Uuid, _output_path: &std::path::Path) {}

    fn recording_saved(&self, summary: &RecordingSummary);

    fn recording_failed(&self, error: &ErrorResponse);

    /// The capture stream ended on its own. `None` when the user stopped
    /// sharing, otherwise the stream's error message.
    fn recording_stopped_unexpectedly(&self, error: Option<&str>);
}

/// Events emitted during recording
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    Started { id: Uuid, output_path: PathBuf },
    Saved(RecordingSummary),
    Failed(ErrorResponse),
    StoppedUnexpectedly(Option<String>),
}

/// Broadcasts every notification as a [`RecordingEvent`]
pub struct EventNotifier {
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl EventNotifier {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self { event_tx }
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: RecordingEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for EventNotifier {
    fn recording_started(&self, id: Uuid, output_path: &std::path::Path) {
        self.emit(RecordingEvent::Started {
            id,
            output_path: output_path.to_path_buf(),
        });
    }

    fn recording_saved(&self, summary: &RecordingSummary) {
        self.emit(RecordingEvent::Saved(summary.clone()));
    }

    fn recording_failed(&self, error: &ErrorResponse) {
        self.emit(RecordingEvent::Failed(error.clone()));
    }

    fn recording_stopped_unexpectedly(&self, error: Option<&str>) {
        self.emit(RecordingEvent::StoppedUnexpectedly(error.map(str::to_string)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_every_subscriber() {
        let notifier = EventNotifier::new();
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.recording_stopped_unexpectedly(Some("display disconnected"));
        notifier.recording_failed(&ErrorResponse::new("NO_FRAMES_WRITTEN", "No frames were written"));

        for rx in [&mut first, &mut second] {
            assert_eq!(
                rx.recv().await.unwrap(),
                RecordingEvent::StoppedUnexpectedly(Some("display disconnected".to_string()))
            );
            assert!(matches!(rx.recv().await.unwrap(), RecordingEvent::Failed(e) if e.code == "NO_FRAMES_WRITTEN"));
        }
    }

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let notifier = EventNotifier::default();
        notifier.recording_stopped_unexpectedly(None);
    }
}
