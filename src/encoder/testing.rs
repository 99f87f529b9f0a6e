//! In-memory container writer used by encoder and controller tests

use super::writer::{ContainerWriter, WriterConfig, WriterError, WriterFactory, WriterStatus};
use crate::media::{MediaTime, SampleBuffer, TrackKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared view into every writer a `MemoryWriterFactory` creates
#[derive(Default)]
pub(crate) struct WriterProbe {
    pub appended: Mutex<Vec<(TrackKind, MediaTime)>>,
    pub session_start: Mutex<Option<MediaTime>>,
    pub blocked: Mutex<HashSet<TrackKind>>,
    pub fail_finish: AtomicBool,
    pub fail_create: AtomicBool,
    pub created: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl WriterProbe {
    pub fn accepted(&self, track: TrackKind) -> Vec<MediaTime> {
        self.appended
            .lock()
            .iter()
            .filter(|(kind, _)| *kind == track)
            .map(|(_, time)| *time)
            .collect()
    }

    pub fn block(&self, track: TrackKind) {
        self.blocked.lock().insert(track);
    }

    pub fn unblock(&self, track: TrackKind) {
        self.blocked.lock().remove(&track);
    }
}

#[derive(Default)]
pub(crate) struct MemoryWriterFactory {
    pub probe: Arc<WriterProbe>,
}

impl WriterFactory for MemoryWriterFactory {
    fn create(&self, config: &WriterConfig) -> Result<Arc<dyn ContainerWriter>, WriterError> {
        if self.probe.fail_create.load(Ordering::SeqCst) {
            return Err(WriterError::Creation("simulated creation failure".to_string()));
        }
        self.probe.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryWriter {
            config: config.clone(),
            probe: self.probe.clone(),
            status: Mutex::new(WriterStatus::Unknown),
            inputs_finished: AtomicBool::new(false),
        }))
    }
}

pub(crate) struct MemoryWriter {
    config: WriterConfig,
    probe: Arc<WriterProbe>,
    status: Mutex<WriterStatus>,
    inputs_finished: AtomicBool,
}

#[async_trait]
impl ContainerWriter for MemoryWriter {
    fn start_writing(&self) -> Result<(), WriterError> {
        let mut status = self.status.lock();
        if *status != WriterStatus::Unknown {
            return Err(WriterError::NotWriting);
        }
        *status = WriterStatus::Writing;
        Ok(())
    }

    fn start_session(&self, at: MediaTime) {
        *self.probe.session_start.lock() = Some(at);
    }

    fn is_ready_for_more(&self, track: TrackKind) -> bool {
        *self.status.lock() == WriterStatus::Writing
            && !self.inputs_finished.load(Ordering::SeqCst)
            && self.config.has_track(track)
            && !self.probe.blocked.lock().contains(&track)
    }

    fn append(&self, sample: SampleBuffer) -> Result<(), WriterError> {
        if !self.is_ready_for_more(sample.kind) {
            return Err(WriterError::NotReady(sample.kind));
        }
        self.probe.appended.lock().push((sample.kind, sample.presentation_time));
        Ok(())
    }

    fn mark_finished(&self) {
        self.inputs_finished.store(true, Ordering::SeqCst);
    }

    async fn finish(&self) {
        tokio::task::yield_now().await;
        let appended = self.probe.appended.lock().len();
        let contents = format!("memory container: {appended} samples\n");
        if let Err(e) = std::fs::write(&self.config.output_path, contents) {
            *self.status.lock() = WriterStatus::Failed(e.to_string());
            return;
        }
        *self.status.lock() = if self.probe.fail_finish.load(Ordering::SeqCst) {
            WriterStatus::Failed("simulated finalize failure".to_string())
        } else {
            WriterStatus::Completed
        };
    }

    fn cancel(&self) {
        self.probe.cancelled.fetch_add(1, Ordering::SeqCst);
        *self.status.lock() = WriterStatus::Cancelled;
    }

    fn status(&self) -> WriterStatus {
        self.status.lock().clone()
    }
}
