//! Synthetic capture source
//!
//! Produces a moving test pattern and sine tones on one thread per track,
//! stamped with the host clock. Used by the command-line recorder and by
//! tests that need a live stream without OS capture.

use super::config::CaptureConfiguration;
use super::selection::ContentFilter;
use super::traits::{CaptureError, CaptureResult, CaptureSource, StreamOutput, StreamTermination};
use crate::media::{host_time_now, AudioBlock, FrameSize, FrameStatus, PixelFormat, SampleBuffer, TrackKind, VideoFrame};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const AUDIO_BLOCK: Duration = Duration::from_millis(10);
const SYSTEM_TONE_HZ: f32 = 440.0;
const MICROPHONE_TONE_HZ: f32 = 220.0;

#[derive(Debug, Clone, Default)]
pub struct SyntheticOptions {
    /// Mark every n-th video frame as idle
    pub incomplete_every: Option<u64>,
    /// Record the microphone tone in this source instead of a separate input
    pub captures_microphone: bool,
    /// Fail `start` with this message
    pub fail_start: Option<String>,
}

#[derive(Default)]
struct SyntheticShared {
    running: AtomicBool,
    output: Mutex<Option<Arc<dyn StreamOutput>>>,
    filter: Mutex<Option<ContentFilter>>,
    frames_delivered: AtomicU64,
    audio_blocks_delivered: AtomicU64,
    starts: AtomicU64,
}

impl SyntheticShared {
    /// End the stream from the source side and report why
    fn end(&self, reason: StreamTermination) {
        self.running.store(false, Ordering::SeqCst);
        let output = self.output.lock().clone();
        if let Some(output) = output {
            output.terminate(reason);
        }
    }
}

/// Remote control for a [`SyntheticSource`]
#[derive(Clone)]
pub struct SyntheticHandle {
    shared: Arc<SyntheticShared>,
}

impl SyntheticHandle {
    /// Behave like a user clicking "stop sharing"
    pub fn stop_sharing(&self) {
        tracing::info!("Synthetic source: sharing stopped by user");
        self.shared.end(StreamTermination::UserStopped);
    }

    /// Behave like an internal stream failure
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("Synthetic source failing: {}", message);
        self.shared.end(StreamTermination::Error(message));
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.shared.frames_delivered.load(Ordering::SeqCst)
    }

    pub fn audio_blocks_delivered(&self) -> u64 {
        self.shared.audio_blocks_delivered.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> u64 {
        self.shared.starts.load(Ordering::SeqCst)
    }

    pub fn current_filter(&self) -> Option<ContentFilter> {
        self.shared.filter.lock().clone()
    }
}

pub struct SyntheticSource {
    options: SyntheticOptions,
    shared: Arc<SyntheticShared>,
    threads: Vec<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(options: SyntheticOptions) -> Self {
        Self {
            options,
            shared: Arc::new(SyntheticShared::default()),
            threads: Vec::new(),
        }
    }

    pub fn handle(&self) -> SyntheticHandle {
        SyntheticHandle {
            shared: self.shared.clone(),
        }
    }

    fn spawn_track(&mut self, name: &str, body: impl FnOnce() + Send + 'static) -> CaptureResult<()> {
        let thread = std::thread::Builder::new()
            .name(format!("synthetic-{}", name))
            .spawn(body)
            .map_err(|e| CaptureError::StreamCreationFailed(format!("Failed to start {} thread: {}", name, e)))?;
        self.threads.push(thread);
        Ok(())
    }

    fn join_threads(&mut self) {
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(SyntheticOptions::default())
    }
}

#[async_trait]
impl CaptureSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn start(
        &mut self,
        filter: &ContentFilter,
        config: &CaptureConfiguration,
        output: Arc<dyn StreamOutput>,
    ) -> CaptureResult<()> {
        if let Some(message) = &self.options.fail_start {
            return Err(CaptureError::StreamCreationFailed(message.clone()));
        }
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::StreamCreationFailed("stream is already running".to_string()));
        }
        // Threads from a stream that ended on its own
        self.join_threads();

        *self.shared.filter.lock() = Some(filter.clone());
        *self.shared.output.lock() = Some(output.clone());
        self.shared.starts.fetch_add(1, Ordering::SeqCst);

        let interval = Duration::from_secs_f64(config.minimum_frame_interval.seconds().max(0.001));
        let size = config.frame_size;
        let pixel_format = config.pixel_format;
        let incomplete_every = self.options.incomplete_every;
        let shared = self.shared.clone();
        let video_output = output.clone();
        self.spawn_track("video", move || {
            let mut index = 0u64;
            while shared.running.load(Ordering::SeqCst) {
                let status = match incomplete_every {
                    Some(n) if n > 0 && index % n == n - 1 => FrameStatus::Idle,
                    _ => FrameStatus::Complete,
                };
                let frame = test_pattern(size, pixel_format, index);
                video_output.deliver(SampleBuffer::video(host_time_now(), status, frame));
                if status == FrameStatus::Complete {
                    shared.frames_delivered.fetch_add(1, Ordering::SeqCst);
                }
                index += 1;
                std::thread::sleep(interval);
            }
        })?;

        let mut tones = Vec::new();
        if config.captures_system_audio {
            tones.push((TrackKind::SystemAudio, SYSTEM_TONE_HZ));
        }
        if config.captures_microphone && self.options.captures_microphone {
            tones.push((TrackKind::Microphone, MICROPHONE_TONE_HZ));
        }
        for (track, frequency) in tones {
            let shared = self.shared.clone();
            let audio_output = output.clone();
            let sample_rate = config.sample_rate;
            let channels = config.channel_count;
            self.spawn_track(&track.to_string(), move || {
                let mut phase = 0.0f32;
                while shared.running.load(Ordering::SeqCst) {
                    let block = sine_block(sample_rate, channels, frequency, &mut phase);
                    audio_output.deliver(SampleBuffer::audio(track, host_time_now(), block));
                    shared.audio_blocks_delivered.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(AUDIO_BLOCK);
                }
            })?;
        }

        tracing::info!(
            "Synthetic capture started: {} @ {:.0}fps, target: {}",
            size,
            config.max_frame_rate(),
            filter.target.description()
        );
        Ok(())
    }

    async fn update_filter(&mut self, filter: &ContentFilter) -> CaptureResult<()> {
        *self.shared.filter.lock() = Some(filter.clone());
        tracing::info!("Synthetic capture retargeted to {}", filter.target.description());
        Ok(())
    }

    async fn stop(&mut self) {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        self.join_threads();
        *self.shared.output.lock() = None;
        if was_running {
            tracing::info!("Synthetic capture stopped");
        }
    }

    fn captures_microphone(&self) -> bool {
        self.options.captures_microphone
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.join_threads();
    }
}

/// A vertical bar sweeping across a dark background
fn test_pattern(size: FrameSize, pixel_format: PixelFormat, index: u64) -> VideoFrame {
    let mut data = vec![0u8; pixel_format.frame_len(size)];
    match pixel_format {
        PixelFormat::Bgra8 => {
            let width = size.width.max(1) as usize;
            let bar_width = (width / 16).max(1);
            let bar_start = (index as usize * 4) % width;
            for (i, pixel) in data.chunks_exact_mut(4).enumerate() {
                let x = i % width;
                let in_bar = x >= bar_start && x < bar_start + bar_width;
                let shade = if in_bar { 0xF0 } else { 0x20 };
                pixel.copy_from_slice(&[shade, shade, shade, 0xFF]);
            }
        }
        PixelFormat::YCbCr420TenBit => {
            // Mid-grey luma, neutral chroma, 10 bits in the high bits of each u16
            let luma = ((512u16 + (index % 256) as u16) << 6).to_le_bytes();
            let chroma = (512u16 << 6).to_le_bytes();
            let luma_len = size.pixel_count() as usize * 2;
            let (luma_plane, chroma_plane) = data.split_at_mut(luma_len);
            for sample in luma_plane.chunks_exact_mut(2) {
                sample.copy_from_slice(&luma);
            }
            for sample in chroma_plane.chunks_exact_mut(2) {
                sample.copy_from_slice(&chroma);
            }
        }
    }
    VideoFrame {
        size,
        pixel_format,
        data,
    }
}

fn sine_block(sample_rate: u32, channels: u16, frequency: f32, phase: &mut f32) -> AudioBlock {
    let frames = (sample_rate as u64 * AUDIO_BLOCK.as_millis() as u64 / 1000) as usize;
    let step = std::f32::consts::TAU * frequency / sample_rate.max(1) as f32;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for _ in 0..frames {
        let value = phase.sin() * 0.2;
        for _ in 0..channels {
            samples.push(value);
        }
        *phase = (*phase + step) % std::f32::consts::TAU;
    }
    AudioBlock {
        sample_rate,
        channels,
        samples,
    }
}
