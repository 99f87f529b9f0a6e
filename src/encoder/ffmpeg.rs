//! FFmpeg-backed container writer
//!
//! Video frames are piped as raw pixels into a long-running ffmpeg encoder
//! that writes an intermediate Matroska file. Audio tracks are spooled to
//! raw f32 files. `finish` closes the encoder and runs a short mux pass that
//! aligns every track on the session timeline and writes the final
//! container.

use super::profile::{AudioCodec, ContainerFormat, VideoCodec, VideoSettings};
use super::writer::{ContainerWriter, WriterConfig, WriterError, WriterFactory, WriterStatus};
use crate::media::{MediaTime, PixelFormat, SampleBuffer, SamplePayload, TrackKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use tempfile::TempDir;

/// Frames that may wait for the encoder before the video track reports
/// backpressure
const DEFAULT_QUEUE_DEPTH: usize = 8;

const VIDEO_SPOOL: &str = "video.mkv";

/// Creates an [`FfmpegWriter`] per recording
#[derive(Debug, Clone)]
pub struct FfmpegWriterFactory {
    ffmpeg: PathBuf,
    queue_depth: usize,
}

impl FfmpegWriterFactory {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Check that the ffmpeg binary can be executed
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegWriterFactory {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl WriterFactory for FfmpegWriterFactory {
    fn create(&self, config: &WriterConfig) -> Result<Arc<dyn ContainerWriter>, WriterError> {
        let writer = FfmpegWriter::create(config.clone(), self.ffmpeg.clone(), self.queue_depth)?;
        Ok(Arc::new(writer))
    }
}

/// Maps presentation times onto fixed frame slots at the output rate.
///
/// A frame landing on a slot that is already filled is dropped; slots
/// skipped between two frames are filled by repeating the earlier frame.
#[derive(Debug)]
pub(crate) struct FramePacer {
    fps: u32,
    next_slot: u64,
}

impl FramePacer {
    pub(crate) fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            next_slot: 0,
        }
    }

    /// Place a frame `offset` seconds after the session start.
    ///
    /// Returns the number of empty slots to fill before this frame, or
    /// `None` when the frame should be dropped.
    #[cfg(test)]
    pub(crate) fn place(&mut self, offset: f64) -> Option<u64> {
        let (slot, gap) = self.plan(offset)?;
        self.commit(slot);
        Some(gap)
    }

    /// Slot and gap for a frame without claiming the slot
    pub(crate) fn plan(&self, offset: f64) -> Option<(u64, u64)> {
        let slot = (offset.max(0.0) * self.fps as f64).round() as u64;
        if slot < self.next_slot {
            return None;
        }
        Some((slot, slot - self.next_slot))
    }

    pub(crate) fn commit(&mut self, slot: u64) {
        self.next_slot = slot + 1;
    }

    pub(crate) fn frames_placed(&self) -> u64 {
        self.next_slot
    }
}

/// One placed frame: the gap fill, if any, followed by the frame itself.
/// Queued as a unit so a full queue never splits a slot.
struct FrameJob {
    fill: Option<(Arc<Vec<u8>>, u64)>,
    data: Arc<Vec<u8>>,
    copies: u64,
}

impl FrameJob {
    fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        if let Some((fill, copies)) = &self.fill {
            for _ in 0..*copies {
                out.write_all(fill)?;
            }
        }
        for _ in 0..self.copies {
            out.write_all(&self.data)?;
        }
        Ok(())
    }
}

/// Paces frames onto the constant-rate timeline and queues them for the
/// writer thread. A slot is only claimed once its job is queued.
struct FrameQueue {
    sender: SyncSender<FrameJob>,
    queued: Arc<AtomicUsize>,
    pacer: FramePacer,
    previous: Option<Arc<Vec<u8>>>,
}

impl FrameQueue {
    fn new(sender: SyncSender<FrameJob>, queued: Arc<AtomicUsize>, fps: u32) -> Self {
        Self {
            sender,
            queued,
            pacer: FramePacer::new(fps),
            previous: None,
        }
    }

    /// Queue a frame `offset` seconds after the session start. Returns
    /// `Ok(false)` when the frame shares a slot with the previous one.
    fn push(&mut self, offset: f64, data: Vec<u8>) -> Result<bool, TrySendError<()>> {
        let Some((slot, gap)) = self.pacer.plan(offset) else {
            return Ok(false);
        };

        let data = Arc::new(data);
        let job = match (&self.previous, gap) {
            (_, 0) => FrameJob { fill: None, data: data.clone(), copies: 1 },
            (Some(previous), gap) => FrameJob {
                fill: Some((previous.clone(), gap)),
                data: data.clone(),
                copies: 1,
            },
            (None, gap) => FrameJob { fill: None, data: data.clone(), copies: gap + 1 },
        };

        self.queued.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.sender.try_send(job) {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(match e {
                TrySendError::Full(_) => TrySendError::Full(()),
                TrySendError::Disconnected(_) => TrySendError::Disconnected(()),
            });
        }
        self.pacer.commit(slot);
        self.previous = Some(data);
        Ok(true)
    }
}

struct VideoPipe {
    queue: FrameQueue,
    worker: JoinHandle<std::io::Result<()>>,
    child: Child,
}

impl VideoPipe {
    fn spawn(
        ffmpeg: &Path,
        args: &[String],
        queue_depth: usize,
        queued: Arc<AtomicUsize>,
        fps: u32,
    ) -> Result<Self, WriterError> {
        let mut child = Command::new(ffmpeg)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| WriterError::Creation(format!("Failed to start FFmpeg encoder: {}", e)))?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(WriterError::Creation("Failed to capture FFmpeg stdin".to_string()));
            }
        };

        let (sender, receiver) = mpsc::sync_channel(queue_depth);
        let pump_queued = queued.clone();
        let worker = std::thread::Builder::new()
            .name("ffmpeg-video-writer".to_string())
            .spawn(move || pump_frames(stdin, receiver, pump_queued))
            .map_err(|e| WriterError::Creation(format!("Failed to start writer thread: {}", e)))?;

        Ok(Self {
            queue: FrameQueue::new(sender, queued, fps),
            worker,
            child,
        })
    }

    /// Close the encoder input and wait for ffmpeg to exit. Blocking.
    fn close(self) -> Result<u64, String> {
        let frames = self.queue.pacer.frames_placed();
        drop(self.queue);

        let pumped = self
            .worker
            .join()
            .map_err(|_| "video writer thread panicked".to_string())?;

        let output = self
            .child
            .wait_with_output()
            .map_err(|e| format!("Failed to wait for FFmpeg encoder: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("FFmpeg encoder exited with {}: {}", output.status, stderr.trim()));
        }
        pumped.map_err(|e| format!("Failed to write frames to FFmpeg: {}", e))?;
        Ok(frames)
    }

    fn kill(mut self) {
        let _ = self.child.kill();
        drop(self.queue);
        let _ = self.worker.join();
        let _ = self.child.wait();
    }
}

fn pump_frames(mut stdin: ChildStdin, receiver: Receiver<FrameJob>, queued: Arc<AtomicUsize>) -> std::io::Result<()> {
    let mut result = Ok(());
    for job in receiver {
        if result.is_ok() {
            result = job.write_to(&mut stdin);
        }
        queued.fetch_sub(1, Ordering::AcqRel);
    }
    drop(stdin);
    result
}

/// Raw f32 PCM spool for one audio track
struct AudioSpool {
    kind: TrackKind,
    path: PathBuf,
    file: BufWriter<File>,
    first_presentation_time: Option<MediaTime>,
    sample_rate: u32,
    channels: u16,
}

impl AudioSpool {
    fn create(kind: TrackKind, dir: &Path) -> Result<Self, WriterError> {
        let path = dir.join(format!("{}.f32", kind));
        let file = File::create(&path)
            .map_err(|e| WriterError::Creation(format!("Failed to create {} spool: {}", kind, e)))?;
        Ok(Self {
            kind,
            path,
            file: BufWriter::new(file),
            first_presentation_time: None,
            sample_rate: 0,
            channels: 0,
        })
    }

    fn append(&mut self, presentation_time: MediaTime, sample_rate: u32, channels: u16, samples: &[f32]) -> Result<(), WriterError> {
        match self.first_presentation_time {
            None => {
                self.first_presentation_time = Some(presentation_time);
                self.sample_rate = sample_rate;
                self.channels = channels;
            }
            Some(_) if sample_rate != self.sample_rate || channels != self.channels => {
                return Err(WriterError::InvalidSample(format!(
                    "{} format changed from {} Hz/{}ch to {} Hz/{}ch",
                    self.kind, self.sample_rate, self.channels, sample_rate, channels
                )));
            }
            Some(_) => {}
        }

        for sample in samples {
            self.file
                .write_all(&sample.to_le_bytes())
                .map_err(|e| WriterError::Encoding(format!("Failed to spool {}: {}", self.kind, e)))?;
        }
        Ok(())
    }

    /// Flush the spool; `None` if the track never received audio
    fn close(mut self, session_start: MediaTime) -> Result<Option<AudioInput>, String> {
        self.file
            .flush()
            .map_err(|e| format!("Failed to flush {} spool: {}", self.kind, e))?;
        Ok(self.first_presentation_time.map(|first| AudioInput {
            kind: self.kind,
            path: self.path,
            offset_seconds: first.seconds_since(session_start),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }))
    }
}

/// A spooled audio track ready to be muxed
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AudioInput {
    pub kind: TrackKind,
    pub path: PathBuf,
    /// Start of the track relative to the session start
    pub offset_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

struct WriterInner {
    status: WriterStatus,
    inputs_finished: bool,
    session_start: Option<MediaTime>,
    video: Option<VideoPipe>,
    system_audio: Option<AudioSpool>,
    microphone: Option<AudioSpool>,
}

/// Container writer that drives the ffmpeg command-line tool
pub struct FfmpegWriter {
    config: WriterConfig,
    ffmpeg: PathBuf,
    queue_depth: usize,
    queued: Arc<AtomicUsize>,
    spool: Mutex<Option<TempDir>>,
    inner: Mutex<WriterInner>,
}

impl FfmpegWriter {
    /// Create the spool directory next to the output file and start the
    /// video encoder.
    pub fn create(config: WriterConfig, ffmpeg: PathBuf, queue_depth: usize) -> Result<Self, WriterError> {
        let parent = config
            .output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let spool = tempfile::Builder::new()
            .prefix(".capture-")
            .tempdir_in(parent)
            .map_err(|e| WriterError::Creation(format!("Failed to create spool directory: {}", e)))?;

        let system_audio = match config.system_audio {
            Some(_) => Some(AudioSpool::create(TrackKind::SystemAudio, spool.path())?),
            None => None,
        };
        let microphone = match config.microphone {
            Some(_) => Some(AudioSpool::create(TrackKind::Microphone, spool.path())?),
            None => None,
        };

        let queued = Arc::new(AtomicUsize::new(0));
        let args = video_encode_args(&config.video, &spool.path().join(VIDEO_SPOOL));
        let video = VideoPipe::spawn(
            &ffmpeg,
            &args,
            queue_depth,
            queued.clone(),
            config.video.expected_frame_rate,
        )?;

        tracing::info!(
            "Started FFmpeg writer: {} {:?} @ {}fps, output: {:?}",
            config.video.size,
            config.video.codec,
            config.video.expected_frame_rate,
            config.output_path
        );

        Ok(Self {
            config,
            ffmpeg,
            queue_depth,
            queued,
            spool: Mutex::new(Some(spool)),
            inner: Mutex::new(WriterInner {
                status: WriterStatus::Unknown,
                inputs_finished: false,
                session_start: None,
                video: Some(video),
                system_audio,
                microphone,
            }),
        })
    }

    fn append_video(&self, inner: &mut WriterInner, presentation_time: MediaTime, data: Vec<u8>) -> Result<(), WriterError> {
        let session_start = inner.session_start.unwrap_or(presentation_time);
        let pipe = inner.video.as_mut().ok_or(WriterError::NotWriting)?;

        match pipe.queue.push(presentation_time.seconds_since(session_start), data) {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::trace!("Frame at {} shares a slot with the previous frame", presentation_time);
                Ok(())
            }
            Err(TrySendError::Full(())) => Err(WriterError::NotReady(TrackKind::Video)),
            Err(TrySendError::Disconnected(())) => {
                inner.status = WriterStatus::Failed("FFmpeg video encoder stopped accepting frames".to_string());
                Err(WriterError::Encoding("video encoder disconnected".to_string()))
            }
        }
    }

    fn remove_output(&self) {
        if let Err(e) = std::fs::remove_file(&self.config.output_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove cancelled output {:?}: {}", self.config.output_path, e);
            }
        }
    }
}

#[async_trait]
impl ContainerWriter for FfmpegWriter {
    fn start_writing(&self) -> Result<(), WriterError> {
        let mut inner = self.inner.lock();
        if inner.status != WriterStatus::Unknown {
            return Err(WriterError::NotWriting);
        }
        inner.status = WriterStatus::Writing;
        Ok(())
    }

    fn start_session(&self, at: MediaTime) {
        let mut inner = self.inner.lock();
        if inner.session_start.is_none() {
            inner.session_start = Some(at);
        }
    }

    fn is_ready_for_more(&self, track: TrackKind) -> bool {
        let inner = self.inner.lock();
        if inner.status != WriterStatus::Writing || inner.inputs_finished || !self.config.has_track(track) {
            return false;
        }
        match track {
            TrackKind::Video => self.queued.load(Ordering::Acquire) < self.queue_depth,
            TrackKind::SystemAudio | TrackKind::Microphone => true,
        }
    }

    fn append(&self, sample: SampleBuffer) -> Result<(), WriterError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.status != WriterStatus::Writing || inner.inputs_finished {
            return Err(WriterError::NotWriting);
        }
        if !self.config.has_track(sample.kind) {
            return Err(WriterError::TrackNotConfigured(sample.kind));
        }

        let presentation_time = sample.presentation_time;
        match (sample.kind, sample.payload) {
            (TrackKind::Video, SamplePayload::Video(frame)) => {
                let expected = self.config.video.pixel_format.frame_len(self.config.video.size);
                if frame.size != self.config.video.size
                    || frame.pixel_format != self.config.video.pixel_format
                    || frame.data.len() != expected
                {
                    return Err(WriterError::InvalidSample(format!(
                        "expected {} {:?} frame, got {} {:?} ({} bytes)",
                        self.config.video.size,
                        self.config.video.pixel_format,
                        frame.size,
                        frame.pixel_format,
                        frame.data.len()
                    )));
                }
                self.append_video(inner, presentation_time, frame.data)
            }
            (kind @ (TrackKind::SystemAudio | TrackKind::Microphone), SamplePayload::Audio(block)) => {
                let spool = match kind {
                    TrackKind::SystemAudio => inner.system_audio.as_mut(),
                    _ => inner.microphone.as_mut(),
                };
                let spool = spool.ok_or(WriterError::TrackNotConfigured(kind))?;
                spool.append(presentation_time, block.sample_rate, block.channels, &block.samples)
            }
            (kind, _) => Err(WriterError::InvalidSample(format!("payload does not match {} track", kind))),
        }
    }

    fn mark_finished(&self) {
        self.inner.lock().inputs_finished = true;
    }

    async fn finish(&self) {
        let (video, system_audio, microphone, session_start) = {
            let mut inner = self.inner.lock();
            if matches!(inner.status, WriterStatus::Cancelled | WriterStatus::Completed | WriterStatus::Unknown) {
                return;
            }
            inner.inputs_finished = true;
            (
                inner.video.take(),
                inner.system_audio.take(),
                inner.microphone.take(),
                inner.session_start.unwrap_or(MediaTime::ZERO),
            )
        };

        let result = self.finalize(video, [system_audio, microphone], session_start).await;

        let mut inner = self.inner.lock();
        if inner.status == WriterStatus::Cancelled {
            self.remove_output();
            return;
        }
        match result {
            Ok(frames) => {
                if let WriterStatus::Failed(_) = inner.status {
                    return;
                }
                tracing::info!("FFmpeg writer finished: {} frames, output: {:?}", frames, self.config.output_path);
                inner.status = WriterStatus::Completed;
            }
            Err(message) => {
                tracing::error!("FFmpeg writer failed: {}", message);
                inner.status = WriterStatus::Failed(message);
            }
        }
        drop(inner);
        self.spool.lock().take();
    }

    fn cancel(&self) {
        let (video, spool) = {
            let mut inner = self.inner.lock();
            inner.status = WriterStatus::Cancelled;
            inner.inputs_finished = true;
            inner.system_audio = None;
            inner.microphone = None;
            (inner.video.take(), self.spool.lock().take())
        };
        if let Some(video) = video {
            video.kill();
        }
        drop(spool);
        self.remove_output();
    }

    fn status(&self) -> WriterStatus {
        self.inner.lock().status.clone()
    }
}

impl FfmpegWriter {
    async fn finalize(
        &self,
        video: Option<VideoPipe>,
        audio: [Option<AudioSpool>; 2],
        session_start: MediaTime,
    ) -> Result<u64, String> {
        let video = video.ok_or_else(|| "video encoder is not running".to_string())?;
        let frames = tokio::task::spawn_blocking(move || video.close())
            .await
            .map_err(|e| format!("video encoder task failed: {}", e))??;

        let mut inputs = Vec::new();
        for spool in audio.into_iter().flatten() {
            if let Some(input) = spool.close(session_start)? {
                inputs.push(input);
            }
        }

        let spool_dir = self
            .spool
            .lock()
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| "spool directory was removed".to_string())?;

        let args = mux_args(&self.config, &spool_dir.join(VIDEO_SPOOL), &inputs);
        let output = tokio::process::Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| format!("Failed to run FFmpeg mux: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("FFmpeg mux exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(frames)
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if let Some(video) = self.inner.get_mut().video.take() {
            video.kill();
        }
    }
}

fn quiet_args() -> Vec<String> {
    ["-hide_banner", "-loglevel", "error", "-nostats", "-y"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Arguments for the raw-video encoder process
pub(crate) fn video_encode_args(video: &VideoSettings, spool_path: &Path) -> Vec<String> {
    let input_format = match video.pixel_format {
        PixelFormat::Bgra8 => "bgra",
        PixelFormat::YCbCr420TenBit => "p010le",
    };

    let mut args = quiet_args();
    args.extend(
        [
            "-f",
            "rawvideo",
            "-pix_fmt",
            input_format,
            "-video_size",
            &video.size.to_string(),
            "-framerate",
            &video.expected_frame_rate.to_string(),
            "-i",
            "-",
        ]
        .map(String::from),
    );

    let output_format = match (video.codec, video.alpha) {
        (VideoCodec::H264, _) => "yuv420p",
        (VideoCodec::Hevc, false) => "yuv420p",
        (VideoCodec::Hevc, true) => "yuva420p",
        (VideoCodec::ProRes422, _) => "yuv422p10le",
        (VideoCodec::ProRes4444, _) => "yuva444p10le",
    };
    let encoder: &[&str] = match video.codec {
        VideoCodec::H264 => &["-c:v", "libx264", "-preset", "veryfast"],
        VideoCodec::Hevc => &["-c:v", "libx265", "-preset", "fast", "-x265-params", "log-level=error"],
        VideoCodec::ProRes422 => &["-c:v", "prores_ks", "-profile:v", "2"],
        VideoCodec::ProRes4444 => &["-c:v", "prores_ks", "-profile:v", "4"],
    };
    args.extend(encoder.iter().map(|s| s.to_string()));
    args.extend(["-pix_fmt".to_string(), output_format.to_string()]);

    if let Some(bitrate) = video.average_bitrate {
        args.extend(["-b:v".to_string(), bitrate.to_string()]);
    }
    if let Some(interval) = video.max_keyframe_interval {
        args.extend(["-g".to_string(), interval.to_string()]);
    }
    if let Some(color) = video.color {
        args.extend(
            [
                "-color_primaries",
                color.primaries,
                "-color_trc",
                color.transfer_function,
                "-colorspace",
                color.matrix,
            ]
            .map(String::from),
        );
    }

    args.extend(["-an".to_string(), "-f".to_string(), "matroska".to_string()]);
    args.push(spool_path.to_string_lossy().into_owned());
    args
}

/// Arguments for the final mux pass
pub(crate) fn mux_args(config: &WriterConfig, video_spool: &Path, audio: &[AudioInput]) -> Vec<String> {
    let mut args = quiet_args();
    args.extend(["-i".to_string(), video_spool.to_string_lossy().into_owned()]);

    for input in audio {
        // Audio that started before the session is trimmed; later audio is delayed
        if input.offset_seconds >= 0.0 {
            args.extend(["-itsoffset".to_string(), format!("{:.6}", input.offset_seconds)]);
        } else {
            args.extend(["-ss".to_string(), format!("{:.6}", -input.offset_seconds)]);
        }
        args.extend([
            "-f".to_string(),
            "f32le".to_string(),
            "-ar".to_string(),
            input.sample_rate.to_string(),
            "-ac".to_string(),
            input.channels.to_string(),
            "-i".to_string(),
            input.path.to_string_lossy().into_owned(),
        ]);
    }

    args.extend(["-map".to_string(), "0:v:0".to_string()]);
    for index in 1..=audio.len() {
        args.extend(["-map".to_string(), format!("{}:a:0", index)]);
    }

    args.extend(["-c:v".to_string(), "copy".to_string()]);
    if config.video.codec == VideoCodec::Hevc {
        args.extend(["-tag:v".to_string(), "hvc1".to_string()]);
    }

    for (index, input) in audio.iter().enumerate() {
        let settings = match input.kind {
            TrackKind::Microphone => config.microphone,
            _ => config.system_audio,
        };
        let Some(settings) = settings else { continue };
        match settings.codec {
            AudioCodec::Aac => {
                args.extend([format!("-c:a:{}", index), "aac".to_string()]);
                if let Some(bitrate) = settings.bitrate {
                    args.extend([format!("-b:a:{}", index), bitrate.to_string()]);
                }
            }
            AudioCodec::Pcm => {
                let codec = match settings.bit_depth {
                    Some(24) => "pcm_s24le",
                    Some(32) => "pcm_s32le",
                    _ => "pcm_s16le",
                };
                args.extend([format!("-c:a:{}", index), codec.to_string()]);
            }
        }
        args.extend([
            format!("-ar:a:{}", index),
            settings.sample_rate.to_string(),
            format!("-ac:a:{}", index),
            settings.channels.to_string(),
            format!("-metadata:s:a:{}", index),
            format!("title={}", track_title(input.kind)),
        ]);
    }

    let container = match config.container {
        ContainerFormat::Mov => "mov",
        ContainerFormat::Mp4 => "mp4",
    };
    args.extend(["-movflags", "+faststart", "-f", container].map(String::from));
    args.push(config.output_path.to_string_lossy().into_owned());
    args
}

fn track_title(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::Video => "Video",
        TrackKind::SystemAudio => "System Audio",
        TrackKind::Microphone => "Microphone",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::profile::{AudioSettings, EncodingProfile, FrameRate, VideoQuality};
    use crate::media::FrameSize;

    fn profile(codec: VideoCodec) -> EncodingProfile {
        EncodingProfile {
            video_codec: codec,
            quality: VideoQuality::Medium,
            frame_rate: FrameRate::Fps30,
            ..EncodingProfile::default()
        }
    }

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        position(args, flag).and_then(|i| args.get(i + 1)).map(|s| s.as_str())
    }

    #[test]
    fn test_pacer_drops_frames_sharing_a_slot() {
        let mut pacer = FramePacer::new(30);
        assert_eq!(pacer.place(0.0), Some(0));
        assert_eq!(pacer.place(0.01), None);
        assert_eq!(pacer.place(1.0 / 30.0), Some(0));
        assert_eq!(pacer.frames_placed(), 2);
    }

    #[test]
    fn test_pacer_reports_gaps() {
        let mut pacer = FramePacer::new(10);
        assert_eq!(pacer.place(0.0), Some(0));
        assert_eq!(pacer.place(0.5), Some(4));
        assert_eq!(pacer.frames_placed(), 6);
    }

    #[test]
    fn test_pacer_clamps_frames_before_session_start() {
        let mut pacer = FramePacer::new(60);
        assert_eq!(pacer.place(-0.2), Some(0));
        assert_eq!(pacer.place(-0.1), None);
    }

    #[test]
    fn test_h264_encode_args() {
        let video = VideoSettings::derive(&profile(VideoCodec::H264), FrameSize::new(1920, 1080));
        let args = video_encode_args(&video, Path::new("/tmp/spool/video.mkv"));

        assert_eq!(value_after(&args, "-pix_fmt"), Some("bgra"));
        assert_eq!(value_after(&args, "-video_size"), Some("1920x1080"));
        assert_eq!(value_after(&args, "-framerate"), Some("30"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-b:v"), Some("4976640"));
        assert_eq!(value_after(&args, "-g"), Some("60"));
        assert!(position(&args, "-color_trc").is_none());
        assert_eq!(args.last().map(|s| s.as_str()), Some("/tmp/spool/video.mkv"));
    }

    #[test]
    fn test_prores_hdr_encode_args() {
        let mut hdr = profile(VideoCodec::ProRes4444);
        hdr.capture_hdr = true;
        let video = VideoSettings::derive(&hdr, FrameSize::new(1280, 720));
        let args = video_encode_args(&video, Path::new("video.mkv"));

        assert_eq!(value_after(&args, "-pix_fmt"), Some("p010le"));
        assert_eq!(value_after(&args, "-c:v"), Some("prores_ks"));
        assert_eq!(value_after(&args, "-profile:v"), Some("4"));
        assert_eq!(value_after(&args, "-color_trc"), Some("arib-std-b67"));
        assert!(position(&args, "-b:v").is_none());
        assert!(args.iter().any(|a| a == "yuva444p10le"));
    }

    #[test]
    fn test_mux_args_align_audio() {
        let mut with_audio = profile(VideoCodec::Hevc);
        with_audio.capture_system_audio = true;
        with_audio.capture_microphone = true;
        let config = WriterConfig {
            output_path: PathBuf::from("/tmp/out.mov"),
            container: ContainerFormat::Mov,
            video: VideoSettings::derive(&with_audio, FrameSize::new(640, 480)),
            system_audio: Some(AudioSettings::for_codec(AudioCodec::Aac)),
            microphone: Some(AudioSettings::for_codec(AudioCodec::Aac)),
        };
        let inputs = vec![
            AudioInput {
                kind: TrackKind::SystemAudio,
                path: PathBuf::from("system-audio.f32"),
                offset_seconds: 0.25,
                sample_rate: 48_000,
                channels: 2,
            },
            AudioInput {
                kind: TrackKind::Microphone,
                path: PathBuf::from("microphone.f32"),
                offset_seconds: -0.5,
                sample_rate: 44_100,
                channels: 1,
            },
        ];

        let args = mux_args(&config, Path::new("video.mkv"), &inputs);

        assert_eq!(value_after(&args, "-itsoffset"), Some("0.250000"));
        assert_eq!(value_after(&args, "-ss"), Some("0.500000"));
        assert_eq!(value_after(&args, "-tag:v"), Some("hvc1"));
        assert_eq!(value_after(&args, "-c:a:1"), Some("aac"));
        assert_eq!(value_after(&args, "-b:a:0"), Some("256000"));
        assert_eq!(value_after(&args, "-ac:a:1"), Some("2"));
        assert!(args.iter().any(|a| a == "2:a:0"));
        assert_eq!(value_after(&args, "-movflags"), Some("+faststart"));
        assert_eq!(args.last().map(|s| s.as_str()), Some("/tmp/out.mov"));
    }

    #[test]
    fn test_mux_args_pcm_without_audio_inputs() {
        let config = WriterConfig {
            output_path: PathBuf::from("out.mov"),
            container: ContainerFormat::Mov,
            video: VideoSettings::derive(&profile(VideoCodec::H264), FrameSize::new(2, 2)),
            system_audio: Some(AudioSettings::for_codec(AudioCodec::Pcm)),
            microphone: None,
        };
        let args = mux_args(&config, Path::new("video.mkv"), &[]);
        assert!(position(&args, "-c:a:0").is_none());
        assert!(position(&args, "-tag:v").is_none());
        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 1);
    }

    #[test]
    fn test_full_queue_leaves_the_slot_unclaimed() {
        let (sender, receiver) = mpsc::sync_channel(1);
        let queued = Arc::new(AtomicUsize::new(0));
        let mut queue = FrameQueue::new(sender, queued.clone(), 10);

        assert_eq!(queue.push(0.0, vec![1, 1]), Ok(true));
        assert_eq!(queue.push(0.5, vec![2, 2]), Err(TrySendError::Full(())));
        assert_eq!(queue.pacer.frames_placed(), 1);
        assert_eq!(queued.load(Ordering::SeqCst), 1);

        let mut written = Vec::new();
        receiver.recv().unwrap().write_to(&mut written).unwrap();
        queued.fetch_sub(1, Ordering::SeqCst);

        // The retried frame still fills the gap before itself
        assert_eq!(queue.push(0.5, vec![2, 2]), Ok(true));
        assert_eq!(queue.pacer.frames_placed(), 6);
        receiver.recv().unwrap().write_to(&mut written).unwrap();
        let mut expected = vec![1u8; 10];
        expected.extend([2, 2]);
        assert_eq!(written, expected);
    }

    #[cfg(unix)]
    mod lifecycle {
        use super::*;
        use crate::encoder::{EncoderError, EncoderState, MediaEncoder};
        use crate::media::{AudioBlock, FrameStatus, VideoFrame};
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        const SIZE: FrameSize = FrameSize::new(2, 2);

        /// Stand-in for ffmpeg: the encode pass copies stdin to its output,
        /// the mux pass copies its first input to its output
        const STUB: &str = r#"#!/bin/sh
for last; do :; done
case " $* " in
  *" -version "*) exit 0 ;;
  *" rawvideo "*) cat > "$last"; exit 0 ;;
esac
MUX
input=""
prev=""
for arg; do
  if [ "$prev" = "-i" ] && [ -z "$input" ]; then input="$arg"; fi
  prev="$arg"
done
cp "$input" "$last"
"#;

        fn stub_ffmpeg(dir: &Path, mux_failure: Option<&str>) -> FfmpegWriterFactory {
            let path = dir.join("ffmpeg");
            let mux = match mux_failure {
                Some(message) => format!("echo \"{}\" >&2\nexit 3", message),
                None => String::new(),
            };
            std::fs::write(&path, STUB.replace("MUX", &mux)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

            // A concurrent fork can briefly hold the script open for writing
            let factory = FfmpegWriterFactory::new(&path);
            for _ in 0..100 {
                if factory.is_available() {
                    return factory;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            panic!("stub ffmpeg never became executable");
        }

        fn profile() -> EncodingProfile {
            EncodingProfile {
                video_codec: VideoCodec::H264,
                frame_rate: FrameRate::Fps24,
                capture_system_audio: true,
                ..EncodingProfile::default()
            }
        }

        fn frame(value: i64, timescale: u32, fill: u8) -> SampleBuffer {
            SampleBuffer::video(
                MediaTime::new(value, timescale),
                FrameStatus::Complete,
                VideoFrame {
                    size: SIZE,
                    pixel_format: PixelFormat::Bgra8,
                    data: vec![fill; PixelFormat::Bgra8.frame_len(SIZE)],
                },
            )
        }

        fn audio(value: i64, timescale: u32) -> SampleBuffer {
            SampleBuffer::audio(
                TrackKind::SystemAudio,
                MediaTime::new(value, timescale),
                AudioBlock {
                    sample_rate: 48_000,
                    channels: 2,
                    samples: vec![0.25; 96],
                },
            )
        }

        fn entries(dir: &Path) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(dir)
                .unwrap()
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|name| name != "ffmpeg")
                .collect();
            names.sort();
            names
        }

        #[tokio::test]
        async fn test_round_trip_repeats_gap_frames_and_removes_spool() {
            let tools = tempfile::tempdir().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let encoder = MediaEncoder::new(Arc::new(stub_ffmpeg(tools.path(), None)));
            let path = dir.path().join("o.mov");
            encoder.setup(&path, &profile(), SIZE).unwrap();
            encoder.start_writing().unwrap();

            encoder.append_system_audio(audio(0, 1));
            encoder.append_video(frame(1, 4, 1));
            encoder.append_video(frame(1, 2, 2));

            let output = encoder.finish_writing().await.unwrap();
            assert_eq!(output, path);
            assert_eq!(encoder.state(), EncoderState::Finished);

            // Slots 0..=6 carry the first frame, 7..=11 repeat it, 12 is the second
            let bytes = std::fs::read(&output).unwrap();
            let frame_len = PixelFormat::Bgra8.frame_len(SIZE);
            assert_eq!(bytes.len(), 13 * frame_len);
            assert!(bytes[..12 * frame_len].iter().all(|b| *b == 1));
            assert!(bytes[12 * frame_len..].iter().all(|b| *b == 2));
            assert_eq!(entries(dir.path()), vec!["o.mov".to_string()]);
        }

        #[tokio::test]
        async fn test_cancel_stops_encoder_and_removes_everything() {
            let tools = tempfile::tempdir().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let encoder = MediaEncoder::new(Arc::new(stub_ffmpeg(tools.path(), None)));
            encoder.setup(&dir.path().join("o.mov"), &profile(), SIZE).unwrap();
            encoder.start_writing().unwrap();
            encoder.append_video(frame(0, 1, 1));
            assert_eq!(entries(dir.path()).len(), 1);

            encoder.cancel();
            assert_eq!(encoder.state(), EncoderState::Unconfigured);
            assert!(entries(dir.path()).is_empty());
        }

        #[test]
        fn test_missing_binary_fails_setup() {
            let dir = tempfile::tempdir().unwrap();
            let encoder = MediaEncoder::new(Arc::new(FfmpegWriterFactory::new(dir.path().join("no-ffmpeg"))));

            let result = encoder.setup(&dir.path().join("o.mov"), &profile(), SIZE);
            assert!(matches!(result, Err(EncoderError::WriterCreationFailed(m)) if m.contains("Failed to start FFmpeg")));
            assert_eq!(encoder.state(), EncoderState::Unconfigured);
            assert!(entries(dir.path()).is_empty());
        }

        #[tokio::test]
        async fn test_failing_mux_surfaces_writing_failed() {
            let tools = tempfile::tempdir().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let encoder = MediaEncoder::new(Arc::new(stub_ffmpeg(tools.path(), Some("mux exploded"))));
            let path = dir.path().join("o.mov");
            encoder.setup(&path, &profile(), SIZE).unwrap();
            encoder.start_writing().unwrap();
            encoder.append_video(frame(0, 1, 1));

            let result = encoder.finish_writing().await;
            assert!(matches!(result, Err(EncoderError::WritingFailed(m)) if m.contains("mux exploded")));
            assert_eq!(encoder.state(), EncoderState::Failed);

            encoder.cancel();
            assert!(entries(dir.path()).is_empty());
        }
    }
}
