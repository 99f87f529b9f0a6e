//! Sample buffers delivered by capture streams

use super::time::MediaTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One track of the muxed output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackKind {
    Video,
    SystemAudio,
    Microphone,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackKind::Video => "video",
            TrackKind::SystemAudio => "system-audio",
            TrackKind::Microphone => "microphone",
        };
        f.write_str(name)
    }
}

/// Status attached to every captured video frame.
///
/// Only `Complete` frames carry real content; the others are placeholders
/// the capture stream emits while idle or switching targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameStatus {
    Complete,
    Idle,
    Blank,
    Suspended,
    Started,
    Stopped,
}

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PixelFormat {
    /// 8-bit BGRA, 4 bytes per pixel
    Bgra8,
    /// 10-bit 4:2:0 bi-planar YCbCr (P010 layout), used for HDR capture
    YCbCr420TenBit,
}

impl PixelFormat {
    /// Size in bytes of one frame with the given dimensions
    pub fn frame_len(&self, size: FrameSize) -> usize {
        let pixels = size.width as usize * size.height as usize;
        match self {
            PixelFormat::Bgra8 => pixels * 4,
            // 16-bit luma plane plus a half-height interleaved 16-bit chroma plane
            PixelFormat::YCbCr420TenBit => pixels * 2 + pixels,
        }
    }
}

/// Output dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round both dimensions up to the next even pixel count.
    ///
    /// Block-based codecs reject odd dimensions.
    pub fn snapped_to_even(self) -> Self {
        Self {
            width: self.width.div_ceil(2) * 2,
            height: self.height.div_ceil(2) * 2,
        }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Raw pixels of one captured frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub size: FrameSize,
    pub pixel_format: PixelFormat,
    pub data: Vec<u8>,
}

/// A block of interleaved 32-bit float PCM
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioBlock {
    /// Number of frames (samples per channel) in the block
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

#[derive(Debug, Clone)]
pub enum SamplePayload {
    Video(VideoFrame),
    Audio(AudioBlock),
}

/// One timestamped unit of captured media.
///
/// Ownership moves from the capture stream to the encoder for a single
/// append call.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub kind: TrackKind,
    pub presentation_time: MediaTime,
    pub status: FrameStatus,
    pub payload: SamplePayload,
}

impl SampleBuffer {
    pub fn video(presentation_time: MediaTime, status: FrameStatus, frame: VideoFrame) -> Self {
        Self {
            kind: TrackKind::Video,
            presentation_time,
            status,
            payload: SamplePayload::Video(frame),
        }
    }

    /// Audio samples are always complete
    pub fn audio(kind: TrackKind, presentation_time: MediaTime, block: AudioBlock) -> Self {
        Self {
            kind,
            presentation_time,
            status: FrameStatus::Complete,
            payload: SamplePayload::Audio(block),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == FrameStatus::Complete
    }

    pub fn video_frame(&self) -> Option<&VideoFrame> {
        match &self.payload {
            SamplePayload::Video(frame) => Some(frame),
            SamplePayload::Audio(_) => None,
        }
    }

    pub fn audio_block(&self) -> Option<&AudioBlock> {
        match &self.payload {
            SamplePayload::Audio(block) => Some(block),
            SamplePayload::Video(_) => None,
        }
    }
}

/// Consumer of captured samples.
///
/// `deliver` runs synchronously on the capture thread that produced the
/// sample and must return quickly: it gates the capture pipeline.
pub trait SampleSink: Send + Sync {
    fn deliver(&self, sample: SampleBuffer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_to_even() {
        assert_eq!(FrameSize::new(1919, 1081).snapped_to_even(), FrameSize::new(1920, 1082));
        assert_eq!(FrameSize::new(1280, 720).snapped_to_even(), FrameSize::new(1280, 720));
    }

    #[test]
    fn test_frame_len() {
        let size = FrameSize::new(4, 2);
        assert_eq!(PixelFormat::Bgra8.frame_len(size), 32);
        assert_eq!(PixelFormat::YCbCr420TenBit.frame_len(size), 24);
    }

    #[test]
    fn test_audio_frame_count() {
        let block = AudioBlock {
            sample_rate: 48_000,
            channels: 2,
            samples: vec![0.0; 960],
        };
        assert_eq!(block.frame_count(), 480);
    }
}
