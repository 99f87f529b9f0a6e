//! Encoding profiles and deterministic codec parameter derivation

use crate::media::{FrameSize, PixelFormat};
use serde::{Deserialize, Serialize};

/// Frame rate used when the capture runs at the display's native rate
pub const NATIVE_FALLBACK_FRAME_RATE: u32 = 60;

/// Sample rate of every captured and encoded audio track
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Channel count of every captured and encoded audio track
pub const AUDIO_CHANNELS: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VideoCodec {
    H264,
    Hevc,
    ProRes422,
    ProRes4444,
}

impl VideoCodec {
    pub fn supports_alpha_channel(&self) -> bool {
        matches!(self, VideoCodec::Hevc | VideoCodec::ProRes4444)
    }

    pub fn always_has_alpha(&self) -> bool {
        matches!(self, VideoCodec::ProRes4444)
    }

    pub fn supports_hdr(&self) -> bool {
        matches!(self, VideoCodec::ProRes422 | VideoCodec::ProRes4444)
    }

    /// ProRes encodes at a fixed quality and takes no bitrate
    pub fn is_fixed_quality(&self) -> bool {
        matches!(self, VideoCodec::ProRes422 | VideoCodec::ProRes4444)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioCodec {
    Aac,
    Pcm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mov,
    Mp4,
}

impl ContainerFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mov => "mov",
            ContainerFormat::Mp4 => "mp4",
        }
    }

    pub fn supports_video_codec(&self, codec: VideoCodec) -> bool {
        match self {
            ContainerFormat::Mov => true,
            ContainerFormat::Mp4 => matches!(codec, VideoCodec::H264 | VideoCodec::Hevc),
        }
    }

    pub fn supports_audio_codec(&self, codec: AudioCodec) -> bool {
        match self {
            ContainerFormat::Mov => true,
            ContainerFormat::Mp4 => codec == AudioCodec::Aac,
        }
    }

    pub fn supports_alpha_channel(&self) -> bool {
        matches!(self, ContainerFormat::Mov)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameRate {
    Native,
    Fps24,
    Fps30,
    Fps60,
}

impl FrameRate {
    /// Frames per second, or `None` for the display's native rate
    pub fn fps(&self) -> Option<u32> {
        match self {
            FrameRate::Native => None,
            FrameRate::Fps24 => Some(24),
            FrameRate::Fps30 => Some(30),
            FrameRate::Fps60 => Some(60),
        }
    }

    /// The rate used for bitrate and keyframe calculations
    pub fn effective_fps(&self) -> u32 {
        self.fps().unwrap_or(NATIVE_FALLBACK_FRAME_RATE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    Medium,
    High,
}

impl VideoQuality {
    /// Bits spent per pixel per frame, or `None` for fixed-quality codecs
    pub fn bits_per_pixel(&self, codec: VideoCodec) -> Option<f64> {
        match (codec, self) {
            (VideoCodec::H264, VideoQuality::Low) => Some(0.04),
            (VideoCodec::H264, VideoQuality::Medium) => Some(0.08),
            (VideoCodec::H264, VideoQuality::High) => Some(0.15),
            (VideoCodec::Hevc, VideoQuality::Low) => Some(0.025),
            (VideoCodec::Hevc, VideoQuality::Medium) => Some(0.05),
            (VideoCodec::Hevc, VideoQuality::High) => Some(0.10),
            (VideoCodec::ProRes422 | VideoCodec::ProRes4444, _) => None,
        }
    }
}

/// Everything the encoder needs to know about how to encode one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingProfile {
    pub container: ContainerFormat,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub quality: VideoQuality,
    pub frame_rate: FrameRate,
    pub capture_hdr: bool,
    pub capture_alpha: bool,
    pub capture_system_audio: bool,
    pub capture_microphone: bool,
}

impl EncodingProfile {
    /// Whether frames are captured and encoded as 10-bit HDR
    pub fn uses_hdr(&self) -> bool {
        self.capture_hdr && self.video_codec.supports_hdr()
    }

    pub fn pixel_format(&self) -> PixelFormat {
        if self.uses_hdr() {
            PixelFormat::YCbCr420TenBit
        } else {
            PixelFormat::Bgra8
        }
    }
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            container: ContainerFormat::Mov,
            video_codec: VideoCodec::Hevc,
            audio_codec: AudioCodec::Aac,
            quality: VideoQuality::High,
            frame_rate: FrameRate::Fps60,
            capture_hdr: false,
            capture_alpha: false,
            capture_system_audio: false,
            capture_microphone: false,
        }
    }
}

/// HDR colour description attached to HDR-capable codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorProperties {
    pub primaries: &'static str,
    pub transfer_function: &'static str,
    pub matrix: &'static str,
}

impl ColorProperties {
    /// BT.2020 primaries and matrix with the HLG transfer function
    pub const HDR_HLG: ColorProperties = ColorProperties {
        primaries: "bt2020",
        transfer_function: "arib-std-b67",
        matrix: "bt2020nc",
    };
}

/// Derived video track parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSettings {
    pub codec: VideoCodec,
    pub size: FrameSize,
    pub pixel_format: PixelFormat,
    pub expected_frame_rate: u32,
    /// Average bitrate in bits per second; `None` for fixed-quality codecs
    pub average_bitrate: Option<u64>,
    pub max_keyframe_interval: Option<u32>,
    pub color: Option<ColorProperties>,
    pub alpha: bool,
}

impl VideoSettings {
    /// Derive the video track parameters for a profile and output size.
    ///
    /// bitrate = width * height * bits_per_pixel * effective_fps, and the
    /// keyframe interval is two seconds of frames.
    pub fn derive(profile: &EncodingProfile, size: FrameSize) -> Self {
        let fps = profile.frame_rate.effective_fps();
        let (average_bitrate, max_keyframe_interval) = match profile.quality.bits_per_pixel(profile.video_codec) {
            Some(bpp) => {
                let bitrate = size.width as f64 * size.height as f64 * bpp * fps as f64;
                (Some(bitrate.round() as u64), Some(fps * 2))
            }
            None => (None, None),
        };

        let alpha = profile.video_codec.always_has_alpha()
            || (profile.capture_alpha
                && profile.video_codec.supports_alpha_channel()
                && profile.container.supports_alpha_channel());

        Self {
            codec: profile.video_codec,
            size,
            pixel_format: profile.pixel_format(),
            expected_frame_rate: fps,
            average_bitrate,
            max_keyframe_interval,
            color: profile.uses_hdr().then_some(ColorProperties::HDR_HLG),
            alpha,
        }
    }
}

/// Derived audio track parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    /// Encoder bitrate for AAC
    pub bitrate: Option<u32>,
    /// Bit depth for linear PCM
    pub bit_depth: Option<u16>,
}

impl AudioSettings {
    pub fn for_codec(codec: AudioCodec) -> Self {
        match codec {
            AudioCodec::Aac => Self {
                codec,
                sample_rate: AUDIO_SAMPLE_RATE,
                channels: AUDIO_CHANNELS,
                bitrate: Some(256_000),
                bit_depth: None,
            },
            AudioCodec::Pcm => Self {
                codec,
                sample_rate: AUDIO_SAMPLE_RATE,
                channels: AUDIO_CHANNELS,
                bitrate: None,
                bit_depth: Some(16),
            },
        }
    }
}
