//! Per-session capture configuration

use super::selection::Rect;
use crate::encoder::profile::{AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};
use crate::media::{FrameSize, MediaTime, PixelFormat};
use crate::recorder::RecorderSettings;
use serde::Serialize;

/// Shortest frame interval when capturing at the display's native rate
pub const NATIVE_MINIMUM_FRAME_INTERVAL: MediaTime = MediaTime::new(1, 120);

/// How a capture stream is set up for one recording.
///
/// Derived fresh from the settings and selection at every start and never
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfiguration {
    pub frame_size: FrameSize,
    pub source_rect: Option<Rect>,
    pub minimum_frame_interval: MediaTime,
    pub pixel_format: PixelFormat,
    pub shows_cursor: bool,
    pub captures_system_audio: bool,
    pub captures_microphone: bool,
    pub microphone_device_id: Option<String>,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl CaptureConfiguration {
    pub fn derive(settings: &RecorderSettings, frame_size: FrameSize, source_rect: Option<Rect>) -> Self {
        let minimum_frame_interval = match settings.frame_rate.fps() {
            Some(fps) => MediaTime::new(1, fps),
            None => NATIVE_MINIMUM_FRAME_INTERVAL,
        };

        Self {
            frame_size,
            source_rect,
            minimum_frame_interval,
            pixel_format: settings.encoding_profile().pixel_format(),
            shows_cursor: settings.show_cursor,
            captures_system_audio: settings.capture_system_audio,
            captures_microphone: settings.capture_microphone,
            microphone_device_id: settings.microphone_device_id.clone(),
            sample_rate: AUDIO_SAMPLE_RATE,
            channel_count: AUDIO_CHANNELS,
        }
    }

    /// Frames per second implied by the minimum frame interval
    pub fn max_frame_rate(&self) -> f64 {
        let interval = self.minimum_frame_interval.seconds();
        if interval > 0.0 {
            1.0 / interval
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{FrameRate, VideoCodec};

    #[test]
    fn test_native_rate_uses_120hz_interval() {
        let settings = RecorderSettings {
            frame_rate: FrameRate::Native,
            ..RecorderSettings::default()
        };
        let config = CaptureConfiguration::derive(&settings, FrameSize::new(1920, 1080), None);
        assert_eq!(config.minimum_frame_interval, MediaTime::new(1, 120));
        assert!((config.max_frame_rate() - 120.0).abs() < 1e-9);
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.channel_count, 2);
    }

    #[test]
    fn test_fixed_rate_and_sdr_format() {
        let settings = RecorderSettings {
            frame_rate: FrameRate::Fps24,
            capture_hdr: true,
            ..RecorderSettings::default()
        };
        let config = CaptureConfiguration::derive(&settings, FrameSize::new(640, 480), None);
        assert_eq!(config.minimum_frame_interval, MediaTime::new(1, 24));
        // HEVC does not carry HDR
        assert_eq!(config.pixel_format, PixelFormat::Bgra8);
    }

    #[test]
    fn test_hdr_format_for_prores() {
        let settings = RecorderSettings {
            video_codec: VideoCodec::ProRes422,
            capture_hdr: true,
            capture_microphone: true,
            microphone_device_id: Some("USB Mic".to_string()),
            ..RecorderSettings::default()
        };
        let rect = Some(Rect::new(10.0, 20.0, 300.0, 200.0));
        let config = CaptureConfiguration::derive(&settings, FrameSize::new(600, 400), rect);
        assert_eq!(config.pixel_format, PixelFormat::YCbCr420TenBit);
        assert_eq!(config.source_rect, rect);
        assert!(config.captures_microphone);
        assert_eq!(config.microphone_device_id.as_deref(), Some("USB Mic"));
    }
}
