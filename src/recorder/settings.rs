//! User-facing recording settings

use crate::encoder::{AudioCodec, ContainerFormat, EncodingProfile, FrameRate, VideoCodec, VideoQuality};
use crate::utils::error::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Every knob that shapes a recording.
///
/// Stored as camelCase JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderSettings {
    pub frame_rate: FrameRate,
    pub video_codec: VideoCodec,
    pub container: ContainerFormat,
    pub audio_codec: AudioCodec,
    pub quality: VideoQuality,
    pub capture_hdr: bool,
    pub capture_alpha: bool,
    pub capture_system_audio: bool,
    pub capture_microphone: bool,
    pub microphone_device_id: Option<String>,
    pub show_cursor: bool,
    /// Overrides the default recordings directory
    pub output_directory: Option<PathBuf>,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            frame_rate: FrameRate::Fps60,
            video_codec: VideoCodec::Hevc,
            container: ContainerFormat::Mov,
            audio_codec: AudioCodec::Aac,
            quality: VideoQuality::High,
            capture_hdr: false,
            capture_alpha: false,
            capture_system_audio: false,
            capture_microphone: false,
            microphone_device_id: None,
            show_cursor: true,
            output_directory: None,
        }
    }
}

impl RecorderSettings {
    pub fn from_json_file(path: &Path) -> RecorderResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: RecorderSettings = serde_json::from_str(&contents)
            .map_err(|e| RecorderError::Config(format!("Invalid settings file {:?}: {}", path, e)))?;
        Ok(settings.normalized())
    }

    pub fn to_json_file(&self, path: &Path) -> RecorderResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Resolve incompatible codec, container, alpha and HDR combinations
    pub fn normalized(mut self) -> Self {
        if !self.container.supports_video_codec(self.video_codec) {
            tracing::debug!("{:?} cannot hold {:?}, using HEVC", self.container, self.video_codec);
            self.video_codec = VideoCodec::Hevc;
        }
        if !self.container.supports_audio_codec(self.audio_codec) {
            self.audio_codec = AudioCodec::Aac;
        }

        if self.video_codec.always_has_alpha() {
            self.capture_alpha = true;
        } else if !self.video_codec.supports_alpha_channel() || !self.container.supports_alpha_channel() {
            self.capture_alpha = false;
        }

        if !self.video_codec.supports_hdr() {
            self.capture_hdr = false;
        }
        self
    }

    pub fn encoding_profile(&self) -> EncodingProfile {
        EncodingProfile {
            container: self.container,
            video_codec: self.video_codec,
            audio_codec: self.audio_codec,
            quality: self.quality,
            frame_rate: self.frame_rate,
            capture_hdr: self.capture_hdr,
            capture_alpha: self.capture_alpha,
            capture_system_audio: self.capture_system_audio,
            capture_microphone: self.capture_microphone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp4_forces_compatible_codecs() {
        let settings = RecorderSettings {
            container: ContainerFormat::Mp4,
            video_codec: VideoCodec::ProRes422,
            audio_codec: AudioCodec::Pcm,
            ..RecorderSettings::default()
        }
        .normalized();

        assert_eq!(settings.video_codec, VideoCodec::Hevc);
        assert_eq!(settings.audio_codec, AudioCodec::Aac);
    }

    #[test]
    fn test_alpha_rules() {
        let prores = RecorderSettings {
            video_codec: VideoCodec::ProRes4444,
            ..RecorderSettings::default()
        }
        .normalized();
        assert!(prores.capture_alpha);

        let h264 = RecorderSettings {
            video_codec: VideoCodec::H264,
            capture_alpha: true,
            ..RecorderSettings::default()
        }
        .normalized();
        assert!(!h264.capture_alpha);

        let hevc_mp4 = RecorderSettings {
            container: ContainerFormat::Mp4,
            capture_alpha: true,
            ..RecorderSettings::default()
        }
        .normalized();
        assert!(!hevc_mp4.capture_alpha);

        let hevc_mov = RecorderSettings {
            capture_alpha: true,
            ..RecorderSettings::default()
        }
        .normalized();
        assert!(hevc_mov.capture_alpha);
    }

    #[test]
    fn test_hdr_requires_capable_codec() {
        let hevc = RecorderSettings {
            capture_hdr: true,
            ..RecorderSettings::default()
        }
        .normalized();
        assert!(!hevc.capture_hdr);

        let prores = RecorderSettings {
            video_codec: VideoCodec::ProRes422,
            capture_hdr: true,
            ..RecorderSettings::default()
        }
        .normalized();
        assert!(prores.capture_hdr);
    }

    #[test]
    fn test_json_round_trip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "frameRate": "fps30", "captureSystemAudio": true, "container": "mp4" }"#).unwrap();

        let settings = RecorderSettings::from_json_file(&path).unwrap();
        assert_eq!(settings.frame_rate, FrameRate::Fps30);
        assert!(settings.capture_system_audio);
        assert_eq!(settings.container, ContainerFormat::Mp4);
        assert!(settings.show_cursor);

        let copy = dir.path().join("nested").join("copy.json");
        settings.to_json_file(&copy).unwrap();
        assert_eq!(RecorderSettings::from_json_file(&copy).unwrap(), settings);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(RecorderSettings::from_json_file(&path), Err(RecorderError::Config(_))));
    }
}
