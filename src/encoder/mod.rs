//! Media encoding
//!
//! `MediaEncoder` serializes captured samples into a single container file
//! through a pluggable `ContainerWriter` backend.

pub mod error;
pub mod ffmpeg;
pub mod media_encoder;
pub mod profile;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{EncoderError, EncoderResult};
pub use ffmpeg::{FfmpegWriter, FfmpegWriterFactory};
pub use media_encoder::{EncoderState, MediaEncoder};
pub use profile::{
    AudioCodec, AudioSettings, ContainerFormat, EncodingProfile, FrameRate, VideoCodec, VideoQuality, VideoSettings,
};
pub use writer::{ContainerWriter, WriterConfig, WriterError, WriterFactory, WriterStatus};
