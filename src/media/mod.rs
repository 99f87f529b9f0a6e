//! Media primitives shared by capture and encoding
//!
//! Timestamps, frame geometry and the sample buffers that flow from a
//! capture stream into the encoder.

pub mod clock;
pub mod sample;
pub mod time;

pub use clock::host_time_now;
pub use sample::{AudioBlock, FrameSize, FrameStatus, PixelFormat, SampleBuffer, SamplePayload, SampleSink, TrackKind, VideoFrame};
pub use time::MediaTime;
