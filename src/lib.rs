//! Capture Recorder - screen, system audio and microphone into one file.
//!
//! A `RecordingController` owns a capture `StreamSession` and a
//! `MediaEncoder`. Samples flow from the capture source's threads straight
//! into the encoder; the controller drives start, stop and recovery.

pub mod capture;
pub mod encoder;
pub mod media;
pub mod recorder;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber. Later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capture_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
