//! Capture sources and the live stream session
//!
//! A `CaptureSource` produces samples on its own threads; `StreamSession`
//! gates it behind permission checks and hands samples to the encoder.

pub mod config;
pub mod microphone;
pub mod permissions;
pub mod selection;
pub mod session;
pub mod synthetic;
pub mod traits;

#[cfg(target_os = "macos")]
pub mod macos;

pub use config::CaptureConfiguration;
pub use microphone::{list_input_devices, MicrophoneInput};
pub use permissions::{StaticPermissions, SystemPermissions};
pub use selection::{ContentFilter, ContentSelection, ContentTarget, Rect};
pub use session::StreamSession;
pub use synthetic::{SyntheticHandle, SyntheticOptions, SyntheticSource};
pub use traits::{
    CaptureError, CaptureResult, CaptureSource, PermissionKind, PermissionProvider, StreamEnded, StreamOutput,
    StreamTermination,
};
