//! Recording orchestration
//!
//! - `RecordingController` drives one stream session and one encoder
//! - collaborator traits for output paths, notifications and the live preview
//! - user-facing settings

pub mod controller;
pub mod notify;
pub mod output;
pub mod preview;
pub mod settings;
pub mod state;

pub use controller::{format_duration, RecordingController, RecordingControllerBuilder};
pub use notify::{EventNotifier, NotificationSink, RecordingEvent};
pub use output::{DirectoryOutput, OutputLocation};
pub use preview::{LivePreview, NoPreview};
pub use settings::RecorderSettings;
pub use state::{ActiveRecording, RecordingState, RecordingSummary};
