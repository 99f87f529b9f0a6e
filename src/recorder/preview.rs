//! Live preview hook

use crate::capture::ContentSelection;

/// A live preview of the selected content, shown while idle.
///
/// The controller suspends it before recording so the preview stream does
/// not compete with the recording stream for the same content.
pub trait LivePreview: Send + Sync {
    /// Show the given selection
    fn show(&self, selection: &ContentSelection);

    /// Stop streaming, keeping the last image
    fn suspend(&self);

    /// Stop streaming and drop the preview image
    fn clear(&self);
}

/// Preview that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPreview;

impl LivePreview for NoPreview {
    fn show(&self, _selection: &ContentSelection) {}

    fn suspend(&self) {}

    fn clear(&self) {}
}
