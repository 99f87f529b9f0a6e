//! Output file locations

use super::settings::RecorderSettings;
use crate::encoder::ContainerFormat;
use crate::utils::error::RecorderResult;
use chrono::{DateTime, Local};
use std::path::PathBuf;

/// Resolves where each new recording is written
pub trait OutputLocation: Send + Sync {
    fn next_output_path(&self, settings: &RecorderSettings) -> RecorderResult<PathBuf>;
}

/// Timestamped files in a recordings directory.
///
/// `settings.output_directory` takes precedence over the directory given
/// at construction.
#[derive(Debug, Clone)]
pub struct DirectoryOutput {
    directory: PathBuf,
}

impl DirectoryOutput {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// `<videos dir>/Recordings`, falling back to the home directory
    pub fn default_directory() -> PathBuf {
        dirs::video_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Recordings")
    }

    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }

    pub fn file_name(at: DateTime<Local>, container: ContainerFormat) -> String {
        format!(
            "Recording_{}.{}",
            at.format("%Y-%m-%d-%H.%M.%S"),
            container.extension()
        )
    }
}

impl Default for DirectoryOutput {
    fn default() -> Self {
        Self::new(Self::default_directory())
    }
}

impl OutputLocation for DirectoryOutput {
    fn next_output_path(&self, settings: &RecorderSettings) -> RecorderResult<PathBuf> {
        let directory = settings.output_directory.as_ref().unwrap_or(&self.directory);
        std::fs::create_dir_all(directory)?;
        Ok(directory.join(Self::file_name(Local::now(), settings.container)))
    }
}
