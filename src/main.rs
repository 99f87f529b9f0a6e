//! Command-line recorder
//!
//! `capture-recorder [settings.json] [seconds]` records the synthetic test
//! pattern for the given number of seconds (default 5) or until Ctrl-C and
//! prints the path of the saved file.

use anyhow::{bail, Context, Result};
use capture_recorder::capture::{ContentFilter, ContentSelection, Rect, SyntheticSource, SystemPermissions};
use capture_recorder::encoder::FfmpegWriterFactory;
use capture_recorder::recorder::{format_duration, EventNotifier, RecorderSettings, RecordingController, RecordingEvent};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

const DEFAULT_SECONDS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    capture_recorder::init_tracing();

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => RecorderSettings::from_json_file(Path::new(&path))
            .with_context(|| format!("failed to load settings from {}", path))?,
        None => RecorderSettings::default(),
    };
    let seconds = match args.next() {
        Some(value) => value
            .parse::<u64>()
            .with_context(|| format!("invalid duration in seconds: {}", value))?,
        None => DEFAULT_SECONDS,
    };

    let factory = FfmpegWriterFactory::default();
    if !factory.is_available() {
        bail!("ffmpeg was not found on PATH");
    }

    let notifier = Arc::new(EventNotifier::new());
    let mut events = notifier.subscribe();
    let controller = RecordingController::builder(
        Box::new(SyntheticSource::default()),
        Arc::new(SystemPermissions),
        Arc::new(factory),
    )
    .settings(settings)
    .notifier(notifier)
    .build();

    tracing::info!("Recording settings: {:?}", controller.settings().encoding_profile());

    let display = ContentFilter::display(0, "Synthetic display", Rect::new(0.0, 0.0, 1280.0, 720.0), 1.0);
    controller.select_content(ContentSelection::picked(display)).await?;
    controller.start_recording().await?;
    tracing::info!("Recording for up to {}s, press Ctrl-C to stop early", seconds);

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    let elapsed = controller.formatted_duration();
    if let Some(summary) = controller.stop_recording().await? {
        println!("{}", summary.output_path.display());
        tracing::info!("Saved {} ({} frames)", elapsed, summary.frames_written);
        return Ok(());
    }

    // The stream ended on its own and the recording was already finalized
    while let Ok(event) = events.try_recv() {
        match event {
            RecordingEvent::Saved(summary) => {
                println!("{}", summary.output_path.display());
                tracing::info!(
                    "Saved {} ({} frames)",
                    format_duration(Duration::from_millis(summary.duration_ms as u64)),
                    summary.frames_written
                );
                return Ok(());
            }
            RecordingEvent::Failed(error) => bail!("recording failed: {}", error),
            _ => {}
        }
    }
    match controller.last_error() {
        Some(error) => bail!("recording failed: {}", error),
        None => bail!("recording was not started"),
    }
}
