//! Microphone capture using cpal
//!
//! Used when the screen source does not record the microphone itself. The
//! cpal stream lives on its own thread for as long as the input is open.

use super::traits::{CaptureError, CaptureResult, StreamOutput, StreamTermination};
use crate::media::{host_time_now, AudioBlock, MediaTime, SampleBuffer, TrackKind};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Names of the available input devices
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {}", e);
            Vec::new()
        }
    }
}

fn find_input_device(device_id: Option<&str>) -> CaptureResult<Device> {
    let host = cpal::default_host();
    match device_id {
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceNotFound("default input device".to_string())),
        Some(id) => host
            .input_devices()
            .map_err(|e| CaptureError::StreamCreationFailed(format!("Failed to enumerate input devices: {}", e)))?
            .find(|d| d.name().map(|name| name == id).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(id.to_string())),
    }
}

/// An open microphone delivering f32 blocks to a stream output
pub struct MicrophoneInput {
    device_name: String,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneInput {
    /// Open the named input device, or the default one, and start delivering
    pub async fn open(device_id: Option<&str>, output: Arc<dyn StreamOutput>) -> CaptureResult<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = oneshot::channel::<CaptureResult<String>>();

        let device_id = device_id.map(str::to_string);
        let is_running = running.clone();
        let thread = std::thread::Builder::new()
            .name("microphone-capture".to_string())
            .spawn(move || run_input(device_id, output, is_running, ready_tx))
            .map_err(|e| CaptureError::StreamCreationFailed(format!("Failed to start microphone thread: {}", e)))?;

        let opened = ready_rx
            .await
            .unwrap_or_else(|_| Err(CaptureError::StreamCreationFailed("microphone thread exited".to_string())));

        match opened {
            Ok(device_name) => {
                tracing::info!("Microphone capture started: {}", device_name);
                Ok(Self {
                    device_name,
                    running,
                    thread: Some(thread),
                })
            }
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                let _ = thread.join();
                Err(e)
            }
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            tracing::info!("Microphone capture stopped: {}", self.device_name);
        }
    }
}

impl Drop for MicrophoneInput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_input(
    device_id: Option<String>,
    output: Arc<dyn StreamOutput>,
    running: Arc<AtomicBool>,
    ready: oneshot::Sender<CaptureResult<String>>,
) {
    let opened = find_input_device(device_id.as_deref()).and_then(|device| {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::StreamCreationFailed(format!("Failed to get microphone config: {}", e)))?;
        let config = supported.config();

        tracing::debug!(
            "Opening microphone {} ({}Hz, {}ch, {:?})",
            name,
            config.sample_rate.0,
            config.channels,
            supported.sample_format()
        );

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, output.clone()),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, output.clone()),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, output.clone()),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, output.clone()),
            other => {
                return Err(CaptureError::StreamCreationFailed(format!(
                    "Unsupported microphone sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| CaptureError::StreamCreationFailed(format!("Failed to build microphone stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| CaptureError::StreamCreationFailed(format!("Failed to start microphone stream: {}", e)))?;
        Ok((name, stream))
    });

    let stream = match opened {
        Ok((name, stream)) => {
            let _ = ready.send(Ok(name));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }
    drop(stream);
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    output: Arc<dyn StreamOutput>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let error_output = output.clone();

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|s| f32::from_sample(*s)).collect();
            let block = AudioBlock {
                sample_rate,
                channels,
                samples,
            };
            // Stamp the block with the time its first frame was captured
            let duration = block.frame_count() as f64 / sample_rate.max(1) as f64;
            let now = host_time_now();
            let presentation_time = MediaTime::from_seconds((now.seconds() - duration).max(0.0));
            output.deliver(SampleBuffer::audio(TrackKind::Microphone, presentation_time, block));
        },
        move |err| {
            tracing::error!("Microphone stream error: {}", err);
            error_output.terminate(StreamTermination::Error(format!("Microphone stream error: {}", err)));
        },
        None,
    )
}
