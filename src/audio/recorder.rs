//! Microphone source using CPAL for capture
//!
//! `cpal::Stream` is not `Send`, so each acquisition opens the stream on a
//! dedicated capture thread and parks there until released. The CPAL callback
//! converts whatever the device delivers into mono f32, re-chunks it into
//! fixed-size blocks, and hands each block to the subscription's dispatcher.

use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};

use super::block::{BlockAssembler, MAX_BLOCK_SIZE};
use super::source::{AudioError, SampleSource, SourceFormat};
use super::subscription::BlockDispatcher;

/// How long `acquire` waits for the device to start streaming
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the thread that owns a live input stream
struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// Microphone source backed by the default CPAL host.
pub struct MicSource {
    /// Input device name to match; `None` uses the host default
    device_name: Option<String>,
    block_size: usize,
    worker: Option<CaptureWorker>,
}

impl MicSource {
    /// `block_size` is clamped to `1..=MAX_BLOCK_SIZE`
    pub fn new(device_name: Option<String>, block_size: usize) -> Self {
        let clamped = block_size.clamp(1, MAX_BLOCK_SIZE);
        if clamped != block_size {
            log::warn!(
                "MicSource: block size {} out of range, using {}",
                block_size,
                clamped
            );
        }
        Self {
            device_name,
            block_size: clamped,
            worker: None,
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.worker.is_some()
    }
}

impl SampleSource for MicSource {
    fn acquire(&mut self, dispatcher: BlockDispatcher) -> Result<SourceFormat, AudioError> {
        // A source only ever feeds one subscription
        self.release();

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let device_name = self.device_name.clone();
        let block_size = self.block_size;

        let thread = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                capture_thread(device_name, block_size, dispatcher, ready_tx, stop_rx)
            })
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        // Called from the session task: bound how long a wedged driver can hold it
        match ready_rx.recv_timeout(ACQUIRE_TIMEOUT) {
            Ok(Ok(format)) => {
                log::info!(
                    "MicSource: capturing {} Hz mono in blocks of {}",
                    format.sample_rate,
                    format.block_size
                );
                self.worker = Some(CaptureWorker { stop_tx, thread });
                Ok(format)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                // Dropping stop_tx ends the thread if the stream ever opens
                log::error!(
                    "MicSource: no stream after {:?}, abandoning capture thread",
                    ACQUIRE_TIMEOUT
                );
                Err(AudioError::StreamCreationFailed(
                    "Timed out waiting for the input stream to start".to_string(),
                ))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                Err(AudioError::StreamCreationFailed(
                    "Capture thread exited before the stream started".to_string(),
                ))
            }
        }
    }

    fn release(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.thread.join().is_err() {
                log::warn!("MicSource: capture thread panicked");
            }
            log::info!("MicSource: released");
        }
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Body of the capture thread: open the stream, report, then hold it until stopped
fn capture_thread(
    device_name: Option<String>,
    block_size: usize,
    dispatcher: BlockDispatcher,
    ready_tx: std_mpsc::Sender<Result<SourceFormat, AudioError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let (stream, format) = match open_input(device_name.as_deref(), block_size, dispatcher) {
        Ok(opened) => opened,
        Err(e) => {
            log::error!("MicSource: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if ready_tx.send(Ok(format)).is_err() {
        return;
    }

    // Blocks until release() sends or the source is dropped
    let _ = stop_rx.recv();
    drop(stream);
    log::debug!("MicSource: capture thread stopped");
}

fn open_input(
    device_name: Option<&str>,
    block_size: usize,
    dispatcher: BlockDispatcher,
) -> Result<(Stream, SourceFormat), AudioError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => find_input_device(&host, name)?,
        None => host.default_input_device().ok_or(AudioError::NoInputDevice)?,
    };

    log::info!("Using audio input device: {:?}", device.name());

    let supported_config = device
        .default_input_config()
        .map_err(|e| match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => AudioError::NoInputDevice,
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                AudioError::NoSupportedConfig
            }
            cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                classify_backend_error(&err.description)
            }
            #[allow(unreachable_patterns)]
            other => AudioError::StreamCreationFailed(other.to_string()),
        })?;

    log::info!(
        "Audio config: {} Hz, {} channels, {:?}",
        supported_config.sample_rate().0,
        supported_config.channels(),
        supported_config.sample_format()
    );

    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();

    let stream = match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, block_size, dispatcher),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, block_size, dispatcher),
        SampleFormat::F32 => build_stream::<f32>(&device, &config, block_size, dispatcher),
        _ => Err(AudioError::NoSupportedConfig),
    }?;

    stream.play().map_err(|e| match e {
        cpal::PlayStreamError::DeviceNotAvailable => AudioError::NoInputDevice,
        cpal::PlayStreamError::BackendSpecific { err } => classify_backend_error(&err.description),
        #[allow(unreachable_patterns)]
        other => AudioError::StreamCreationFailed(other.to_string()),
    })?;

    Ok((
        stream,
        SourceFormat {
            sample_rate: config.sample_rate.0,
            block_size,
        },
    ))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    block_size: usize,
    mut dispatcher: BlockDispatcher,
) -> Result<Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let err_fn = |err| log::error!("Audio stream error: {}", err);
    let channels = (config.channels as usize).max(1);
    let mut assembler = BlockAssembler::new(block_size);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !dispatcher.is_active() {
                    return;
                }
                let mono = data.chunks(channels).map(downmix::<T>);
                assembler.push(mono, |block| {
                    dispatcher.dispatch(block);
                });
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => AudioError::NoInputDevice,
            cpal::BuildStreamError::StreamConfigNotSupported => AudioError::NoSupportedConfig,
            cpal::BuildStreamError::BackendSpecific { err } => {
                classify_backend_error(&err.description)
            }
            other => AudioError::StreamCreationFailed(other.to_string()),
        })
}

/// Average one interleaved frame down to a single f32 sample
fn downmix<T>(frame: &[T]) -> f32
where
    T: cpal::Sample,
    f32: cpal::FromSample<T>,
{
    if frame.len() == 1 {
        return <f32 as cpal::FromSample<T>>::from_sample_(frame[0]);
    }
    let sum: f32 = frame
        .iter()
        .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
        .sum();
    sum / frame.len() as f32
}

/// Backends report denied microphone access as free-form text
fn classify_backend_error(description: &str) -> AudioError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        AudioError::PermissionDenied(description.to_string())
    } else {
        AudioError::StreamCreationFailed(description.to_string())
    }
}

/// Find an input device by name: exact, then case-insensitive, then substring.
fn find_input_device(host: &cpal::Host, device_name: &str) -> Result<Device, AudioError> {
    let devices: Vec<Device> = host
        .input_devices()
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?
        .collect();

    let names: Vec<String> = devices
        .iter()
        .map(|d| d.name().unwrap_or_default())
        .collect();

    match match_device_name(&names, device_name) {
        Some(index) => {
            log::debug!(
                "Matched audio device '{}' for '{}'",
                names[index],
                device_name
            );
            devices
                .into_iter()
                .nth(index)
                .ok_or(AudioError::NoInputDevice)
        }
        None => {
            let available = if names.is_empty() {
                "No audio input devices found.".to_string()
            } else {
                format!("Available devices: {}", names.join(", "))
            };
            Err(AudioError::DeviceNotFound {
                requested: device_name.to_string(),
                available,
            })
        }
    }
}

fn match_device_name(names: &[String], wanted: &str) -> Option<usize> {
    let wanted_lower = wanted.to_lowercase();

    names
        .iter()
        .position(|n| n == wanted)
        .or_else(|| names.iter().position(|n| n.to_lowercase() == wanted_lower))
        .or_else(|| {
            names
                .iter()
                .position(|n| n.to_lowercase().contains(&wanted_lower))
        })
}
