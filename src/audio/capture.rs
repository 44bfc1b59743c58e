//! System-audio capture using cpal.
//!
//! Records the loopback of the default output device (falling back to the
//! default input when no loopback-style device exists) into an in-memory
//! chunk list, then persists a single mono WAV at the configured sample rate.

use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::cancel::CancelToken;

/// How often the capture loop re-checks the deadline and the token.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct AudioCapture {
    sample_rate: u32,
    output_path: PathBuf,
}

impl AudioCapture {
    pub fn new(sample_rate: u32, output_path: PathBuf) -> Self {
        Self {
            sample_rate,
            output_path,
        }
    }

    /// Record until `duration` elapses or `cancel` is observed, then persist.
    ///
    /// Blocking; the session runs it on the blocking pool. Captured chunks
    /// are owned exclusively by this call until the final WAV write. Zero
    /// captured chunks is an error and produces no file.
    pub fn record(&self, duration: Duration, cancel: &CancelToken) -> Result<PathBuf> {
        let (device, channels, sample_format) = select_capture_device()?;

        info!(
            "Starting audio capture: {} Hz, {} input channels, {:?}",
            self.sample_rate, channels, sample_format
        );

        let chunks: Arc<Mutex<Vec<Vec<i16>>>> = Arc::new(Mutex::new(Vec::new()));
        let stream = build_capture_stream(
            &device,
            channels,
            self.sample_rate,
            sample_format,
            Arc::clone(&chunks),
        )?;

        stream
            .play()
            .context("Failed to start audio capture stream")?;

        let start = Instant::now();
        while start.elapsed() < duration && !cancel.is_cancelled() {
            std::thread::sleep(POLL_INTERVAL);
        }

        // Dropping the stream stops the callback before the buffer handoff.
        drop(stream);

        let chunks = {
            let mut guard = chunks.lock().unwrap();
            std::mem::take(&mut *guard)
        };

        if chunks.is_empty() {
            bail!("No audio data captured");
        }

        let chunk_count = chunks.len();
        let samples = chunks.concat();
        info!(
            "Audio capture complete: {} chunks, {} samples ({:.1}s)",
            chunk_count,
            samples.len(),
            samples.len() as f64 / self.sample_rate as f64
        );

        self.persist(&samples)?;
        Ok(self.output_path.clone())
    }

    fn persist(&self, samples: &[i16]) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&self.output_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", self.output_path))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }

        writer.finalize().context("Failed to finalize WAV file")?;
        info!("Audio saved to {:?}", self.output_path);
        Ok(())
    }
}

/// Pick a device that records what the default output is playing.
///
/// cpal has no portable loopback API, so this looks for an input device whose
/// name marks it as a monitor of an output (PulseAudio/PipeWire "monitor",
/// WASAPI "loopback"/"stereo mix") and falls back to the default input.
fn select_capture_device() -> Result<(Device, u16, SampleFormat)> {
    let host = cpal::default_host();

    let device = host
        .input_devices()
        .context("Failed to enumerate audio input devices")?
        .find(|d| d.name().map(|n| is_loopback_name(&n)).unwrap_or(false))
        .or_else(|| host.default_input_device());

    let Some(device) = device else {
        bail!("Could not find a suitable device for audio capture");
    };

    let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
    if is_loopback_name(&name) {
        info!("Using loopback capture device: {}", name);
    } else {
        warn!(
            "No loopback device found; recording from input device: {}",
            name
        );
    }

    let supported = device
        .default_input_config()
        .context("Capture device has no supported input configuration")?;

    Ok((device, supported.channels(), supported.sample_format()))
}

fn is_loopback_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("monitor") || lower.contains("loopback") || lower.contains("stereo mix")
}

/// Build the input stream, converting every supported sample format to i16 in
/// the callback so the buffer stays format-agnostic.
fn build_capture_stream(
    device: &Device,
    channels: u16,
    sample_rate: u32,
    sample_format: SampleFormat,
    chunks: Arc<Mutex<Vec<Vec<i16>>>>,
) -> Result<Stream> {
    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = channels as usize;
    let err_fn = |err| error!("Audio stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                push_chunk(&chunks, data, channels, |s| s);
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push_chunk(&chunks, data, channels, |s| s as f32 / 32_768.0);
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                push_chunk(&chunks, data, channels, |s| {
                    (s as f32 - 32_768.0) / 32_768.0
                });
            },
            err_fn,
            None,
        )?,
        other => bail!("Unsupported audio sample format: {:?}", other),
    };

    Ok(stream)
}

/// Append the first channel of one interleaved callback buffer to the chunk
/// list.
fn push_chunk<T: Copy>(
    chunks: &Mutex<Vec<Vec<i16>>>,
    data: &[T],
    channels: usize,
    convert: impl Fn(T) -> f32,
) {
    let chunk = first_channel(data, channels, convert);
    if !chunk.is_empty() {
        chunks.lock().unwrap().push(chunk);
    }
}

fn first_channel<T: Copy>(data: &[T], channels: usize, convert: impl Fn(T) -> f32) -> Vec<i16> {
    data.iter()
        .step_by(channels.max(1))
        .map(|&s| f32_to_i16(convert(s)))
        .collect()
}

fn f32_to_i16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_conversion_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), -i16::MAX);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
    }

    #[test]
    fn first_channel_deinterleaves_stereo() {
        // [L, R, L, R] -> [L, L]
        let data = [0.5f32, -0.5, 0.25, -0.25];
        let mono = first_channel(&data, 2, |s| s);

        assert_eq!(mono, vec![f32_to_i16(0.5), f32_to_i16(0.25)]);
    }

    #[test]
    fn first_channel_passes_mono_through() {
        let data = [0.1f32, 0.2, 0.3];
        assert_eq!(first_channel(&data, 1, |s| s).len(), 3);
    }

    #[test]
    fn u16_conversion_is_centered() {
        let mono = first_channel(&[32_768u16], 1, |s| (s as f32 - 32_768.0) / 32_768.0);
        assert_eq!(mono, vec![0]);
    }

    #[test]
    fn loopback_names() {
        assert!(is_loopback_name("Monitor of Built-in Audio"));
        assert!(is_loopback_name("CABLE Output (VB-Audio Loopback)"));
        assert!(is_loopback_name("Stereo Mix (Realtek)"));
        assert!(!is_loopback_name("Built-in Microphone"));
    }
}
