//! Microphone capture via cpal.
//!
//! Opens the default (or named) input device at its native rate, down-mixes
//! to mono and resamples to 16 kHz inside the cpal callback, and pushes the
//! samples into a lock-free ring buffer. A separate framing task assembles
//! exact 4096-sample blocks, computes their RMS energy, encodes them, and
//! hands them to the session. The callback itself never blocks and never
//! touches the network.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ring_buffer::{CaptureConsumer, CaptureProducer};
use super::{rms, rms_to_level, LevelMeter, BLOCK_SAMPLES, INPUT_SAMPLE_RATE, SPEECH_RMS_THRESHOLD};
use crate::pcm::{self, EncodedPacket};
use crate::session::EngineError;

/// One framed, encoded capture block leaving the pipeline.
#[derive(Debug)]
pub struct CaptureBlock {
    pub packet: EncodedPacket,
    /// RMS energy exceeded the speech threshold for this block.
    pub voiced: bool,
}

/// Resolved info about the input device we will use.
struct CaptureConfig {
    device: cpal::Device,
    stream_config: StreamConfig,
    native_rate: u32,
}

/// Find and configure the input device.
fn resolve_device(device_name: Option<&str>) -> Result<CaptureConfig, EngineError> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| EngineError::DeviceAcquisition(format!("enumerate input devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| EngineError::DeviceAcquisition(format!("input device not found: {name}")))?
    } else {
        host.default_input_device().ok_or_else(|| {
            EngineError::DeviceAcquisition("no default input device available".into())
        })?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());

    let default_config = device
        .default_input_config()
        .map_err(|e| EngineError::DeviceAcquisition(format!("default input config: {e}")))?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    info!(device = %dev_name, native_rate, channels, "Selected input device");

    Ok(CaptureConfig {
        device,
        stream_config: StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(native_rate),
            buffer_size: cpal::BufferSize::Default,
        },
        native_rate,
    })
}

/// Simple linear resampler, mono f32.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix interleaved multi-channel audio to mono by averaging.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Start microphone capture. The returned `Stream` must be kept alive;
/// dropping it stops capture.
///
/// The callback down-mixes, resamples to 16 kHz, pushes into `producer`,
/// and wakes the framing task. If the ring buffer is full the overflow is
/// dropped and the framer catches up.
pub fn start_capture(
    mut producer: CaptureProducer,
    wakeup: Arc<Notify>,
    device_name: Option<&str>,
) -> Result<Stream, EngineError> {
    let cfg = resolve_device(device_name)?;
    let native_rate = cfg.native_rate;
    let channels = cfg.stream_config.channels;

    let stream = cfg
        .device
        .build_input_stream(
            &cfg.stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = to_mono(data, channels);
                let resampled = resample_linear(&mono, native_rate, INPUT_SAMPLE_RATE);
                producer.push_slice(&resampled);
                wakeup.notify_one();
            },
            move |err| {
                error!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| EngineError::DeviceAcquisition(format!("build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| EngineError::DeviceAcquisition(format!("start input stream: {e}")))?;

    info!("Audio capture started");

    Ok(stream)
}

/// Spawn the framing task: drain the ring buffer into exact
/// `BLOCK_SAMPLES`-sample blocks, tag each with its speech-energy signal,
/// encode it, and hand it to `on_block` (fire-and-forget). Runs until
/// aborted at teardown.
pub fn spawn_framer(
    mut consumer: CaptureConsumer,
    wakeup: Arc<Notify>,
    meter: LevelMeter,
    on_block: impl Fn(CaptureBlock) + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending: Vec<f32> = Vec::with_capacity(BLOCK_SAMPLES * 2);
        let mut scratch = vec![0.0f32; BLOCK_SAMPLES];
        loop {
            wakeup.notified().await;
            loop {
                let read = consumer.pop_slice(&mut scratch);
                if read == 0 {
                    break;
                }
                pending.extend_from_slice(&scratch[..read]);
            }
            while pending.len() >= BLOCK_SAMPLES {
                let block: Vec<f32> = pending.drain(..BLOCK_SAMPLES).collect();
                let energy = rms(&block);
                let voiced = energy > SPEECH_RMS_THRESHOLD;
                if voiced {
                    meter.set(rms_to_level(energy));
                }
                on_block(CaptureBlock {
                    packet: pcm::encode(&block),
                    voiced,
                });
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_identity_when_rates_match() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn resample_halves_length_for_double_rate() {
        let input: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = resample_linear(&input, 32_000, 16_000);
        assert_eq!(out.len(), 50);
        // Linear interpolation of a ramp stays on the ramp.
        assert!((out[10] - 20.0).abs() < 1e-3);
    }

    #[test]
    fn stereo_downmix_averages_channels() {
        let interleaved = [1.0, 0.0, 0.5, 0.5];
        assert_eq!(to_mono(&interleaved, 2), vec![0.5, 0.5]);
    }

    #[test]
    fn mono_passthrough() {
        let samples = [0.25, -0.25];
        assert_eq!(to_mono(&samples, 1), samples.to_vec());
    }
}
