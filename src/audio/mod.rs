//! Audio pipeline: capture, output, and the shared level meter.

pub mod capture;
pub mod chime;
pub mod output;
pub mod ring_buffer;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Microphone side of the pipeline: 16 kHz mono.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Model audio arrives at 24 kHz mono.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Capture block size in samples (~256 ms at 16 kHz). One block is one
/// encoded packet on the wire.
pub const BLOCK_SAMPLES: usize = 4096;

/// RMS energy above this marks a capture block as containing speech.
pub const SPEECH_RMS_THRESHOLD: f32 = 0.02;

/// Root-mean-square energy of a block, a cheap voice-activity proxy.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Shared 0..=255 level cell read by the cosmetic volume meter.
///
/// Writers (capture blocks, scheduled playback buffers) and the meter
/// sampling loop are only loosely synchronized; that is fine, the value is
/// display-only.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter(Arc<AtomicU8>);

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, level: u8) {
        self.0.store(level, Ordering::Relaxed);
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.set(0);
    }
}

/// Scale an RMS energy value to the 0..=255 meter range.
pub fn rms_to_level(rms: f32) -> u8 {
    (rms * 255.0 * 4.0).min(255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0.0; 128]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_constant_signal() {
        let block = vec![0.5f32; 256];
        assert!((rms(&block) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn quiet_block_stays_under_speech_threshold() {
        let block = vec![0.005f32; BLOCK_SAMPLES];
        assert!(rms(&block) < SPEECH_RMS_THRESHOLD);
    }
}
