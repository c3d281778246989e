//! Confirmation chime.
//!
//! A short synthesized "ding" played once when the assistant starts
//! answering something the user said: a sine glide from 800 Hz down to
//! 500 Hz with a fast attack and an exponential decay, 350 ms total.

use super::OUTPUT_SAMPLE_RATE;

const TOTAL_SECS: f32 = 0.35;
const GLIDE_SECS: f32 = 0.3;
const ATTACK_SECS: f32 = 0.05;
const START_HZ: f32 = 800.0;
const END_HZ: f32 = 500.0;
const PEAK_GAIN: f32 = 0.15;
const FLOOR_GAIN: f32 = 0.001;

/// Render the chime as mono f32 samples at the output rate.
pub fn render() -> Vec<f32> {
    let sample_rate = OUTPUT_SAMPLE_RATE as f32;
    let total = (TOTAL_SECS * sample_rate) as usize;
    let mut samples = Vec::with_capacity(total);

    let mut phase: f32 = 0.0;
    for i in 0..total {
        let t = i as f32 / sample_rate;

        let freq = if t < GLIDE_SECS {
            START_HZ * (END_HZ / START_HZ).powf(t / GLIDE_SECS)
        } else {
            END_HZ
        };

        let gain = if t < ATTACK_SECS {
            PEAK_GAIN * (t / ATTACK_SECS)
        } else if t < GLIDE_SECS {
            PEAK_GAIN * (FLOOR_GAIN / PEAK_GAIN).powf((t - ATTACK_SECS) / (GLIDE_SECS - ATTACK_SECS))
        } else {
            0.0
        };

        phase += 2.0 * std::f32::consts::PI * freq / sample_rate;
        samples.push(phase.sin() * gain);
    }

    samples
}
