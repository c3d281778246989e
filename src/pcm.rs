//! PCM wire codec.
//!
//! The live API speaks base64-encoded 16-bit little-endian PCM in both
//! directions: 16 kHz mono from the microphone, 24 kHz from the model.
//! Encoding and decoding are stateless; a packet exists only in transit.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;

/// Mime tag attached to outbound microphone packets.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// An encoded audio block ready to send to the live API.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Base64 of the 16-bit little-endian PCM payload.
    pub data: String,
    /// Format tag, e.g. `audio/pcm;rate=16000`.
    pub mime_type: &'static str,
}

/// A decoded block of model audio, owned by the playback scheduler from
/// decode until its end-of-playback event.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    /// Wall-clock duration of this buffer when played back.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Mean absolute level scaled to 0..=255, for the cosmetic volume meter.
    pub fn level(&self) -> u8 {
        if self.samples.is_empty() {
            return 0;
        }
        let mean = self.samples.iter().map(|s| s.abs()).sum::<f32>() / self.samples.len() as f32;
        (mean * 255.0 * 4.0).min(255.0) as u8
    }
}

/// Errors produced while decoding an inbound audio packet.
///
/// A decode failure never terminates the session; the offending packet is
/// dropped and logged by the caller.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload length {len} does not divide into {channels}-channel 16-bit frames")]
    Misaligned { len: usize, channels: usize },
    #[error("channel count must be non-zero")]
    ZeroChannels,
}

/// Encode f32 samples as a base64 16-bit LE PCM packet.
///
/// Samples are clamped to [-1, 1] and scaled asymmetrically (negative by
/// 32768, non-negative by 32767) to cover the full signed 16-bit range.
pub fn encode(samples: &[f32]) -> EncodedPacket {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let pcm = if s < 0.0 {
            (s * 32768.0) as i16
        } else {
            (s * 32767.0) as i16
        };
        bytes.extend_from_slice(&pcm.to_le_bytes());
    }
    EncodedPacket {
        data: B64.encode(bytes),
        mime_type: INPUT_MIME_TYPE,
    }
}

/// Decode a base64 16-bit LE PCM payload into normalized f32 samples.
///
/// Multi-channel payloads are de-interleaved and channel 0 is kept; the
/// output path is mono. Fails if the byte length does not divide evenly
/// into frames of `2 * channels` bytes.
pub fn decode(data: &str, sample_rate: u32, channels: usize) -> Result<PlaybackBuffer, DecodeError> {
    if channels == 0 {
        return Err(DecodeError::ZeroChannels);
    }
    let bytes = B64.decode(data)?;
    if bytes.len() % (2 * channels) != 0 {
        return Err(DecodeError::Misaligned {
            len: bytes.len(),
            channels,
        });
    }

    let frame_count = bytes.len() / (2 * channels);
    let mut samples = Vec::with_capacity(frame_count);
    for frame in bytes.chunks_exact(2 * channels) {
        let pcm = i16::from_le_bytes([frame[0], frame[1]]);
        samples.push(pcm as f32 / 32768.0);
    }

    Ok(PlaybackBuffer {
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_within_quantization_error() {
        let original: Vec<f32> = (0..4096)
            .map(|i| ((i as f32) * 0.013).sin() * 0.8)
            .collect();
        let packet = encode(&original);
        let decoded = decode(&packet.data, 16_000, 1).unwrap();
        assert_eq!(decoded.samples.len(), original.len());
        for (a, b) in original.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() <= 1.0 / 32768.0, "{a} vs {b}");
        }
    }

    #[test]
    fn encode_covers_full_signed_range() {
        let packet = encode(&[-1.0, 1.0, -2.0, 2.0]);
        let bytes = B64.decode(&packet.data).unwrap();
        let pcm: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        // Out-of-range input clamps to the same extremes.
        assert_eq!(pcm, vec![-32768, 32767, -32768, 32767]);
    }

    #[test]
    fn decode_rejects_misaligned_payload() {
        let odd = B64.encode([0u8, 1, 2]);
        match decode(&odd, 24_000, 1) {
            Err(DecodeError::Misaligned { len: 3, channels: 1 }) => {}
            other => panic!("expected misaligned error, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(matches!(
            decode("not base64!!!", 24_000, 1),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn decode_deinterleaves_stereo_keeping_channel_zero() {
        // Two frames of [left, right]: (1000, -1000), (2000, -2000).
        let mut bytes = Vec::new();
        for v in [1000i16, -1000, 2000, -2000] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let decoded = decode(&B64.encode(bytes), 24_000, 2).unwrap();
        assert_eq!(decoded.samples.len(), 2);
        assert!((decoded.samples[0] - 1000.0 / 32768.0).abs() < f32::EPSILON);
        assert!((decoded.samples[1] - 2000.0 / 32768.0).abs() < f32::EPSILON);
    }

    #[test]
    fn buffer_duration_matches_sample_count() {
        let buf = PlaybackBuffer {
            samples: vec![0.0; 24_000],
            sample_rate: 24_000,
        };
        assert_eq!(buf.duration(), Duration::from_secs(1));
    }
}
