//! PCM conditioning for transmission
//!
//! Synthesized audio arrives at the engine's native sample rate; the
//! transport wants mono s16le at 48kHz in 20ms frames. This module
//! resamples (sinc interpolation via rubato), converts, and chunks, padding
//! the final frame with silence to a full frame boundary.

use bytes::Bytes;
use rubato::{
    calculate_cutoff, Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use crate::constants::{FRAME_BYTES, TARGET_SAMPLE_RATE};
use crate::error::SynthesisError;

/// Resample mono f32 samples between sample rates.
pub fn resample(samples: &[f32], from_sr: u32, to_sr: u32) -> Result<Vec<f32>, SynthesisError> {
    if from_sr == to_sr || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let sinc_len = 256;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_sr as f64 / from_sr as f64,
        2.0,
        params,
        samples.len(),
        1, // mono
    )
    .map_err(|e| SynthesisError::Resample(e.to_string()))?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .map_err(|e| SynthesisError::Resample(e.to_string()))?;

    Ok(output.into_iter().next().unwrap_or_default())
}

/// Convert f32 samples in [-1.0, 1.0] to interleaved s16le bytes.
pub fn f32_to_s16le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Split raw PCM bytes into fixed-size transmission frames.
///
/// The final frame is zero-padded to a full frame boundary; the transport
/// never receives a short frame.
pub fn split_frames(pcm: &[u8]) -> Vec<Bytes> {
    let mut frames = Vec::with_capacity(pcm.len() / FRAME_BYTES + 1);
    for chunk in pcm.chunks(FRAME_BYTES) {
        if chunk.len() == FRAME_BYTES {
            frames.push(Bytes::copy_from_slice(chunk));
        } else {
            let mut padded = Vec::with_capacity(FRAME_BYTES);
            padded.extend_from_slice(chunk);
            padded.resize(FRAME_BYTES, 0);
            frames.push(Bytes::from(padded));
        }
    }
    frames
}

/// Full conditioning pipeline: engine-native mono f32 in, paced-ready
/// transport frames out.
pub fn to_transport_frames(samples: &[f32], sample_rate: u32) -> Result<Vec<Bytes>, SynthesisError> {
    let resampled = resample(samples, sample_rate, TARGET_SAMPLE_RATE)?;
    Ok(split_frames(&f32_to_s16le(&resampled)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SAMPLES_PER_FRAME;

    #[test]
    fn test_same_rate_passthrough() {
        let samples: Vec<f32> = (0..100).map(|i| (i as f32 * 0.01).sin()).collect();
        let result = resample(&samples, 48_000, 48_000).unwrap();
        assert_eq!(result, samples);
    }

    #[test]
    fn test_empty_input() {
        assert!(resample(&[], 24_000, 48_000).unwrap().is_empty());
    }

    #[test]
    fn test_upsample_roughly_doubles() {
        let samples: Vec<f32> = (0..2_400)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 24_000.0).sin())
            .collect();
        let result = resample(&samples, 24_000, 48_000).unwrap();
        assert!(result.len() > samples.len());
        assert!(result.len() < samples.len() * 3);
    }

    #[test]
    fn test_s16le_conversion_clamps() {
        let bytes = f32_to_s16le(&[0.0, 1.0, -1.0, 2.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..2], &0i16.to_le_bytes());
        assert_eq!(&bytes[2..4], &i16::MAX.to_le_bytes());
        // +2.0 clamps to the same value as +1.0
        assert_eq!(&bytes[6..8], &bytes[2..4]);
    }

    #[test]
    fn test_final_frame_is_padded() {
        let pcm = vec![0xAAu8; FRAME_BYTES + 10];
        let frames = split_frames(&pcm);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), FRAME_BYTES);
        assert_eq!(frames[1].len(), FRAME_BYTES);
        assert_eq!(&frames[1][..10], &[0xAAu8; 10][..]);
        assert!(frames[1][10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_transport_frames_are_20ms() {
        // One second of 24kHz audio becomes ~50 frames of 960 samples
        let samples = vec![0.1f32; 24_000];
        let frames = to_transport_frames(&samples, 24_000).unwrap();
        assert!(frames.len() >= 48 && frames.len() <= 52, "got {}", frames.len());
        assert!(frames.iter().all(|f| f.len() == SAMPLES_PER_FRAME * 2));
    }
}
