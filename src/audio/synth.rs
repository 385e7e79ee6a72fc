//! Speech synthesis boundary
//!
//! The engine itself (edge-tts, a local neural TTS, anything that turns
//! text into PCM) lives behind the [`Synthesizer`] trait. Implementations
//! are expected to bound their own call time; a slow or failed synthesis is
//! surfaced as an error and the worker skips that segment for the cycle.

use crate::error::SynthesisError;

/// Mono PCM at the engine's native sample rate.
#[derive(Debug, Clone)]
pub struct SynthesizedPcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthesizedPcm {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Text-to-speech engine boundary.
pub trait Synthesizer: Send + Sync {
    /// Render `text` with the named voice profile into mono PCM.
    fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesizedPcm, SynthesisError>;
}

/// Deterministic stand-in engine: renders each whitespace-separated word as
/// a short tone whose pitch derives from the word. Carries no speech, but
/// exercises the full resample/chunk/pace path with realistic durations.
/// Used by tests and by `atisd` dry runs.
pub struct ToneSynthesizer {
    sample_rate: u32,
}

impl ToneSynthesizer {
    const TONE_MS: u32 = 120;
    const GAP_MS: u32 = 40;

    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    fn word_pitch(word: &str) -> f32 {
        let hash: u32 = word.bytes().fold(0u32, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(b as u32)
        });
        220.0 + (hash % 440) as f32
    }
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        // edge-tts neural voices emit 24kHz mono
        Self::new(24_000)
    }
}

impl Synthesizer for ToneSynthesizer {
    fn synthesize(&self, text: &str, _voice: &str) -> Result<SynthesizedPcm, SynthesisError> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Err(SynthesisError::EngineFailed("empty text".into()));
        }

        let tone_len = (self.sample_rate * Self::TONE_MS / 1000) as usize;
        let gap_len = (self.sample_rate * Self::GAP_MS / 1000) as usize;
        let mut samples = Vec::with_capacity(words.len() * (tone_len + gap_len));

        for word in words {
            let pitch = Self::word_pitch(word);
            for n in 0..tone_len {
                let t = n as f32 / self.sample_rate as f32;
                samples.push(0.3 * (2.0 * std::f32::consts::PI * pitch * t).sin());
            }
            samples.extend(std::iter::repeat(0.0).take(gap_len));
        }

        Ok(SynthesizedPcm {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_scales_with_word_count() {
        let synth = ToneSynthesizer::default();
        let short = synth.synthesize("one", "test-voice").unwrap();
        let long = synth.synthesize("one two three four", "test-voice").unwrap();
        assert!(long.samples.len() > short.samples.len() * 3);
        assert_eq!(short.sample_rate, 24_000);
    }

    #[test]
    fn test_empty_text_is_an_error() {
        let synth = ToneSynthesizer::default();
        assert!(synth.synthesize("   ", "test-voice").is_err());
    }

    #[test]
    fn test_deterministic_output() {
        let synth = ToneSynthesizer::default();
        let a = synth.synthesize("RWY Alpha", "v").unwrap();
        let b = synth.synthesize("RWY Alpha", "v").unwrap();
        assert_eq!(a.samples, b.samples);
    }
}
