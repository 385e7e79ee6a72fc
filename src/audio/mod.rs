//! Audio subsystem: synthesis boundary and PCM conditioning

pub mod pcm;
pub mod synth;

pub use pcm::{split_frames, to_transport_frames};
pub use synth::{SynthesizedPcm, Synthesizer, ToneSynthesizer};
