//! Radio-phonetic text normalization

pub mod normalizer;

pub use normalizer::{normalize_script, normalize_segment, NormalizedScript};
