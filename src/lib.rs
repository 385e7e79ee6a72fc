//! # ATIS Broadcaster
//!
//! Automated terminal-information broadcast engine for an online
//! air-traffic-control voice network. A reconciliation loop polls a data
//! feed of desired broadcast stations and keeps one long-lived worker per
//! station alive; each worker behaves like a real radio station on its
//! frequency-mapped voice channel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────┐  poll (30s)  ┌──────────────────────────────────┐
//! │  Station feed  │─────────────▶│         StationRegistry          │
//! │  (HTTP, JSON)  │              │  diff desired vs running pool    │
//! └────────────────┘              └───────┬──────────┬──────────┬────┘
//!                              create/update/stop    │          │
//!                                         ▼          ▼          ▼
//!                                  ┌──────────┐ ┌──────────┐ ┌──────────┐
//!                                  │ Worker A │ │ Worker B │ │ Worker C │
//!                                  │ (thread) │ │ (thread) │ │ (thread) │
//!                                  └────┬─────┘ └────┬─────┘ └────┬─────┘
//!               normalize ──▶ synthesize │ carrier-sense gate     │
//!               (text)        (TTS+PCM)  ▼ 20ms paced frames      ▼
//!                                  ┌───────────────────────────────────┐
//!                                  │   Voice transport (FREQ_xxxxxx)   │
//!                                  └───────────────────────────────────┘
//! ```
//!
//! The voice transport and the speech engine are trait boundaries
//! ([`transport::VoiceConnector`], [`audio::Synthesizer`]); in-process
//! substitutes ship for tests and dry runs.

pub mod audio;
pub mod config;
pub mod error;
pub mod source;
pub mod station;
pub mod text;
pub mod transport;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate the voice transport expects
    pub const TARGET_SAMPLE_RATE: u32 = 48_000;

    /// Transport audio is mono
    pub const TARGET_CHANNELS: u16 = 1;

    /// Transmission frame length in milliseconds
    pub const FRAME_MS: u64 = 20;

    /// Samples per 20ms frame at the target rate
    pub const SAMPLES_PER_FRAME: usize =
        (TARGET_SAMPLE_RATE as usize / 1000) * FRAME_MS as usize;

    /// Bytes per frame (mono, 16-bit signed little-endian)
    pub const FRAME_BYTES: usize = SAMPLES_PER_FRAME * 2;

    /// Continuous-silence window before a channel counts as clear
    pub const DEFAULT_SILENCE_WINDOW_MS: u64 = 1_000;

    /// Cadence of the carrier-sense poll
    pub const DEFAULT_SENSE_INTERVAL_MS: u64 = 50;

    /// Default interval between station-feed polls
    pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

    /// Frequency reserved by the network; never broadcast on it
    pub const RESERVED_FREQUENCY_MHZ: f64 = 199.998;

    /// Bounded connection attempts before a worker turns terminal
    pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
}
