//! Channel occupancy ("carrier sense") with hysteresis
//!
//! A station must not key up the instant another speaker's trailing
//! syllable ends; the channel counts as clear only after a continuous
//! silence window. Half-duplex radio courtesy.

use std::time::{Duration, Instant};

use crate::transport::Participant;

/// Tracks foreign audio activity on one channel. Owned by the worker that
/// senses with it; the activity timestamp mutates on every observation.
pub struct OccupancyMonitor {
    silence_window: Duration,
    last_activity: Instant,
}

impl OccupancyMonitor {
    /// The monitor starts "occupied": a freshly joined station waits one
    /// full silence window before its first transmission.
    pub fn new(silence_window: Duration) -> Self {
        Self {
            silence_window,
            last_activity: Instant::now(),
        }
    }

    /// Observe the current participant list and report whether the channel
    /// is clear to transmit on. Any foreign speaker resets the silence
    /// clock; clear is reported only once the window has fully elapsed.
    pub fn channel_clear(
        &mut self,
        participants: &[Participant],
        self_identity: &str,
        now: Instant,
    ) -> bool {
        for participant in participants {
            if participant.identity != self_identity && participant.is_speaking {
                self.last_activity = now;
                return false;
            }
        }
        now.duration_since(self.last_activity) >= self.silence_window
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }
}
