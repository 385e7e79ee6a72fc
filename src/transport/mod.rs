//! Voice transport boundary
//!
//! The real network client (Mumble-style: sessions, named channels, raw
//! PCM frames) lives behind the [`VoiceConnector`] / [`VoiceSession`]
//! traits. The frequency-to-channel mapping here is wire compatibility:
//! deployed clients resolve channels by this exact name format.

pub mod loopback;

pub use loopback::LoopbackHub;

use bytes::Bytes;

use crate::error::TransportError;

/// One participant visible on a joined channel.
#[derive(Debug, Clone)]
pub struct Participant {
    pub identity: String,
    /// Whether this participant has produced audio since the last poll
    pub is_speaking: bool,
}

/// Opens transport sessions. Shared by all workers; each worker owns the
/// session it gets back.
pub trait VoiceConnector: Send + Sync {
    fn connect(
        &self,
        host: &str,
        identity: &str,
        credential: &str,
    ) -> Result<Box<dyn VoiceSession>, TransportError>;
}

/// One live transport session, owned by a single worker thread.
pub trait VoiceSession: Send {
    /// Resolve the named channel and move this session into it,
    /// optionally creating it (as temporary) when missing.
    fn join_channel(
        &mut self,
        name: &str,
        create_if_missing: bool,
        temporary: bool,
    ) -> Result<(), TransportError>;

    /// Send one PCM frame to the joined channel.
    fn send_audio_frame(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// List everyone on the joined channel, including self. Like a frame
    /// send, this surfaces a severed connection as an error.
    fn participants(&mut self) -> Result<Vec<Participant>, TransportError>;

    /// Release the session. Idempotent.
    fn disconnect(&mut self);
}

fn frequency_khz(frequency_mhz: f64) -> u32 {
    (frequency_mhz * 1000.0).round() as u32
}

/// Channel name for a frequency: `FREQ_` + kHz zero-padded to six digits.
/// Bit-exact wire format; deployed clients tune by this string.
pub fn channel_name(frequency_mhz: f64) -> String {
    format!("FREQ_{:06}", frequency_khz(frequency_mhz))
}

/// Station user identity for a frequency. The `900_atis` prefix is how
/// humans on the network tell stations from pilots and controllers.
pub fn station_identity(frequency_mhz: f64) -> String {
    format!("900_atis{:06}", frequency_khz(frequency_mhz))
}
