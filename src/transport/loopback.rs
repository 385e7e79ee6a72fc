//! In-process voice transport
//!
//! A hub that models the server side of the transport: named channels,
//! member lists with speaking flags, frame accounting. Stands in for the
//! network client in tests and `atisd` dry runs, and doubles as the test
//! double for worker carrier-sense and reconnect behavior (speaking flags
//! and connection refusal are scriptable from the outside).

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{Participant, VoiceConnector, VoiceSession};
use crate::error::TransportError;

#[derive(Default)]
struct HubState {
    /// channel name -> member identity -> speaking flag
    channels: HashMap<String, HashMap<String, bool>>,
    /// frames accepted per sender identity, in send order
    frames: HashMap<String, Vec<Bytes>>,
    /// identities whose next transport call fails (simulated connection drop)
    kicked: HashSet<String>,
    refuse_connections: bool,
    connections: u64,
}

/// Shared in-process transport hub.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse all future connection attempts.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Place an external participant (a "pilot") on a channel, creating
    /// the channel if needed.
    pub fn add_listener(&self, channel: &str, identity: &str) {
        self.state
            .lock()
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(identity.to_string(), false);
    }

    /// Flip a participant's speaking flag.
    pub fn set_speaking(&self, channel: &str, identity: &str, speaking: bool) {
        if let Some(members) = self.state.lock().channels.get_mut(channel) {
            if let Some(flag) = members.get_mut(identity) {
                *flag = speaking;
            }
        }
    }

    /// Drop an identity's session out from under it; its next transport
    /// call (frame send or participant poll) fails once, as a severed
    /// network connection would.
    pub fn kick(&self, identity: &str) {
        self.state.lock().kicked.insert(identity.to_string());
    }

    pub fn frames_from(&self, identity: &str) -> u64 {
        self.state
            .lock()
            .frames
            .get(identity)
            .map_or(0, |sent| sent.len() as u64)
    }

    /// Every frame accepted from a sender, in send order.
    pub fn sent_frames(&self, identity: &str) -> Vec<Bytes> {
        self.state
            .lock()
            .frames
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }

    pub fn channel_exists(&self, name: &str) -> bool {
        self.state.lock().channels.contains_key(name)
    }

    pub fn members(&self, channel: &str) -> Vec<String> {
        self.state
            .lock()
            .channels
            .get(channel)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> u64 {
        self.state.lock().connections
    }
}

impl VoiceConnector for LoopbackHub {
    fn connect(
        &self,
        _host: &str,
        identity: &str,
        _credential: &str,
    ) -> Result<Box<dyn VoiceSession>, TransportError> {
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(TransportError::ConnectionFailed(
                "connection refused".into(),
            ));
        }
        state.connections += 1;
        Ok(Box::new(LoopbackSession {
            state: self.state.clone(),
            identity: identity.to_string(),
            channel: None,
            connected: true,
        }))
    }
}

struct LoopbackSession {
    state: Arc<Mutex<HubState>>,
    identity: String,
    channel: Option<String>,
    connected: bool,
}

impl LoopbackSession {
    /// Consume a pending kick: membership is dropped and the session is
    /// dead until the owner reconnects.
    fn sever_if_kicked(&mut self, channel: &str) -> bool {
        let mut state = self.state.lock();
        if !state.kicked.remove(&self.identity) {
            return false;
        }
        if let Some(members) = state.channels.get_mut(channel) {
            members.remove(&self.identity);
        }
        drop(state);
        self.connected = false;
        self.channel = None;
        true
    }
}

impl VoiceSession for LoopbackSession {
    fn join_channel(
        &mut self,
        name: &str,
        create_if_missing: bool,
        _temporary: bool,
    ) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        let mut state = self.state.lock();
        if !state.channels.contains_key(name) {
            if !create_if_missing {
                return Err(TransportError::ChannelResolution(name.to_string()));
            }
            state.channels.insert(name.to_string(), HashMap::new());
        }
        if let Some(members) = state.channels.get_mut(name) {
            members.insert(self.identity.clone(), false);
        }
        self.channel = Some(name.to_string());
        Ok(())
    }

    fn send_audio_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        let channel = self.channel.clone().ok_or(TransportError::NotJoined)?;
        if self.sever_if_kicked(&channel) {
            return Err(TransportError::SendFailed("connection reset".into()));
        }
        debug_assert!(!frame.is_empty());
        self.state
            .lock()
            .frames
            .entry(self.identity.clone())
            .or_default()
            .push(frame);
        Ok(())
    }

    fn participants(&mut self) -> Result<Vec<Participant>, TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        let channel = self.channel.clone().ok_or(TransportError::NotJoined)?;
        if self.sever_if_kicked(&channel) {
            return Err(TransportError::Disconnected);
        }
        let state = self.state.lock();
        Ok(state
            .channels
            .get(&channel)
            .map(|members| {
                members
                    .iter()
                    .map(|(identity, &speaking)| Participant {
                        identity: identity.clone(),
                        is_speaking: speaking,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        if let Some(channel) = self.channel.take() {
            if let Some(members) = self.state.lock().channels.get_mut(&channel) {
                members.remove(&self.identity);
            }
        }
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_creates_channel_once() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect("host", "station-a", "").unwrap();
        a.join_channel("FREQ_118000", true, true).unwrap();
        assert!(hub.channel_exists("FREQ_118000"));

        let mut b = hub.connect("host", "station-b", "").unwrap();
        // second joiner resolves the existing channel without creating
        b.join_channel("FREQ_118000", false, true).unwrap();
        assert_eq!(hub.members("FREQ_118000").len(), 2);
    }

    #[test]
    fn test_join_missing_channel_without_create_fails() {
        let hub = LoopbackHub::new();
        let mut session = hub.connect("host", "x", "").unwrap();
        let err = session.join_channel("FREQ_121500", false, true);
        assert!(matches!(err, Err(TransportError::ChannelResolution(_))));
    }

    #[test]
    fn test_send_requires_join() {
        let hub = LoopbackHub::new();
        let mut session = hub.connect("host", "x", "").unwrap();
        let err = session.send_audio_frame(Bytes::from_static(&[0u8; 4]));
        assert!(matches!(err, Err(TransportError::NotJoined)));
    }

    #[test]
    fn test_frames_are_counted() {
        let hub = LoopbackHub::new();
        let mut session = hub.connect("host", "x", "").unwrap();
        session.join_channel("FREQ_118000", true, true).unwrap();
        for _ in 0..3 {
            session.send_audio_frame(Bytes::from_static(&[0u8; 4])).unwrap();
        }
        assert_eq!(hub.frames_from("x"), 3);
    }

    #[test]
    fn test_kick_fails_one_send_and_drops_session() {
        let hub = LoopbackHub::new();
        let mut session = hub.connect("host", "x", "").unwrap();
        session.join_channel("FREQ_118000", true, true).unwrap();
        hub.kick("x");
        assert!(session.send_audio_frame(Bytes::from_static(&[0u8; 4])).is_err());
        // session is dead until reconnected
        assert!(session.send_audio_frame(Bytes::from_static(&[0u8; 4])).is_err());
        assert!(hub.members("FREQ_118000").is_empty());
    }

    #[test]
    fn test_kick_fails_participant_poll_too() {
        let hub = LoopbackHub::new();
        let mut session = hub.connect("host", "x", "").unwrap();
        session.join_channel("FREQ_118000", true, true).unwrap();
        hub.kick("x");
        assert!(session.participants().is_err());
        assert!(session.participants().is_err());
        assert!(hub.members("FREQ_118000").is_empty());
    }

    #[test]
    fn test_sent_frames_preserve_payload_order() {
        let hub = LoopbackHub::new();
        let mut session = hub.connect("host", "x", "").unwrap();
        session.join_channel("FREQ_118000", true, true).unwrap();
        session.send_audio_frame(Bytes::from_static(b"one!")).unwrap();
        session.send_audio_frame(Bytes::from_static(b"two!")).unwrap();
        let sent = hub.sent_frames("x");
        assert_eq!(sent, vec![Bytes::from_static(b"one!"), Bytes::from_static(b"two!")]);
    }

    #[test]
    fn test_disconnect_leaves_channel_and_is_idempotent() {
        let hub = LoopbackHub::new();
        let mut session = hub.connect("host", "x", "").unwrap();
        session.join_channel("FREQ_118000", true, true).unwrap();
        session.disconnect();
        session.disconnect();
        assert!(hub.members("FREQ_118000").is_empty());
    }
}
