//! Per-station broadcast worker
//!
//! Each station runs on its own dedicated thread and owns its transport
//! session, its normalized script, and its occupancy monitor exclusively.
//! The state machine:
//!
//! ```text
//! Disconnected → Connecting → Joined → { sense ⇄ transmit } → Disconnected
//!                    │
//!                    └──(attempts exhausted)──▶ Failed (terminal)
//! ```
//!
//! The registry talks to a running worker through its [`StationHandle`]:
//! script updates land in a slot the worker snapshots at the start of each
//! announcement cycle, so an in-flight segment always finishes with the
//! text it started with. `stop()` is cooperative; the run flag is checked
//! at every suspension point.

use bytes::Bytes;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::{pcm, Synthesizer};
use crate::config::AppConfig;
use crate::constants::FRAME_MS;
use crate::error::TransportError;
use crate::source::StationSpec;
use crate::station::monitor::OccupancyMonitor;
use crate::text::{normalize_script, NormalizedScript};
use crate::transport::{channel_name, station_identity, Participant, VoiceConnector, VoiceSession};

/// Connection lifecycle of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Joined,
    Failed,
}

/// Lifecycle events a worker reports back to the registry
#[derive(Debug, Clone)]
pub enum StationEvent {
    Connected { callsign: String },
    Joined { callsign: String },
    Failed { callsign: String, reason: String },
}

struct ScriptSlot {
    raw: String,
    normalized: NormalizedScript,
}

struct WorkerShared {
    callsign: String,
    frequency: f64,
    channel: String,
    identity: String,
    running: AtomicBool,
    state: Mutex<ConnectionState>,
    script: Mutex<ScriptSlot>,
}

/// Registry-side handle to a running worker thread.
pub struct StationHandle {
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
}

impl StationHandle {
    /// Spawn a worker for the given spec. The thread is named after the
    /// callsign, the identity and channel are derived from the frequency.
    pub fn spawn(
        spec: &StationSpec,
        connector: Arc<dyn VoiceConnector>,
        synthesizer: Arc<dyn Synthesizer>,
        config: AppConfig,
        events: Sender<StationEvent>,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(WorkerShared {
            callsign: spec.callsign.clone(),
            frequency: spec.frequency,
            channel: channel_name(spec.frequency),
            identity: station_identity(spec.frequency),
            running: AtomicBool::new(true),
            state: Mutex::new(ConnectionState::Disconnected),
            script: Mutex::new(ScriptSlot {
                raw: spec.script.clone(),
                normalized: normalize_script(&spec.script),
            }),
        });

        let worker = BroadcastWorker {
            shared: shared.clone(),
            connector,
            synthesizer,
            config,
            events,
        };

        let thread = thread::Builder::new()
            .name(format!("station-{}", spec.callsign))
            .spawn(move || worker.run())?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    pub fn callsign(&self) -> &str {
        &self.shared.callsign
    }

    pub fn frequency(&self) -> f64 {
        self.shared.frequency
    }

    pub fn channel(&self) -> &str {
        &self.shared.channel
    }

    pub fn identity(&self) -> &str {
        &self.shared.identity
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn is_failed(&self) -> bool {
        self.state() == ConnectionState::Failed
    }

    /// Raw script text currently applied to this worker.
    pub fn applied_script(&self) -> String {
        self.shared.script.lock().raw.clone()
    }

    /// Swap in a new script. Picked up at the start of the next
    /// announcement cycle; never interrupts an in-flight transmission.
    pub fn update_script(&self, raw: &str) {
        let mut slot = self.shared.script.lock();
        slot.raw = raw.to_string();
        slot.normalized = normalize_script(raw);
        tracing::info!(callsign = %self.shared.callsign, "script updated");
    }

    /// Signal the worker to exit and wait for its thread. Safe to call at
    /// any time, including mid-transmission; idempotent.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for StationHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct BroadcastWorker {
    shared: Arc<WorkerShared>,
    connector: Arc<dyn VoiceConnector>,
    synthesizer: Arc<dyn Synthesizer>,
    config: AppConfig,
    events: Sender<StationEvent>,
}

impl BroadcastWorker {
    fn run(&self) {
        self.set_state(ConnectionState::Connecting);

        let mut session = match self.connect_with_retry() {
            Ok(session) => session,
            Err(TransportError::Disconnected) => {
                // stopped before a connection came up
                self.set_state(ConnectionState::Disconnected);
                return;
            }
            Err(e) => return self.fail(e.to_string()),
        };
        let _ = self.events.send(StationEvent::Connected {
            callsign: self.shared.callsign.clone(),
        });

        if let Err(e) = self.join_channel(&mut session) {
            session.disconnect();
            return self.fail(e.to_string());
        }
        self.set_state(ConnectionState::Joined);
        let _ = self.events.send(StationEvent::Joined {
            callsign: self.shared.callsign.clone(),
        });
        tracing::info!(
            callsign = %self.shared.callsign,
            channel = %self.shared.channel,
            "station on the air"
        );

        let mut monitor = OccupancyMonitor::new(self.config.broadcast.silence_window());

        while self.running() {
            if let Err(e) = self.announcement_cycle(&mut session, &mut monitor) {
                session.disconnect();
                if self.running() {
                    return self.fail(e.to_string());
                }
                // error surfaced while stopping; not a station fault
                self.set_state(ConnectionState::Disconnected);
                return;
            }
        }

        session.disconnect();
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(callsign = %self.shared.callsign, "station stopped");
    }

    /// One full announcement: wait for a clear channel, speak the
    /// localized segment first when configured, then the English segment,
    /// then the configured cooldown.
    fn announcement_cycle(
        &self,
        session: &mut Box<dyn VoiceSession>,
        monitor: &mut OccupancyMonitor,
    ) -> Result<(), TransportError> {
        if !self.wait_for_clear(session, monitor)? {
            return Ok(());
        }

        // Snapshot: an update delivered mid-cycle applies to the next one.
        let script = self.shared.script.lock().normalized.clone();

        let mut frames_sent = 0;
        if let Some(localized) = script.localized() {
            frames_sent +=
                self.transmit_segment(session, monitor, localized, &self.config.voices.localized)?;
            if !self.running() || !self.wait_for_clear(session, monitor)? {
                return Ok(());
            }
        }
        frames_sent +=
            self.transmit_segment(session, monitor, script.english(), &self.config.voices.english)?;

        // a cycle that put nothing on the air (empty script, failed
        // synthesis) must not spin hot against the engine
        let cooldown = self.config.broadcast.cycle_cooldown();
        if frames_sent == 0 {
            self.idle(cooldown.max(self.config.broadcast.sense_interval()));
        } else {
            self.idle(cooldown);
        }
        Ok(())
    }

    /// Sense at the configured cadence until the channel is clear.
    /// Returns `Ok(false)` when the worker was stopped while waiting.
    /// A session dropped while sensing goes through the same reconnect
    /// path as a failed frame send.
    fn wait_for_clear(
        &self,
        session: &mut Box<dyn VoiceSession>,
        monitor: &mut OccupancyMonitor,
    ) -> Result<bool, TransportError> {
        loop {
            if !self.running() {
                return Ok(false);
            }
            let participants = self.poll_participants(session)?;
            if monitor.channel_clear(&participants, &self.shared.identity, Instant::now()) {
                return Ok(true);
            }
            self.idle(self.config.broadcast.sense_interval());
        }
    }

    /// Synthesize one segment and send it as paced fixed-size frames,
    /// returning how many frames went out.
    ///
    /// Synthesis failure skips the segment for this cycle. If the channel
    /// becomes occupied mid-transmission the position is held and emission
    /// resumes once clear; the segment never restarts from the top.
    fn transmit_segment(
        &self,
        session: &mut Box<dyn VoiceSession>,
        monitor: &mut OccupancyMonitor,
        text: &str,
        voice: &str,
    ) -> Result<usize, TransportError> {
        let synthesized = match self.synthesizer.synthesize(text, voice) {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::warn!(
                    callsign = %self.shared.callsign,
                    "synthesis failed, skipping segment this cycle: {e}"
                );
                return Ok(0);
            }
        };
        let frames = match pcm::to_transport_frames(&synthesized.samples, synthesized.sample_rate)
        {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(
                    callsign = %self.shared.callsign,
                    "PCM conditioning failed, skipping segment this cycle: {e}"
                );
                return Ok(0);
            }
        };

        tracing::debug!(
            callsign = %self.shared.callsign,
            frames = frames.len(),
            duration_secs = synthesized.duration_secs(),
            "transmitting segment"
        );

        let mut sent = 0;
        for frame in frames {
            if !self.running() {
                return Ok(sent);
            }
            loop {
                let participants = self.poll_participants(session)?;
                if monitor.channel_clear(&participants, &self.shared.identity, Instant::now()) {
                    break;
                }
                if !self.running() {
                    return Ok(sent);
                }
                self.idle(self.config.broadcast.sense_interval());
            }
            self.send_frame(session, frame)?;
            sent += 1;
            // real-time pacing; faster than this garbles receiver timing
            thread::sleep(Duration::from_millis(FRAME_MS));
        }
        Ok(sent)
    }

    /// Send one frame, recovering a dropped session once before giving up.
    /// Exhausted reconnects escalate to a terminal error.
    fn send_frame(
        &self,
        session: &mut Box<dyn VoiceSession>,
        frame: Bytes,
    ) -> Result<(), TransportError> {
        match session.send_audio_frame(frame.clone()) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    callsign = %self.shared.callsign,
                    "frame send failed ({e}), reconnecting"
                );
                self.recover_session(session)?;
                session.send_audio_frame(frame)
            }
        }
    }

    /// List the channel participants, recovering a dropped session once.
    /// A transient drop between segments rejoins instead of turning the
    /// station terminal.
    fn poll_participants(
        &self,
        session: &mut Box<dyn VoiceSession>,
    ) -> Result<Vec<Participant>, TransportError> {
        match session.participants() {
            Ok(participants) => Ok(participants),
            Err(e) => {
                tracing::warn!(
                    callsign = %self.shared.callsign,
                    "participant poll failed ({e}), reconnecting"
                );
                self.recover_session(session)?;
                session.participants()
            }
        }
    }

    /// Reconnect and rejoin the channel, replacing the dead session.
    fn recover_session(&self, session: &mut Box<dyn VoiceSession>) -> Result<(), TransportError> {
        self.set_state(ConnectionState::Connecting);
        let mut fresh = self.connect_with_retry()?;
        self.join_channel(&mut fresh)?;
        self.set_state(ConnectionState::Joined);
        *session = fresh;
        Ok(())
    }

    fn connect_with_retry(&self) -> Result<Box<dyn VoiceSession>, TransportError> {
        let attempts = self.config.broadcast.connect_attempts.max(1);
        let mut last_err = TransportError::ConnectionFailed("no attempts made".into());
        for attempt in 1..=attempts {
            if !self.running() {
                return Err(TransportError::Disconnected);
            }
            match self.connector.connect(
                &self.config.server.host,
                &self.shared.identity,
                &self.config.server.credential,
            ) {
                Ok(session) => return Ok(session),
                Err(e) => {
                    tracing::warn!(
                        callsign = %self.shared.callsign,
                        attempt,
                        attempts,
                        "connect failed: {e}"
                    );
                    last_err = e;
                }
            }
            if attempt < attempts {
                self.idle(self.config.broadcast.connect_retry());
            }
        }
        Err(last_err)
    }

    /// Join the frequency channel, creating it as temporary when missing.
    /// A failed create is assumed to be an already-exists race; re-resolve
    /// by name once after a short delay before giving up.
    fn join_channel(&self, session: &mut Box<dyn VoiceSession>) -> Result<(), TransportError> {
        match session.join_channel(&self.shared.channel, true, true) {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::debug!(
                    channel = %self.shared.channel,
                    "channel create raced ({first}), re-resolving by name"
                );
                self.idle(Duration::from_millis(100));
                session.join_channel(&self.shared.channel, false, true)
            }
        }
    }

    fn fail(&self, reason: String) {
        self.set_state(ConnectionState::Failed);
        tracing::error!(callsign = %self.shared.callsign, "station worker failed: {reason}");
        let _ = self.events.send(StationEvent::Failed {
            callsign: self.shared.callsign.clone(),
            reason,
        });
    }

    fn running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.shared.state.lock() = state;
        tracing::debug!(callsign = %self.shared.callsign, ?state, "state transition");
    }

    /// Sleep in short slices so stop() stays prompt through long waits.
    fn idle(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
    }
}
