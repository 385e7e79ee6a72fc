//! Station pool reconciliation
//!
//! The registry is the sole owner of worker lifetimes. On every poll cycle
//! it diffs the desired station set against the running pool: absent
//! callsigns are stopped, new callsigns get fresh workers, changed scripts
//! are swapped in place. Workers that reported a terminal failure since the
//! last cycle are cleaned out first, so a still-desired callsign comes back
//! on the next reconcile.

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::Synthesizer;
use crate::config::AppConfig;
use crate::source::{StationSource, StationSpec};
use crate::station::worker::{StationEvent, StationHandle};
use crate::station::ConnectionState;
use crate::transport::{channel_name, VoiceConnector};

/// Actions taken by one reconcile cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    /// Stations restarted because their frequency moved
    pub recreated: usize,
    pub skipped_reserved: usize,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Inspection snapshot of one running station.
#[derive(Debug, Clone)]
pub struct StationStatus {
    pub callsign: String,
    pub frequency: f64,
    pub channel: String,
    pub state: ConnectionState,
}

/// Owns the callsign → worker pool and reconciles it against the feed.
pub struct StationRegistry {
    connector: Arc<dyn VoiceConnector>,
    synthesizer: Arc<dyn Synthesizer>,
    config: AppConfig,
    stations: DashMap<String, StationHandle>,
    events_tx: Sender<StationEvent>,
    events_rx: Receiver<StationEvent>,
    last_poll: Mutex<Option<DateTime<Utc>>>,
    poll_failures: AtomicU64,
}

impl StationRegistry {
    pub fn new(
        connector: Arc<dyn VoiceConnector>,
        synthesizer: Arc<dyn Synthesizer>,
        config: AppConfig,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            connector,
            synthesizer,
            config,
            stations: DashMap::new(),
            events_tx,
            events_rx,
            last_poll: Mutex::new(None),
            poll_failures: AtomicU64::new(0),
        }
    }

    /// Drive the pool toward the desired set. Idempotent: reconciling the
    /// same set twice performs no actions the second time.
    pub fn reconcile(&self, specs: &[StationSpec]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        self.drain_events();

        let mut desired: HashMap<&str, &StationSpec> = HashMap::new();
        for spec in specs {
            if (spec.frequency - self.config.source.reserved_frequency).abs() < 1e-3 {
                tracing::debug!(callsign = %spec.callsign, "skipping reserved frequency");
                summary.skipped_reserved += 1;
                continue;
            }
            desired.insert(spec.callsign.as_str(), spec);
        }

        // stop workers whose callsign left the feed
        let absent: Vec<String> = self
            .stations
            .iter()
            .filter(|entry| !desired.contains_key(entry.key().as_str()))
            .map(|entry| entry.key().clone())
            .collect();
        for callsign in absent {
            if let Some((_, mut handle)) = self.stations.remove(&callsign) {
                tracing::info!(callsign = %callsign, "station left the feed, stopping");
                handle.stop();
                summary.removed += 1;
            }
        }

        for (callsign, spec) in desired {
            let frequency_moved = match self.stations.get(callsign) {
                Some(handle) => {
                    if handle.channel() == channel_name(spec.frequency) {
                        if handle.applied_script() != spec.script {
                            handle.update_script(&spec.script);
                            summary.updated += 1;
                        }
                        continue;
                    }
                    true
                }
                None => false,
            };

            if frequency_moved {
                // no live channel migration; restart on the new frequency
                if let Some((_, mut handle)) = self.stations.remove(callsign) {
                    tracing::info!(
                        callsign = %callsign,
                        frequency = spec.frequency,
                        "frequency changed, restarting station"
                    );
                    handle.stop();
                }
                if self.start_station(spec) {
                    summary.recreated += 1;
                }
            } else if self.start_station(spec) {
                summary.created += 1;
            }
        }

        summary
    }

    fn start_station(&self, spec: &StationSpec) -> bool {
        match StationHandle::spawn(
            spec,
            self.connector.clone(),
            self.synthesizer.clone(),
            self.config.clone(),
            self.events_tx.clone(),
        ) {
            Ok(handle) => {
                tracing::info!(
                    callsign = %spec.callsign,
                    frequency = spec.frequency,
                    channel = %handle.channel(),
                    "station started"
                );
                self.stations.insert(spec.callsign.clone(), handle);
                true
            }
            Err(e) => {
                tracing::error!(callsign = %spec.callsign, "failed to spawn station: {e}");
                false
            }
        }
    }

    /// Process lifecycle events reported since the last cycle. A terminal
    /// failure removes the worker; if the feed still wants that callsign,
    /// the same reconcile recreates it.
    fn drain_events(&self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                StationEvent::Failed { callsign, reason } => {
                    tracing::warn!(callsign = %callsign, "removing failed station: {reason}");
                    if let Some((_, mut handle)) = self.stations.remove(&callsign) {
                        handle.stop();
                    }
                }
                StationEvent::Connected { callsign } => {
                    tracing::debug!(callsign = %callsign, "station connected");
                }
                StationEvent::Joined { callsign } => {
                    tracing::debug!(callsign = %callsign, "station joined its channel");
                }
            }
        }
    }

    /// Stop every worker and empty the pool.
    pub fn stop_all(&self) {
        let callsigns: Vec<String> = self.stations.iter().map(|e| e.key().clone()).collect();
        for callsign in callsigns {
            if let Some((_, mut handle)) = self.stations.remove(&callsign) {
                handle.stop();
            }
        }
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn contains(&self, callsign: &str) -> bool {
        self.stations.contains_key(callsign)
    }

    /// Safe snapshot of the running pool for inspection.
    pub fn snapshot(&self) -> Vec<StationStatus> {
        self.stations
            .iter()
            .map(|entry| StationStatus {
                callsign: entry.callsign().to_string(),
                frequency: entry.frequency(),
                channel: entry.channel().to_string(),
                state: entry.state(),
            })
            .collect()
    }

    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        *self.last_poll.lock()
    }

    pub fn poll_failures(&self) -> u64 {
        self.poll_failures.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Poll the feed at the configured interval and reconcile each result.
/// A failed poll is logged and skipped; the running pool is untouched.
/// Runs until `running` clears, then stops every worker.
pub fn run_poll_loop(
    registry: Arc<StationRegistry>,
    source: Box<dyn StationSource>,
    running: Arc<AtomicBool>,
) {
    let interval = registry.config.source.poll_interval();
    tracing::info!(interval_secs = interval.as_secs(), "station feed poll loop started");

    while running.load(Ordering::SeqCst) {
        match source.fetch() {
            Ok(specs) => {
                *registry.last_poll.lock() = Some(Utc::now());
                let summary = registry.reconcile(&specs);
                if summary.is_noop() {
                    tracing::debug!(stations = registry.station_count(), "pool unchanged");
                } else {
                    tracing::info!(?summary, stations = registry.station_count(), "pool reconciled");
                }
            }
            Err(e) => {
                registry.poll_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("feed poll failed, keeping current pool: {e}");
            }
        }

        // interval sliced into 1s ticks so shutdown stays prompt
        let deadline = Instant::now() + interval;
        while running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_secs(1)));
        }
    }

    registry.stop_all();
    tracing::info!("station feed poll loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ToneSynthesizer;
    use crate::transport::LoopbackHub;

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.broadcast.silence_window_ms = 20;
        config.broadcast.sense_interval_ms = 5;
        config.broadcast.cycle_cooldown_ms = 10;
        config.broadcast.connect_retry_ms = 10;
        config
    }

    fn registry_with(hub: &LoopbackHub) -> StationRegistry {
        StationRegistry::new(
            Arc::new(hub.clone()),
            Arc::new(ToneSynthesizer::default()),
            fast_config(),
        )
    }

    fn spec(callsign: &str, frequency: f64, script: &str) -> StationSpec {
        StationSpec {
            callsign: callsign.to_string(),
            frequency,
            script: script.to_string(),
        }
    }

    #[test]
    fn test_create_then_idempotent_repoll() {
        let hub = LoopbackHub::new();
        let registry = registry_with(&hub);
        let desired = vec![spec("A", 118.0, "TEST")];

        let first = registry.reconcile(&desired);
        assert_eq!(first.created, 1);
        assert_eq!(registry.station_count(), 1);
        assert!(registry.contains("A"));

        let second = registry.reconcile(&desired);
        assert!(second.is_noop(), "repoll of identical data acted: {:?}", second);
        assert_eq!(registry.station_count(), 1);

        registry.stop_all();
    }

    #[test]
    fn test_station_removed_when_absent_from_poll() {
        let hub = LoopbackHub::new();
        let registry = registry_with(&hub);

        registry.reconcile(&[spec("A", 118.0, "TEST")]);
        let summary = registry.reconcile(&[]);
        assert_eq!(summary.removed, 1);
        assert_eq!(registry.station_count(), 0);
    }

    #[test]
    fn test_script_change_updates_in_place() {
        let hub = LoopbackHub::new();
        let registry = registry_with(&hub);

        registry.reconcile(&[spec("A", 118.0, "OLD")]);

        // let the worker finish connecting before measuring
        let deadline = Instant::now() + Duration::from_secs(2);
        while hub.connection_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let connections_before = hub.connection_count();
        assert_eq!(connections_before, 1);

        let summary = registry.reconcile(&[spec("A", 118.0, "NEW")]);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(summary.removed, 0);

        let status = registry.snapshot();
        assert_eq!(status.len(), 1);
        // worker retained, not reconnected
        assert_eq!(hub.connection_count(), connections_before);

        registry.stop_all();
    }

    #[test]
    fn test_reserved_frequency_is_skipped_silently() {
        let hub = LoopbackHub::new();
        let registry = registry_with(&hub);

        let summary = registry.reconcile(&[spec("GHOST", 199.998, "NOPE")]);
        assert_eq!(summary.skipped_reserved, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(registry.station_count(), 0);
    }

    #[test]
    fn test_frequency_change_restarts_station() {
        let hub = LoopbackHub::new();
        let registry = registry_with(&hub);

        registry.reconcile(&[spec("A", 118.0, "TEST")]);
        let summary = registry.reconcile(&[spec("A", 119.1, "TEST")]);
        assert_eq!(summary.recreated, 1);
        assert_eq!(summary.created, 0);

        let status = registry.snapshot();
        assert_eq!(status[0].channel, "FREQ_119100");

        registry.stop_all();
    }

    #[test]
    fn test_failed_station_is_cleaned_up_and_retried() {
        let hub = LoopbackHub::new();
        hub.set_refuse_connections(true);
        let registry = registry_with(&hub);

        let desired = vec![spec("A", 118.0, "TEST")];
        assert_eq!(registry.reconcile(&desired).created, 1);

        // wait for the worker to exhaust its attempts and report failure
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            let entry = registry.stations.get("A");
            if entry.map_or(true, |h| h.is_finished()) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        // same desired set: failed worker is removed, then recreated
        let summary = registry.reconcile(&desired);
        assert_eq!(summary.created, 1);
        assert_eq!(registry.station_count(), 1);

        registry.stop_all();
    }

    #[test]
    fn test_stop_all_empties_pool() {
        let hub = LoopbackHub::new();
        let registry = registry_with(&hub);

        registry.reconcile(&[spec("A", 118.0, "T"), spec("B", 119.0, "T")]);
        assert_eq!(registry.station_count(), 2);

        registry.stop_all();
        assert_eq!(registry.station_count(), 0);
        assert!(hub.members("FREQ_118000").is_empty());
        assert!(hub.members("FREQ_119000").is_empty());
    }
}
