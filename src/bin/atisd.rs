//! ATIS broadcast daemon
//!
//! Polls the station feed and keeps one broadcast worker per desired
//! station. The voice transport and speech engine are pluggable trait
//! boundaries; this binary wires the in-process loopback transport and the
//! tone placeholder engine, which makes it a dry-run daemon: full
//! reconciliation, carrier sensing, and pacing against the live feed, with
//! no network voice client linked in.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atis_broadcaster::{
    audio::{Synthesizer, ToneSynthesizer},
    config::AppConfig,
    source::HttpStationSource,
    station::{run_poll_loop, StationRegistry},
    transport::{LoopbackHub, VoiceConnector},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ATIS broadcast daemon");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    tracing::info!(
        feed = %config.source.url,
        poll_interval_secs = config.source.poll_interval_secs,
        "configuration loaded"
    );

    let connector: Arc<dyn VoiceConnector> = Arc::new(LoopbackHub::new());
    let synthesizer: Arc<dyn Synthesizer> = Arc::new(ToneSynthesizer::default());
    tracing::warn!("no voice client linked; running against the loopback transport");

    let source_config = config.source.clone();
    let registry = Arc::new(StationRegistry::new(connector, synthesizer, config));

    let running = Arc::new(AtomicBool::new(true));
    let poll_thread = {
        let registry = registry.clone();
        let running = running.clone();
        // the blocking HTTP client lives on this thread, off the runtime
        thread::Builder::new()
            .name("station-feed-poll".into())
            .spawn(move || match HttpStationSource::new(&source_config) {
                Ok(source) => run_poll_loop(registry, Box::new(source), running),
                Err(e) => tracing::error!("failed to build station feed client: {e}"),
            })?
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, stopping stations");

    running.store(false, Ordering::SeqCst);
    let _ = poll_thread.join();

    let status = registry.snapshot();
    tracing::info!(remaining = status.len(), "daemon stopped");
    Ok(())
}
