//! Application configuration
//!
//! Loaded from a TOML file (path argument or the platform config
//! directory); every field has a default so a missing file still yields a
//! runnable daemon.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::Error;

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub broadcast: BroadcastConfig,
    pub voices: VoiceConfig,
}

/// Voice transport endpoint and station credential
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Transport server host
    pub host: String,
    /// Password shared by all station identities
    pub credential: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            credential: String::new(),
        }
    }
}

/// Desired-station feed settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Feed URL returning the network data JSON
    pub url: String,
    /// Seconds between polls
    pub poll_interval_secs: u64,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Stations on this frequency are skipped, never created
    pub reserved_frequency: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://data.airwaysn.org/v1/data.json".to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout_secs: 10,
            reserved_frequency: RESERVED_FREQUENCY_MHZ,
        }
    }
}

impl SourceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Per-worker broadcast behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Continuous silence required before the channel counts as clear
    pub silence_window_ms: u64,
    /// Carrier-sense poll cadence
    pub sense_interval_ms: u64,
    /// Pause between full announcement cycles (0 = immediate restart)
    pub cycle_cooldown_ms: u64,
    /// Connection attempts before the worker turns terminal
    pub connect_attempts: u32,
    /// Delay between connection attempts
    pub connect_retry_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            silence_window_ms: DEFAULT_SILENCE_WINDOW_MS,
            sense_interval_ms: DEFAULT_SENSE_INTERVAL_MS,
            cycle_cooldown_ms: 0,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_retry_ms: 2_000,
        }
    }
}

impl BroadcastConfig {
    pub fn silence_window(&self) -> Duration {
        Duration::from_millis(self.silence_window_ms)
    }

    pub fn sense_interval(&self) -> Duration {
        Duration::from_millis(self.sense_interval_ms)
    }

    pub fn cycle_cooldown(&self) -> Duration {
        Duration::from_millis(self.cycle_cooldown_ms)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}

/// Speech-engine voice profiles per segment language
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub english: String,
    pub localized: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            english: "en-US-ChristopherNeural".to_string(),
            localized: "zh-CN-YunxiNeural".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the given path, or from the platform
    /// config directory when no path is given. A missing file yields
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Platform config file location, e.g. `~/.config/atisd/atisd.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "atisd")
            .map(|dirs| dirs.config_dir().join("atisd.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.source.poll_interval_secs, 30);
        assert_eq!(config.broadcast.silence_window_ms, 1_000);
        assert!((config.source.reserved_frequency - 199.998).abs() < 1e-9);
    }

    #[test]
    fn test_partial_toml_overlays_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [broadcast]
            cycle_cooldown_ms = 5000

            [voices]
            english = "en-GB-RyanNeural"
            "#,
        )
        .unwrap();

        assert_eq!(config.broadcast.cycle_cooldown_ms, 5_000);
        assert_eq!(config.broadcast.silence_window_ms, 1_000);
        assert_eq!(config.voices.english, "en-GB-RyanNeural");
        assert_eq!(config.voices.localized, "zh-CN-YunxiNeural");
    }
}
