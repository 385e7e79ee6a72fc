//! Desired-station feed
//!
//! The network publishes a JSON data file listing active ATIS stations:
//! `{"atis": [{"callsign", "frequency", "text_atis": [...]}, ...]}`.
//! The registry polls this on a fixed interval; parsing is kept separate
//! from transport so the payload shape is testable offline.

use serde::Deserialize;

use crate::config::SourceConfig;
use crate::error::SourceError;

/// Desired state of one broadcast station. The callsign is the
/// reconciliation key.
#[derive(Debug, Clone, PartialEq)]
pub struct StationSpec {
    pub callsign: String,
    pub frequency: f64,
    pub script: String,
}

/// Pull-based source of the desired station set.
pub trait StationSource: Send {
    fn fetch(&self) -> Result<Vec<StationSpec>, SourceError>;
}

#[derive(Deserialize)]
struct Feed {
    #[serde(default)]
    atis: Vec<FeedRecord>,
}

#[derive(Deserialize)]
struct FeedRecord {
    callsign: String,
    #[serde(default)]
    frequency: FrequencyField,
    #[serde(default)]
    text_atis: Vec<String>,
}

/// The feed has shipped the frequency both as a string and as a number.
#[derive(Deserialize)]
#[serde(untagged)]
enum FrequencyField {
    Number(f64),
    Text(String),
}

impl Default for FrequencyField {
    fn default() -> Self {
        FrequencyField::Number(0.0)
    }
}

impl FrequencyField {
    fn as_mhz(&self) -> Option<f64> {
        match self {
            FrequencyField::Number(mhz) => Some(*mhz),
            FrequencyField::Text(raw) => raw.trim().parse().ok(),
        }
    }
}

/// Parse a raw feed payload into station specs.
///
/// A record with an unparsable frequency is dropped with a warning rather
/// than failing the whole poll cycle.
pub fn parse_feed(raw: &[u8]) -> Result<Vec<StationSpec>, SourceError> {
    let feed: Feed =
        serde_json::from_slice(raw).map_err(|e| SourceError::MalformedPayload(e.to_string()))?;

    Ok(feed
        .atis
        .into_iter()
        .filter_map(|record| {
            let Some(frequency) = record.frequency.as_mhz() else {
                tracing::warn!(
                    callsign = %record.callsign,
                    "dropping feed record with unparsable frequency"
                );
                return None;
            };
            Some(StationSpec {
                callsign: record.callsign,
                frequency,
                script: record.text_atis.join(" "),
            })
        })
        .collect())
}

/// HTTP implementation of the station feed.
pub struct HttpStationSource {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpStationSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

impl StationSource for HttpStationSource {
    fn fetch(&self) -> Result<Vec<StationSpec>, SourceError> {
        let response = self.client.get(&self.url).send()?.error_for_status()?;
        let raw = response.bytes()?;
        parse_feed(&raw)
    }
}
