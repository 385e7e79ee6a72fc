//! Error types for the broadcast engine

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Station feed error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Voice transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Channel resolution failed for {0}")]
    ChannelResolution(String),

    #[error("Frame send failed: {0}")]
    SendFailed(String),

    #[error("Not joined to any channel")]
    NotJoined,

    #[error("Session is disconnected")]
    Disconnected,

    #[error("Timeout")]
    Timeout,
}

/// Speech synthesis errors
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Engine failed: {0}")]
    EngineFailed(String),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Timeout")]
    Timeout,
}

/// Station feed errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::MalformedPayload(err.to_string())
        } else {
            SourceError::RequestFailed(err.to_string())
        }
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
