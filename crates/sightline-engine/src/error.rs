//! Error types for the Sightline coordination engine

use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Error codes reported by the speech-to-text collaborator for one listen cycle.
///
/// Every kind is recoverable: the cycle is logged and retried after the backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenErrorKind {
    Audio,
    Client,
    InsufficientPermissions,
    Network,
    NetworkTimeout,
    NoMatch,
    RecognizerBusy,
    Server,
    SpeechTimeout,
    Unknown,
}

impl fmt::Display for ListenErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ListenErrorKind::Audio => "audio recording error",
            ListenErrorKind::Client => "client side error",
            ListenErrorKind::InsufficientPermissions => "insufficient permissions",
            ListenErrorKind::Network => "network error",
            ListenErrorKind::NetworkTimeout => "network timeout",
            ListenErrorKind::NoMatch => "no match found",
            ListenErrorKind::RecognizerBusy => "recognition service busy",
            ListenErrorKind::Server => "server error",
            ListenErrorKind::SpeechTimeout => "no speech input",
            ListenErrorKind::Unknown => "unknown error",
        };
        f.write_str(text)
    }
}

/// Errors that can occur in the coordination engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Recognition timed out after {0}ms")]
    RecognitionTimeout(u64),

    #[error("Speech engine error: {0}")]
    Speech(String),

    #[error("Listening error: {0}")]
    Listening(ListenErrorKind),

    #[error("Motion sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for EngineError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        EngineError::ChannelSend(err.to_string())
    }
}
