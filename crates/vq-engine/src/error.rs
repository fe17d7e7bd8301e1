//! Error types for quality measurement

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Measurement errors
#[derive(Error, Debug)]
pub enum VisqolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Empty audio: {0}")]
    EmptyAudio(String),

    /// Reference and degraded spectrograms disagree in shape. Signals a bug,
    /// never a bad user input.
    #[error("Spectrogram alignment fault: {0}")]
    Alignment(String),

    #[error("Failed to load quality model: {0}")]
    ModelLoad(String),

    /// Informational only: recorded when the engine falls back to the
    /// approximate backend, never returned from a measurement.
    #[error("High-fidelity backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Sample rate conversion failed: {0}")]
    Resample(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Measurement cancelled")]
    Cancelled,

    /// Filesystem failure. A missing or unopenable input file lands here,
    /// not in `Decode`, which is kept for files that open but do not parse.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable classification of a [`VisqolError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Decode,
    EmptyAudio,
    Alignment,
    ModelLoad,
    BackendUnavailable,
    Resample,
    Config,
    Report,
    Cancelled,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Decode => "decode",
            ErrorKind::EmptyAudio => "empty_audio",
            ErrorKind::Alignment => "alignment",
            ErrorKind::ModelLoad => "model_load",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::Resample => "resample",
            ErrorKind::Config => "config",
            ErrorKind::Report => "report",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VisqolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VisqolError::InvalidInput(_) => ErrorKind::InvalidInput,
            VisqolError::Decode(_) => ErrorKind::Decode,
            VisqolError::EmptyAudio(_) => ErrorKind::EmptyAudio,
            VisqolError::Alignment(_) => ErrorKind::Alignment,
            VisqolError::ModelLoad(_) => ErrorKind::ModelLoad,
            VisqolError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            VisqolError::Resample(_) => ErrorKind::Resample,
            VisqolError::Config(_) => ErrorKind::Config,
            VisqolError::Report(_) => ErrorKind::Report,
            VisqolError::Cancelled => ErrorKind::Cancelled,
            VisqolError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<csv::Error> for VisqolError {
    fn from(e: csv::Error) -> Self {
        VisqolError::Report(e.to_string())
    }
}

impl From<serde_json::Error> for VisqolError {
    fn from(e: serde_json::Error) -> Self {
        VisqolError::Report(e.to_string())
    }
}

/// Result type for measurement operations
pub type Result<T> = std::result::Result<T, VisqolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            VisqolError::EmptyAudio("x".into()).kind(),
            ErrorKind::EmptyAudio
        );
        assert_eq!(VisqolError::Cancelled.kind(), ErrorKind::Cancelled);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(VisqolError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_display_carries_message() {
        let err = VisqolError::ModelLoad("audio.json: missing".into());
        assert_eq!(
            err.to_string(),
            "Failed to load quality model: audio.json: missing"
        );
        assert_eq!(ErrorKind::ModelLoad.to_string(), "model_load");
    }
}
