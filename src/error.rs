//! Error types for welcome-back.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required credential or path is absent.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// A config or `.env` file exists but cannot be used.
    #[error("invalid config file {}: {reason}", .path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    /// An input file (audio to play, reference sample) does not exist.
    #[error("file not found: {}", .0.display())]
    InputMissing(PathBuf),

    /// The backend binary or device could not be started at all.
    #[error("{backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// The backend ran and reported an error.
    #[error("{backend} failed: {reason}")]
    BackendFailed { backend: String, reason: String },

    /// Every playback backend was tried without success.
    #[error("{0}")]
    NoBackendLeft(Exhausted),

    /// Text generation or speech synthesis collaborator failed.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Why the playback chain ran dry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exhausted {
    /// No backend could even be started.
    NothingAvailable,
    /// At least one backend ran; these are the reported errors in order.
    AllFailed(Vec<String>),
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingAvailable => write!(f, "no audio player available"),
            Self::AllFailed(errors) => {
                write!(f, "audio playback failed: {}", errors.join("; "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_missing_message_names_path() {
        let err = Error::InputMissing(PathBuf::from("/tmp/missing.wav"));
        assert_eq!(err.to_string(), "file not found: /tmp/missing.wav");
    }

    #[test]
    fn exhausted_messages_are_distinct() {
        let none = Error::NoBackendLeft(Exhausted::NothingAvailable);
        assert_eq!(none.to_string(), "no audio player available");

        let failed = Error::NoBackendLeft(Exhausted::AllFailed(vec![
            "aplay failed: exit status 1".into(),
            "mpv failed: exit status 2".into(),
        ]));
        assert_eq!(
            failed.to_string(),
            "audio playback failed: aplay failed: exit status 1; mpv failed: exit status 2"
        );
    }
}
