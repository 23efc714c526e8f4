//! Error types for Segue.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using Segue's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Segue operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An audio format cannot be handled by the processing chain.
    #[error("unhandled audio format {format}: {reason}")]
    UnhandledAudioFormat {
        /// Description of the offending format.
        format: String,
        /// Why the format was rejected.
        reason: String,
    },

    /// A segment or stage was configured with invalid parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// An operation was called in a state where the contract forbids it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A frame processing stage reported a failure.
    #[error("stage error: {0}")]
    Stage(String),

    /// The task executor is no longer accepting work.
    #[error("executor error: {0}")]
    Executor(String),

    /// A bounded wait expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Build an [`Error::UnhandledAudioFormat`] from anything printable.
    pub fn unhandled_format(format: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Error::UnhandledAudioFormat {
            format: format.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors raised while configuring a segment.
    ///
    /// These are never retried: the caller either skips the segment or
    /// aborts the export.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::UnhandledAudioFormat { .. } | Error::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_classification() {
        assert!(Error::Config("bad".into()).is_configuration_error());
        assert!(Error::unhandled_format("44100Hz", "no").is_configuration_error());
        assert!(!Error::InvalidState("twice".into()).is_configuration_error());
        assert!(!Error::Timeout(Duration::from_millis(5)).is_configuration_error());
    }

    #[test]
    fn test_unhandled_format_message() {
        let err = Error::unhandled_format("48000Hz/6ch/S16Le", "no channel matrix");
        assert_eq!(
            err.to_string(),
            "unhandled audio format 48000Hz/6ch/S16Le: no channel matrix"
        );
    }
}
