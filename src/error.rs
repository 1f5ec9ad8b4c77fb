//! Error types for Parallax

use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, routing or segmenting messages
#[derive(Error, Debug)]
pub enum Error {
    /// Markup text could not be parsed
    #[error("Parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    /// A tree was well-formed but did not have the expected shape
    /// (missing tag, missing attribute, unreadable value)
    #[error("Structural error: {0}")]
    Structural(String),

    /// Lookup by key found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// A message reached the end of a chain without any role recognizing it
    #[error("Unhandled invoke message: {0}")]
    Unhandled(String),

    /// Segmentation request could not be satisfied
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Every worker that could take a job's outstanding segments is gone
    #[error("Job {job} aborted: {reason}")]
    JobAborted { job: u64, reason: String },

    /// The peer behind a transport is gone
    #[error("Peer disconnected: {0}")]
    Disconnected(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a structural error
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    /// Whether the error only concerns a single message (the connection stays usable)
    pub fn is_per_message(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Structural(_) | Self::NotFound(_) | Self::Unhandled(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::JobAborted { job: 7, reason: "no workers".to_string() };
        assert_eq!(err.to_string(), "Job 7 aborted: no workers");

        let err = Error::Parse { position: 12, message: "unexpected '<'".to_string() };
        assert_eq!(err.to_string(), "Parse error at byte 12: unexpected '<'");
    }

    #[test]
    fn test_per_message_classification() {
        assert!(Error::structural("missing listener").is_per_message());
        assert!(Error::NotFound("Rex".into()).is_per_message());
        assert!(!Error::Disconnected("10.0.1.10:37000".into()).is_per_message());
        assert!(!Error::JobAborted { job: 1, reason: String::new() }.is_per_message());
    }
}
