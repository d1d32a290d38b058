//! Error types for picturetalk

use thiserror::Error;

/// Result type alias for picturetalk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a conversation
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing or invalid credential, bad settings)
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech capture error
    #[error("capture error: {0}")]
    Capture(String),

    /// Inference request failed or returned an unusable payload
    #[error("inference error: {0}")]
    Inference(String),

    /// Speech synthesis or playback error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// The conversation task has shut down
    #[error("conversation closed")]
    Closed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error ends any attempt to hold a conversation
    ///
    /// Only configuration problems are fatal; everything else is reported
    /// and the session carries on.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_errors_are_fatal() {
        assert!(Error::Config("missing key".to_string()).is_fatal());
        assert!(!Error::Inference("503".to_string()).is_fatal());
        assert!(!Error::Capture("no-speech".to_string()).is_fatal());
        assert!(!Error::Synthesis("no voice".to_string()).is_fatal());
    }
}
