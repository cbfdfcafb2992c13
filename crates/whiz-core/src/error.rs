use thiserror::Error;

/// Top-level error type for whiz.
#[derive(Debug, Error)]
pub enum WhizError {
    /// Error from the messaging transport (send, download, metadata).
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// A command handler failed.
    #[error("command error: {0}")]
    Command(String),

    /// Device-linking error.
    #[error("link error: {0}")]
    Link(String),

    /// Outbound HTTP error (logo fetch, search APIs).
    #[error("http error: {0}")]
    Http(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
