//! Error types for vidlens.

use thiserror::Error;

/// Library-level error type for vidlens operations.
#[derive(Error, Debug)]
pub enum VidlensError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Frame extraction failed; the segment cannot be analyzed.
    #[error("Media extraction failed: {0}")]
    Extraction(String),

    /// Asset upload failed. Callers degrade to an audio-less turn.
    #[error("File upload failed: {0}")]
    Upload(String),

    #[error("AI provider is overloaded: {0}")]
    ProviderOverloaded(String),

    #[error("AI provider timed out: {0}")]
    ProviderTimeout(String),

    #[error("AI provider error: {0}")]
    ProviderFatal(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl VidlensError {
    /// Whether the failed provider call may be attempted again.
    ///
    /// Timeouts are transient only when the caller's retry policy says so;
    /// see [`crate::analysis::RetryPolicy`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, VidlensError::ProviderOverloaded(_))
    }

    /// Whether this error is a per-attempt provider timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, VidlensError::ProviderTimeout(_))
    }
}

/// Result type alias for vidlens operations.
pub type Result<T> = std::result::Result<T, VidlensError>;
