//! Error types for settings loading.

use thiserror::Error;

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid JSON or has the wrong shape.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override had an unusable value.
    #[error("invalid value for {var}: {message}")]
    InvalidEnv {
        /// The offending environment variable.
        var: String,
        /// What was wrong with it.
        message: String,
    },
}

/// Convenience type alias for settings results.
pub type Result<T> = std::result::Result<T, SettingsError>;
