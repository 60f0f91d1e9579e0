//! Prompter error types

use thiserror::Error;

/// Prompter error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Agent process could not be spawned
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Message channel error
    #[error("Channel error: {0}")]
    Channel(String),

    /// Agent went silent past its inter-message gap
    #[error("Channel timeout: no message from {0} within {1} ms")]
    ChannelTimeout(String, u64),

    /// Agent exhausted its restart budget
    #[error("Agent {0} exceeded max restarts ({1})")]
    MaxRestartsExceeded(String, u32),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Prompter operations
pub type Result<T> = std::result::Result<T, Error>;
