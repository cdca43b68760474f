//! Error types for the listener.

use thiserror::Error;

/// Error that can occur while configuring or running the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// NATS connection error
    #[error("NATS connection error: {0}")]
    Connection(#[from] async_nats::ConnectError),

    /// Stream lookup request failed
    #[error("Stream lookup error: {0}")]
    StreamLookup(String),

    /// No stream covers the requested subject
    #[error("No stream found covering subject '{0}'")]
    StreamNotFound(String),

    /// Consumer error
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Start date outside the accepted format
    #[error("Invalid start date '{input}', expected YYYY-MM-DD format")]
    InvalidStartDate { input: String },

    /// Requested handler is not registered
    #[error("Unregistered handler '{name}', available handlers: {available}")]
    UnregisteredHandler { name: String, available: String },
}

impl ListenerError {
    /// Create a stream lookup error from an async_nats error.
    pub fn from_lookup_error(error: impl std::fmt::Display) -> Self {
        Self::StreamLookup(error.to_string())
    }

    /// Create a consumer error.
    pub fn consumer_error(msg: impl Into<String>) -> Self {
        Self::Consumer(msg.into())
    }

    /// Create a configuration error.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
