//! Handler registration and resolution.

use crate::envelope::MessageEnvelope;
use crate::error::ListenerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Key the built-in logging handler is registered under.
pub const DEFAULT_HANDLER: &str = "log";

/// Error returned by a message handler.
///
/// Opaque by design: the listener only logs it and leaves the message
/// unacknowledged, so handlers are free to wrap any failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// Create a handler error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a handler error with an underlying source.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Message handler trait.
///
/// Implement this to consume decoded messages. Handlers are invoked one
/// message at a time; a returned error leaves the message unacknowledged so
/// the broker redelivers it per its own policy.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a decoded message.
    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError>;

    /// Handler name, used for logging.
    fn name(&self) -> &'static str;
}

/// Built-in handler that logs each message and always succeeds.
#[derive(Debug, Clone, Default)]
pub struct LogHandler;

#[async_trait]
impl MessageHandler for LogHandler {
    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), HandlerError> {
        info!(
            subject = %envelope.subject(),
            data = %envelope.data(),
            "Received message"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Registry mapping handler keys to implementations.
///
/// Handlers are registered at process startup and resolved once per listener
/// run. The registry always contains [`LogHandler`] under [`DEFAULT_HANDLER`].
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    /// Create a registry pre-populated with the built-in logging handler.
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(DEFAULT_HANDLER, Arc::new(LogHandler));
        registry
    }

    /// Register a handler under a key, replacing any previous entry.
    pub fn register(&mut self, key: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(key.into(), handler);
    }

    /// Resolve a handler by key.
    ///
    /// The error names the requested key and every registered alternative.
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn MessageHandler>, ListenerError> {
        self.handlers.get(key).cloned().ok_or_else(|| {
            let mut available: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
            available.sort_unstable();
            ListenerError::UnregisteredHandler {
                name: key.to_string(),
                available: available.join(", "),
            }
        })
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
