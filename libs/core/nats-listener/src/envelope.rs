//! Decoded message envelope handed to handlers.

use serde_json::Value;
use std::fmt;

/// An immutable subject and decoded JSON payload pair.
///
/// One envelope is constructed per delivered message and borrowed by the
/// configured handler for the duration of a single dispatch. Envelopes carry
/// no identity beyond their content and are never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    subject: String,
    data: Value,
}

impl MessageEnvelope {
    /// Decode a raw payload into an envelope.
    ///
    /// The payload must be UTF-8 encoded JSON; any JSON value is accepted,
    /// not only objects. The decode error is returned unchanged so callers
    /// can log the offending message.
    pub fn decode(subject: impl Into<String>, payload: &[u8]) -> Result<Self, serde_json::Error> {
        let data = serde_json::from_slice(payload)?;
        Ok(Self {
            subject: subject.into(),
            data,
        })
    }

    /// Subject the message was delivered on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Decoded JSON payload.
    pub fn data(&self) -> &Value {
        &self.data
    }
}

impl fmt::Display for MessageEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.data)
    }
}
