//! Consume loop driving connect, dispatch, and drain.

use crate::connection::{ActiveSubscription, ConnectionManager};
use crate::envelope::MessageEnvelope;
use crate::error::ListenerError;
use crate::registry::{HandlerRegistry, MessageHandler};
use crate::shutdown::ShutdownToken;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Durable subject listener.
///
/// Drives the connect, consume, drain cycle: while the shutdown token is
/// clear it holds one active subscription and dispatches its messages; when
/// the feed ends it reconnects (the durable cursor preserves position); when
/// the token fires it drains and stops.
pub struct NatsListener {
    connection: ConnectionManager,
    handler: Arc<dyn MessageHandler>,
    shutdown: ShutdownToken,
}

impl NatsListener {
    /// Create a listener, resolving the configured handler immediately.
    ///
    /// Fails before any connection attempt when the configured handler key
    /// is not registered.
    pub fn new(
        connection: ConnectionManager,
        registry: &HandlerRegistry,
        shutdown: ShutdownToken,
    ) -> Result<Self, ListenerError> {
        let handler = registry.resolve(&connection.config().callback)?;
        Ok(Self {
            connection,
            handler,
            shutdown,
        })
    }

    /// Run the listener until the shutdown token is triggered.
    ///
    /// Each message is decoded, handed to the handler, and acknowledged only
    /// after the handler returns successfully. Decode and handler failures
    /// are logged and leave the message unacknowledged; the loop continues
    /// with the next message. Connection failures are logged and propagated.
    pub async fn run(
        &self,
        subject: &str,
        start_time: Option<DateTime<Utc>>,
    ) -> Result<(), ListenerError> {
        info!(
            subject = %subject,
            handler = %self.handler.name(),
            "Starting listener"
        );

        while !self.shutdown.is_triggered() {
            let session = match self.connection.connect(subject, start_time).await {
                Ok(session) => session,
                Err(e) => {
                    error!(error = %e, "Failed to connect to NATS");
                    return Err(e);
                }
            };

            info!(stream = %session.stream_name(), "Starting consumer");
            let result = self.consume(&session).await;
            self.connection.disconnect(session).await;
            result?;
        }

        info!("Listener stopped");
        Ok(())
    }

    /// Drain the session's message feed until it ends or the token fires.
    ///
    /// A feed that ends while the token is clear returns `Ok` so the caller
    /// reconnects; a failure to open the feed is a consumer error.
    async fn consume(&self, session: &ActiveSubscription) -> Result<(), ListenerError> {
        let mut messages = session
            .consumer()
            .messages()
            .await
            .map_err(|e| ListenerError::consumer_error(e.to_string()))?;

        loop {
            tokio::select! {
                _ = self.shutdown.triggered() => {
                    info!("Shutdown event received, stopping consumer");
                    return Ok(());
                }
                message = messages.next() => {
                    match message {
                        Some(Ok(message)) => {
                            let processed = process_message(
                                self.handler.as_ref(),
                                message.subject.as_str(),
                                &message.payload,
                            )
                            .await;

                            if processed {
                                if let Err(e) = message.ack().await {
                                    warn!(error = %e, "Failed to ack message");
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Message feed interrupted");
                            return Ok(());
                        }
                        None => {
                            warn!("Message feed ended");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Decode and dispatch a single message.
///
/// Returns true only when both the decode and the handler succeeded; the
/// caller acknowledges in that case alone.
pub(crate) async fn process_message(
    handler: &dyn MessageHandler,
    subject: &str,
    payload: &[u8],
) -> bool {
    let envelope = match MessageEnvelope::decode(subject, payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!(subject = %subject, error = %e, "Invalid JSON received");
            return false;
        }
    };

    if let Err(e) = handler.handle(&envelope).await {
        error!(subject = %subject, error = %e, "Error processing message");
        return false;
    }

    true
}
