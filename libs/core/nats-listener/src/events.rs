//! Connection lifecycle event dispatch.

use async_nats::Event;
use async_trait::async_trait;
use tracing::debug;

/// Observer for transport lifecycle events.
///
/// [`ConnectionManager`](crate::connection::ConnectionManager) implements
/// this to translate client events into log records and shutdown decisions:
/// errors and permanent closure are fatal for the process, disconnects are
/// not because the client reconnects on its own.
#[async_trait]
pub trait ConnectionEventListener: Send + Sync {
    /// A transport-level error was reported by the client.
    async fn on_error(&self, error: String);

    /// The connection was lost; the client keeps reconnecting on its own.
    async fn on_disconnected(&self);

    /// The connection was re-established.
    async fn on_reconnected(&self);

    /// The connection closed permanently.
    async fn on_closed(&self);
}

/// Forward a client event to the listener.
///
/// Only the lifecycle events relevant to the consume loop map to listener
/// calls; everything else is surfaced at debug level.
pub async fn forward_event<L: ConnectionEventListener>(listener: &L, event: Event) {
    match event {
        Event::Connected => listener.on_reconnected().await,
        Event::Disconnected => listener.on_disconnected().await,
        Event::Closed => listener.on_closed().await,
        Event::ClientError(error) => listener.on_error(error.to_string()).await,
        Event::ServerError(error) => listener.on_error(error.to_string()).await,
        other => debug!(event = %other, "NATS client event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingListener {
        errors: AtomicUsize,
        disconnects: AtomicUsize,
        reconnects: AtomicUsize,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionEventListener for RecordingListener {
        async fn on_error(&self, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_disconnected(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_reconnected(&self) {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_closed(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_forward_lifecycle_events() {
        let listener = RecordingListener::default();

        forward_event(&listener, Event::Connected).await;
        forward_event(&listener, Event::Disconnected).await;
        forward_event(&listener, Event::Closed).await;

        assert_eq!(listener.reconnects.load(Ordering::SeqCst), 1);
        assert_eq!(listener.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(listener.closes.load(Ordering::SeqCst), 1);
        assert_eq!(listener.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unmapped_events_do_not_reach_listener() {
        let listener = RecordingListener::default();

        forward_event(&listener, Event::LameDuckMode).await;

        assert_eq!(listener.errors.load(Ordering::SeqCst), 0);
        assert_eq!(listener.disconnects.load(Ordering::SeqCst), 0);
        assert_eq!(listener.reconnects.load(Ordering::SeqCst), 0);
        assert_eq!(listener.closes.load(Ordering::SeqCst), 0);
    }
}
