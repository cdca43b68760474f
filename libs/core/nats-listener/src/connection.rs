//! Connection establishment and teardown.

use crate::config::ListenerConfig;
use crate::error::ListenerError;
use crate::events::{forward_event, ConnectionEventListener};
use crate::shutdown::ShutdownToken;
use async_nats::jetstream::consumer::pull::Config as ConsumerConfig;
use async_nats::jetstream::consumer::{AckPolicy, Consumer, DeliverPolicy};
use async_nats::jetstream::stream::Stream;
use async_nats::jetstream::Context;
use async_nats::{Client, ConnectOptions, Event};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Fixed wait between reconnect attempts.
const RECONNECT_WAIT: Duration = Duration::from_secs(30);

/// A live connection paired with its consumer handle.
///
/// Produced by [`ConnectionManager::connect`], consumed by
/// [`ConnectionManager::disconnect`]. Exactly one subscription is active at
/// a time; ownership enforces the single-session invariant.
pub struct ActiveSubscription {
    client: Client,
    consumer: Consumer<ConsumerConfig>,
    stream_name: String,
    events_armed: Arc<AtomicBool>,
}

impl ActiveSubscription {
    /// Name of the stream the subscription is bound to.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// The consumer handle delivering the message feed.
    pub fn consumer(&self) -> &Consumer<ConsumerConfig> {
        &self.consumer
    }
}

/// Owns connection options and produces live subscriptions.
///
/// Cloneable so the transport event callback can route lifecycle events back
/// through [`ConnectionEventListener`]: errors and permanent closure trigger
/// the shutdown token, disconnects are left to the client's own reconnect
/// handling.
#[derive(Clone)]
pub struct ConnectionManager {
    config: ListenerConfig,
    shutdown: ShutdownToken,
}

impl ConnectionManager {
    /// Create a manager over immutable settings and a shared shutdown token.
    pub fn new(config: ListenerConfig, shutdown: ShutdownToken) -> Self {
        Self { config, shutdown }
    }

    /// Settings this manager connects with.
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Connect to the broker and open the subscription for a subject.
    ///
    /// The delivery policy is `new` without a start time and `by_start_time`
    /// (inclusive, UTC) with one. The stream covering the subject is looked
    /// up, never created; a subject with no covering stream is an error.
    pub async fn connect(
        &self,
        subject: &str,
        start_time: Option<DateTime<Utc>>,
    ) -> Result<ActiveSubscription, ListenerError> {
        let events_armed = Arc::new(AtomicBool::new(true));

        let client = self
            .connect_options(events_armed.clone())?
            .connect(self.config.servers.join(","))
            .await?;

        let jetstream = async_nats::jetstream::new(client.clone());
        let stream_name = self.lookup_stream_name(&jetstream, subject).await?;
        let stream = jetstream
            .get_stream(&stream_name)
            .await
            .map_err(|e| ListenerError::consumer_error(e.to_string()))?;

        let deliver_policy = match start_time {
            Some(ts) => DeliverPolicy::ByStartTime {
                start_time: to_offset_datetime(ts)?,
            },
            None => DeliverPolicy::New,
        };

        let consumer = self.ensure_consumer(&stream, deliver_policy).await?;

        info!(
            servers = %self.config.servers.join(","),
            stream = %stream_name,
            "Connected to NATS"
        );

        Ok(ActiveSubscription {
            client,
            consumer,
            stream_name,
            events_armed,
        })
    }

    /// Tear down a finished session.
    ///
    /// Dropping the consumer handle ends the local feed; draining flushes
    /// outstanding acknowledgments and closes the connection. Both steps are
    /// best-effort: failures are logged, never returned.
    pub async fn disconnect(&self, subscription: ActiveSubscription) {
        let ActiveSubscription {
            client,
            consumer,
            stream_name,
            events_armed,
        } = subscription;

        // A retiring session's terminal events must not trigger shutdown.
        events_armed.store(false, Ordering::SeqCst);

        drop(consumer);
        info!(stream = %stream_name, "Consumer stopped");

        match client.drain().await {
            Ok(()) => info!("Disconnected from NATS"),
            Err(e) => error!(error = %e, "Error during disconnect"),
        }
    }

    fn connect_options(
        &self,
        events_armed: Arc<AtomicBool>,
    ) -> Result<ConnectOptions, ListenerError> {
        let manager = self.clone();
        let initial_connect = AtomicBool::new(true);
        let mut options = ConnectOptions::new()
            .request_timeout(Some(self.config.request_timeout()?))
            .reconnect_delay_callback(|_attempts| RECONNECT_WAIT)
            .event_callback(move |event| {
                dispatch_event(&manager, &events_armed, &initial_connect, event);
                std::future::ready(())
            });

        if let (Some(user), Some(password)) = (&self.config.username, &self.config.password) {
            options = options.user_and_password(user.clone(), password.clone());
        }

        if let (Some(cert), Some(key)) = (&self.config.ssl_certfile, &self.config.ssl_keyfile) {
            options = options.require_tls(true);
            if let Some(ca) = &self.config.root_ca {
                options = options.add_root_certificates(PathBuf::from(ca));
            }
            options = options.add_client_certificate(PathBuf::from(cert), PathBuf::from(key));
        }

        if let Some(durable) = &self.config.durable {
            options = options.name(durable.clone());
        }

        Ok(options)
    }

    /// Find the stream covering a subject via the JetStream API.
    async fn lookup_stream_name(
        &self,
        jetstream: &Context,
        subject: &str,
    ) -> Result<String, ListenerError> {
        #[derive(Deserialize)]
        struct StreamNamesPage {
            #[serde(default)]
            streams: Option<Vec<String>>,
        }

        let request = serde_json::json!({ "subject": subject });
        let page: StreamNamesPage = jetstream
            .request("STREAM.NAMES".to_string(), &request)
            .await
            .map_err(ListenerError::from_lookup_error)?;

        page.streams
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| ListenerError::StreamNotFound(subject.to_string()))
    }

    /// Attach to the durable consumer if it exists, create it otherwise.
    async fn ensure_consumer(
        &self,
        stream: &Stream,
        deliver_policy: DeliverPolicy,
    ) -> Result<Consumer<ConsumerConfig>, ListenerError> {
        let filter_subject = self.config.filter_subject.clone().unwrap_or_default();

        if let Some(durable) = &self.config.durable {
            // Try to get existing consumer
            if let Ok(consumer) = stream.get_consumer::<ConsumerConfig>(durable).await {
                debug!(consumer = %durable, "Consumer already exists");
                return Ok(consumer);
            }

            info!(consumer = %durable, "Creating consumer");
            stream
                .create_consumer(ConsumerConfig {
                    durable_name: Some(durable.clone()),
                    name: Some(durable.clone()),
                    ack_policy: AckPolicy::Explicit,
                    deliver_policy,
                    filter_subject,
                    ..Default::default()
                })
                .await
                .map_err(|e| ListenerError::consumer_error(e.to_string()))
        } else {
            stream
                .create_consumer(ConsumerConfig {
                    ack_policy: AckPolicy::Explicit,
                    deliver_policy,
                    filter_subject,
                    ..Default::default()
                })
                .await
                .map_err(|e| ListenerError::consumer_error(e.to_string()))
        }
    }
}

#[async_trait]
impl ConnectionEventListener for ConnectionManager {
    async fn on_error(&self, error: String) {
        error!(error = %error, "NATS internal error");
        self.shutdown.trigger();
    }

    async fn on_disconnected(&self) {
        warn!("Disconnected from NATS");
    }

    async fn on_reconnected(&self) {
        info!("Reconnected to NATS");
    }

    async fn on_closed(&self) {
        error!("Connection closed permanently");
        self.shutdown.trigger();
    }
}

/// Route a transport event from the client callback.
///
/// Forwarding runs on a spawned task; the callback's own future stays
/// trivial and `Sync`. Retired sessions only log. The client also raises
/// `Connected` for the first successful connect, so the first one is
/// recorded as the initial connection and everything after it as a
/// reconnect.
fn dispatch_event<L>(listener: &L, armed: &AtomicBool, initial_connect: &AtomicBool, event: Event)
where
    L: ConnectionEventListener + Clone + Send + Sync + 'static,
{
    if !armed.load(Ordering::SeqCst) {
        debug!(event = %event, "Event from retired connection");
        return;
    }

    if matches!(event, Event::Connected) && initial_connect.swap(false, Ordering::SeqCst) {
        debug!("Initial connection established");
        return;
    }

    let listener = listener.clone();
    tokio::spawn(async move {
        forward_event(&listener, event).await;
    });
}

fn to_offset_datetime(ts: DateTime<Utc>) -> Result<time::OffsetDateTime, ListenerError> {
    time::OffsetDateTime::from_unix_timestamp(ts.timestamp())
        .map_err(|e| ListenerError::config_error(format!("start time out of range: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_start_date;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default)]
    struct RecordingListener {
        reconnects: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ConnectionEventListener for RecordingListener {
        async fn on_error(&self, _error: String) {}

        async fn on_disconnected(&self) {}

        async fn on_reconnected(&self) {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_closed(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_armed_session_events_reach_the_listener() {
        let listener = RecordingListener::default();
        let armed = AtomicBool::new(true);
        let initial_connect = AtomicBool::new(false);

        dispatch_event(&listener, &armed, &initial_connect, Event::Closed);
        tokio::task::yield_now().await;

        assert_eq!(listener.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retired_session_events_are_ignored() {
        let listener = RecordingListener::default();
        let armed = AtomicBool::new(false);
        let initial_connect = AtomicBool::new(false);

        dispatch_event(&listener, &armed, &initial_connect, Event::Closed);
        tokio::task::yield_now().await;

        assert_eq!(listener.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initial_connected_event_is_not_a_reconnect() {
        let listener = RecordingListener::default();
        let armed = AtomicBool::new(true);
        let initial_connect = AtomicBool::new(true);

        dispatch_event(&listener, &armed, &initial_connect, Event::Connected);
        tokio::task::yield_now().await;
        assert_eq!(listener.reconnects.load(Ordering::SeqCst), 0);

        dispatch_event(&listener, &armed, &initial_connect, Event::Connected);
        tokio::task::yield_now().await;
        assert_eq!(listener.reconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_events_trigger_shutdown() {
        let shutdown = ShutdownToken::new();
        let manager = ConnectionManager::new(ListenerConfig::default(), shutdown.clone());

        manager.on_disconnected().await;
        manager.on_reconnected().await;
        assert!(!shutdown.is_triggered());

        manager.on_error("nats: slow consumer".to_string()).await;
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_closed_event_triggers_shutdown() {
        let shutdown = ShutdownToken::new();
        let manager = ConnectionManager::new(ListenerConfig::default(), shutdown.clone());

        manager.on_closed().await;
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_start_time_conversion() {
        let ts = parse_start_date("2024-03-01").unwrap();

        let converted = to_offset_datetime(ts).unwrap();
        assert_eq!(converted.unix_timestamp(), ts.timestamp());
        assert_eq!(converted.year(), 2024);
    }
}
