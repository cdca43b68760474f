//! Containerized NATS broker for integration tests.

use async_nats::jetstream;
use async_nats::Client;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::nats::Nats;

/// JetStream-enabled NATS broker running in a throwaway container.
///
/// Listener tests build their configuration from [`TestNats::url`] and seed
/// streams through the helpers below. The container is stopped and removed
/// when the value is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestNats;
///
/// # async fn example() {
/// let nats = TestNats::new().await;
///
/// // Seed a stream and publish into it
/// nats.create_stream("ORDERS", &["orders.>"]).await;
/// nats.publish_json("orders.created", &serde_json::json!({"id": 1})).await;
/// # }
/// ```
pub struct TestNats {
    #[allow(dead_code)]
    container: ContainerAsync<Nats>,
    client: Client,
    jetstream: jetstream::Context,
    url: String,
}

impl TestNats {
    /// Start a broker container with JetStream enabled (`-js`) and connect
    /// a client to it.
    pub async fn new() -> Self {
        let image = Nats::default().with_tag("latest").with_cmd(["-js"]);

        let container = image
            .start()
            .await
            .expect("Failed to start the NATS container");

        let port = container
            .get_host_port_ipv4(4222)
            .await
            .expect("Failed to resolve the mapped NATS port");

        let url = format!("nats://127.0.0.1:{port}");
        let client = async_nats::connect(&url)
            .await
            .expect("Failed to connect to the test broker");
        let jetstream = jetstream::new(client.clone());

        tracing::info!(port, "Test NATS ready with JetStream");

        Self {
            container,
            client,
            jetstream,
            url,
        }
    }

    /// Cloned client connected to the containerized broker.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// JetStream context over the broker.
    pub fn jetstream(&self) -> jetstream::Context {
        self.jetstream.clone()
    }

    /// Broker URL for building listener configurations.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Create a stream covering the given subjects.
    pub async fn create_stream(&self, name: &str, subjects: &[&str]) -> jetstream::stream::Stream {
        self.jetstream
            .create_stream(jetstream::stream::Config {
                name: name.to_string(),
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            })
            .await
            .expect("Failed to create stream")
    }

    /// Publish a raw payload and wait for the stream acknowledgment.
    pub async fn publish_raw(&self, subject: &str, payload: &[u8]) {
        self.jetstream
            .publish(subject.to_string(), payload.to_vec().into())
            .await
            .expect("Failed to publish")
            .await
            .expect("Failed to get publish ack");
    }

    /// Publish a JSON payload and wait for the stream acknowledgment.
    pub async fn publish_json(&self, subject: &str, payload: &serde_json::Value) {
        self.publish_raw(subject, payload.to_string().as_bytes())
            .await;
    }
}

impl Drop for TestNats {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test NATS container");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    // Requires a running Docker daemon
    #[tokio::test]
    #[ignore]
    async fn test_url_connects_a_second_client() {
        let nats = TestNats::new().await;

        let second = async_nats::connect(nats.url()).await.unwrap();
        let mut subscriber = second.subscribe("checks.ping").await.unwrap();

        nats.client().publish("checks.ping", "pong".into()).await.unwrap();
        nats.client().flush().await.unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), subscriber.next())
            .await
            .expect("timed out waiting for the test message")
            .expect("subscription ended without a message");

        assert_eq!(message.payload.as_ref(), b"pong");
    }

    // Requires a running Docker daemon
    #[tokio::test]
    #[ignore]
    async fn test_stream_seeding() {
        let nats = TestNats::new().await;
        nats.create_stream("ORDERS", &["orders.>"]).await;

        nats.publish_json("orders.created", &json!({"id": 1})).await;
        nats.publish_raw("orders.created", b"not json").await;

        let mut stream = nats.jetstream().get_stream("ORDERS").await.unwrap();
        let info = stream.info().await.unwrap();
        assert_eq!(info.state.messages, 2);
    }
}
