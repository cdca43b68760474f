//! Shared test utilities for listener testing
//!
//! This crate provides reusable test infrastructure:
//! - `TestNats`: JetStream-enabled NATS container with automatic cleanup,
//!   plus stream seeding and publishing helpers
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::TestNats;
//!
//! # async fn example() {
//! let nats = TestNats::new().await;
//! nats.create_stream("ORDERS", &["orders.>"]).await;
//! nats.publish_json("orders.created", &serde_json::json!({"id": 1})).await;
//!
//! let client = nats.client();
//! let jetstream = nats.jetstream();
//! # }
//! ```

mod nats;

pub use nats::TestNats;
