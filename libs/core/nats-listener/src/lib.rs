//! Durable NATS JetStream subject listener.
//!
//! Connects to a broker, attaches a durable pull consumer to the stream
//! covering a subject, and dispatches each JSON message to a registered
//! handler with process-then-ack semantics: a message is acknowledged only
//! after its handler returns successfully, so failed messages stay
//! redeliverable.
//!
//! # Example
//!
//! ```rust,no_run
//! use nats_listener::{
//!     ConnectionManager, HandlerRegistry, ListenerConfig, NatsListener, ShutdownToken,
//! };
//!
//! # async fn example() -> Result<(), nats_listener::ListenerError> {
//! let config = ListenerConfig::from_env()?;
//! let registry = HandlerRegistry::new();
//! let shutdown = ShutdownToken::new();
//! nats_listener::listen_for_signals(shutdown.clone());
//!
//! let connection = ConnectionManager::new(config, shutdown.clone());
//! let listener = NatsListener::new(connection, &registry, shutdown)?;
//! listener.run("orders.created", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod events;
pub mod listener;
pub mod registry;
pub mod shutdown;

pub use config::{parse_start_date, ListenerConfig, DEFAULT_CLIENT_TIMEOUT};
pub use connection::{ActiveSubscription, ConnectionManager};
pub use envelope::MessageEnvelope;
pub use error::ListenerError;
pub use events::{forward_event, ConnectionEventListener};
pub use listener::NatsListener;
pub use registry::{HandlerError, HandlerRegistry, LogHandler, MessageHandler, DEFAULT_HANDLER};
pub use shutdown::{listen_for_signals, ShutdownToken};
