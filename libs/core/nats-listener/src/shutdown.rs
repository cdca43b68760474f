//! Cooperative shutdown primitives.

use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Cancellation token shared by the consume loop, the connection manager,
/// and the signal task.
///
/// The token starts clear and latches once triggered; nothing ever clears
/// it. A fresh process is required to consume again after shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Create a new, untriggered token.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Latch the token. Repeated triggers are no-ops.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the token has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the token is triggered.
    ///
    /// Resolves immediately when the token is already set.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // wait_for inspects the current value before suspending
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a task that triggers the token when the process receives SIGINT
/// or SIGTERM. Repeated signals are absorbed by the token's latch.
pub fn listen_for_signals(token: ShutdownToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.trigger();
    });
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
