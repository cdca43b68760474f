//! Durable subject listener CLI
//!
//! Consumes a NATS JetStream subject through the durable listener and
//! dispatches each message to a registered handler.

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use nats_listener::{
    listen_for_signals, parse_start_date, ConnectionManager, HandlerRegistry, ListenerConfig,
    NatsListener, ShutdownToken,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "listener-cli")]
#[command(version)]
#[command(about = "Consume a NATS JetStream subject with a durable listener")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume messages from a subject until interrupted
    Listen {
        /// Configuration file path (JSON). When omitted, configuration is
        /// read from environment variables.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// NATS subject to consume from
        #[arg(short, long)]
        subject: String,

        /// Start date in YYYY-MM-DD format for replaying stored messages
        #[arg(long)]
        start_date: Option<String>,

        /// Set logging level to DEBUG
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Listen {
            config,
            subject,
            start_date,
            debug,
        } => {
            init_tracing(debug);
            listen(config, &subject, start_date.as_deref()).await
        }
    }
}

async fn listen(
    config_path: Option<PathBuf>,
    subject: &str,
    start_date: Option<&str>,
) -> Result<()> {
    let config = match &config_path {
        Some(path) => ListenerConfig::from_json_file(path)
            .wrap_err_with(|| format!("Failed to load config from {}", path.display()))?,
        None => ListenerConfig::from_env().wrap_err("Failed to load config from environment")?,
    };

    let start_time = start_date.map(parse_start_date).transpose()?;

    info!(
        subject = %subject,
        servers = %config.servers.join(","),
        handler = %config.callback,
        "Starting NATS listener"
    );

    let registry = HandlerRegistry::new();
    let shutdown = ShutdownToken::new();
    listen_for_signals(shutdown.clone());

    let connection = ConnectionManager::new(config, shutdown.clone());
    let listener =
        NatsListener::new(connection, &registry, shutdown).wrap_err("Failed to create listener")?;

    listener.run(subject, start_time).await?;

    info!("NATS listener stopped");
    Ok(())
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let is_prod = std::env::var("ENVIRONMENT")
        .map(|e| e == "production")
        .unwrap_or(false);

    if is_prod {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init();
    }
}
