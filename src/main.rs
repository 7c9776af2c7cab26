use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use tombola::config::Config;
use tombola::server::Server;
use tombola::store::FileBetStore;

#[derive(Debug, Parser)]
#[command(name = "tombola", about = "Multi-agency lottery draw server")]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port (overrides the config file).
    #[arg(long)]
    port: Option<u16>,

    /// Number of agencies expected before the draw fires.
    #[arg(long)]
    agencies: Option<usize>,

    /// Bet store file.
    #[arg(long)]
    store: Option<PathBuf>,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Wait for SIGINT or SIGTERM.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed, which only happens when
/// the tokio runtime is misconfigured; that should fail fast at startup.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(agencies) = cli.agencies {
        config.agencies = agencies;
    }
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    config.validate()?;

    let store = Arc::new(FileBetStore::new(&config.store_path));
    let server = Server::bind(&config, store).await?;
    info!("listening on {}", server.local_addr()?);

    let cancel = server.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });

    server.run().await
}
