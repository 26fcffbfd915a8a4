//! system-status CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use system_status::auth::AdminKey;
use system_status::config::StatusServerConfig;
use system_status::server::StatusServer;
use system_status::sessions::MemorySessionStore;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            log_file,
            token_ttl_secs,
        } => {
            init_tracing("info");
            serve(bind, log_file, token_ttl_secs, cli.admin_key).await
        }
        Commands::Keygen => {
            println!("{}", AdminKey::generate().as_str());
            Ok(())
        }
    }
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(
    bind: String,
    log_file: PathBuf,
    token_ttl_secs: u64,
    admin_key: Option<String>,
) -> Result<()> {
    let bind_addr = bind.parse().context("Invalid bind address")?;

    let mut config = StatusServerConfig::new(bind_addr, log_file)
        .token_ttl(Duration::from_secs(token_ttl_secs));
    if let Some(key) = admin_key {
        config = config.admin_key(AdminKey::new(key));
    }

    let sessions = Arc::new(MemorySessionStore::new());
    let server = StatusServer::new(config, sessions);

    info!(addr = %bind, "Starting status server");
    server.run(shutdown_signal()).await?;
    info!("Status server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}
