//! Gnubby Daemon - Main entry point
//!
//! Serves enroll and sign requests from pages and forwards them to the
//! device helper.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gnubby_daemon::{DaemonConfig, IpcServer, RequestContext, SocketHelperFactory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gnubby_daemon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting gnubby daemon v{}", env!("CARGO_PKG_VERSION"));

    // Load or create config
    let config_path = std::env::var("GNUBBY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            config_dir()
                .unwrap_or_else(|| PathBuf::from("/etc"))
                .join("gnubby")
                .join("daemon.json")
        });

    let config = if config_path.exists() {
        DaemonConfig::load(&config_path)?
    } else {
        let config = DaemonConfig::default();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save(&config_path)?;
        info!("Created default config at {:?}", config_path);
        config
    };

    config.ensure_directories()?;

    let helpers = Arc::new(SocketHelperFactory::new(config.helper_socket_path.clone()));
    let context = RequestContext::from_config(&config, helpers);
    let ipc_server = IpcServer::new(config.ipc_socket_path.clone(), context);

    info!(
        "Forwarding ceremonies to device helper at {:?}",
        config.helper_socket_path
    );

    ipc_server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await?;

    info!("Daemon shutting down");

    Ok(())
}

fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
}
