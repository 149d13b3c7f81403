//! Vault unsealer agent.
//!
//! Runs as a single long-lived process next to a vault cluster and unseals
//! any instance that restarts sealed.
//!
//! ## Lifecycle
//!
//! - **Bootstrap**: configuration, unseal key and service-account credentials
//!   are loaded once; any failure exits before the loop starts
//! - **Reconciler**: discovery, seal-status probes and unseal submissions on a
//!   fixed interval
//! - **Shutdown**: SIGINT/SIGTERM stop the loop between cycles

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vault_unsealer::{
    Config, EndpointsDirectory, HttpVaultClient, Reconciler, ReconcilerConfig, ServiceAccount,
    UnsealKey,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration is needed for the default log level, so read it first and
    // report failures once tracing is up.
    let config = Config::from_env();

    let default_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting vault unsealer");

    let result = match config.context("Invalid configuration") {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!("Vault unsealer shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Vault unsealer failed");
            for cause in e.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!(
        api_server = %config.api_server,
        service = %config.service_name,
        vault_port = config.vault_port,
        refresh_interval_secs = config.refresh_interval.as_secs(),
        request_timeout_secs = config.request_timeout.as_secs(),
        "Configuration loaded"
    );

    let key = UnsealKey::load(&config.key_path).context("Failed to load unseal key")?;
    let account = ServiceAccount::load(&config.service_account_dir)
        .context("Failed to load service account credentials")?;
    info!(namespace = %account.namespace, "Credentials loaded");

    let directory = EndpointsDirectory::new(&config.api_server, &account, config.request_timeout)
        .context("Failed to build cluster API client")?;
    let vault = HttpVaultClient::new(config.vault_port, config.request_timeout)
        .context("Failed to build vault client")?;

    let reconciler = Reconciler::new(
        ReconcilerConfig::from(&config),
        Arc::new(directory),
        Arc::new(vault),
        key,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    reconciler.run(shutdown_rx).await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
