//! fcfs-dispatcher entry point.
//!
//! Thin on purpose: load config, build the pool and the signing client, run
//! the loop until SIGINT.

use anyhow::Context;
use fcfs_config::FcfsConfig;
use fcfs_dispatcher::Dispatcher;
use fcfs_webhook::WebhookClient;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = fcfs_config::load_from_env()?;
    info!(config_hash = %loaded.config_hash, "dispatcher config loaded");

    let pool = fcfs_db::connect_from_env().await?;

    let secret = FcfsConfig::webhook_secret_from_env()?;
    let settings = loaded.config.dispatcher;
    let client = WebhookClient::new(
        &settings.target_url,
        &secret,
        Duration::from_secs(settings.http_timeout_secs),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    Dispatcher::new(pool, client, settings)
        .run(shutdown_rx)
        .await
        .context("dispatcher loop crashed")
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
