//! Inflatacare Monitor Binary
//!
//! Terminal view of the live mattress readings: subscribes to every
//! property and logs each value and connection status change.
//!
//! # Environment Variables
//!
//! - `RELAY_URL`: Push channel URL (default: `ws://localhost:3000/ws`)
//! - `RELAY_RECONNECT_DELAY_MS`: First retry delay (default: 1000)
//! - `RELAY_RECONNECT_DELAY_MAX_MS`: Retry delay ceiling (default: 5000)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use inflatacare_core::PropertyName;
use inflatacare_dashboard::{ClientConfig, PushChannelClient, SubscriptionRegistry};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ClientConfig::from_env().context("invalid monitor configuration")?;
    tracing::info!(relay_url = %config.relay_url, "Starting Inflatacare monitor");

    let registry = SubscriptionRegistry::new();
    let _views: Vec<_> = PropertyName::ALL
        .into_iter()
        .map(|property| {
            registry.subscribe(property, move |value| {
                if property.is_sensor() {
                    tracing::info!(%property, value, "Sensor reading");
                } else {
                    tracing::info!(%property, value, "Status");
                }
            })
        })
        .collect();

    let mut status = registry.status_receiver();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            tracing::info!(status = ?current, "Relay connection");
        }
    });

    let cancel = CancellationToken::new();
    let client = Arc::new(PushChannelClient::new(config, registry, cancel.clone()));
    let client_task = tokio::spawn(Arc::clone(&client).run());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    tracing::info!("Shutting down");
    cancel.cancel();

    client_task.await.context("client task panicked")??;
    Ok(())
}
