//! Inflatacare Relay Binary
//!
//! Starts the cloud link and the HTTP server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin inflatacare-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `CLIENT_ID`: Arduino IoT Cloud API client id
//! - `CLIENT_SECRET`: Arduino IoT Cloud API client secret
//! - `THING_ID`: Thing whose properties are relayed
//!
//! ## Optional
//! - `PORT`: HTTP/WebSocket port (default: 3000)
//! - `ARDUINO_API_URL`: API base URL (default: <https://api2.arduino.cc>)
//! - `CLOUD_POLL_INTERVAL_MS`: Property poll interval (default: 1000)
//! - `CLOUD_REQUEST_TIMEOUT_SECS`: HTTP timeout (default: 10)
//! - `CLOUD_RECONNECT_DELAY_SECS`: Fixed reconnect delay (default: 5)
//! - `FANOUT_SESSION_BUFFER`: Per-client queue capacity (default: 256)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: inflatacare-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use inflatacare_relay::infrastructure::telemetry;
use inflatacare_relay::{
    AppState, ArduinoClientConfig, ArduinoCloudConnector, CloudLink, CloudLinkConfig, Fanout,
    LinkState, PropertyStore, PropertySync, RelayConfig, RelayServer, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Inflatacare relay");

    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env().context("invalid relay configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let store = Arc::new(PropertyStore::new());
    let fanout = Arc::new(Fanout::new(Arc::clone(&store), config.server.session_buffer));
    let link_state = Arc::new(LinkState::new());

    let connector = ArduinoCloudConnector::new(ArduinoClientConfig::from_settings(
        &config.cloud,
        config.credentials.clone(),
    ))
    .context("failed to create Arduino IoT Cloud connector")?;

    let link = Arc::new(CloudLink::new(
        CloudLinkConfig::new(config.cloud.thing_id.clone(), config.cloud.reconnect_delay),
        Arc::new(connector),
        PropertySync::new(Arc::clone(&store), Arc::<Fanout>::clone(&fanout)),
        Arc::clone(&link_state),
        shutdown_token.clone(),
    ));

    let server = RelayServer::new(
        config.server.port,
        Arc::new(AppState::new(
            Arc::clone(&store),
            Arc::clone(&fanout),
            Arc::clone(&link_state),
            env!("CARGO_PKG_VERSION"),
        )),
        shutdown_token.clone(),
    );

    let link_task = tokio::spawn(async move {
        if let Err(e) = link.run().await {
            tracing::error!(error = %e, "Cloud link stopped");
        }
    });

    let server_shutdown = shutdown_token.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "Relay server error");
            server_shutdown.cancel();
        }
    });

    tracing::info!("Relay ready");

    tokio::select! {
        () = await_shutdown() => {}
        () = shutdown_token.cancelled() => {
            tracing::warn!("Server exited, shutting down");
        }
    }
    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = link_task.await;
        let _ = server_task.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Shutdown timed out");
    }

    tracing::info!("Relay stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        thing_id = %config.cloud.thing_id,
        port = config.server.port,
        session_buffer = config.server.session_buffer,
        reconnect_delay_secs = config.cloud.reconnect_delay.as_secs(),
        "Configuration loaded"
    );
    tracing::debug!(
        api_url = %config.cloud.api_url,
        poll_interval_ms = config.cloud.poll_interval.as_millis(),
        request_timeout_secs = config.cloud.request_timeout.as_secs(),
        "Arduino IoT Cloud endpoint"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
