//! Tracing and OpenTelemetry Setup
//!
//! Console logging is always on (`RUST_LOG` filter, fmt layer). Span export
//! over OTLP is opt-in for this deployment.
//!
//! # Environment Variables
//!
//! - `OTEL_ENABLED`: Set to "true" to export spans (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name for traces (default: inflatacare-relay)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Service name for OpenTelemetry traces.
const DEFAULT_SERVICE_NAME: &str = "inflatacare-relay";

/// Default OTLP endpoint.
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Directives applied on top of `RUST_LOG`.
const DEFAULT_DIRECTIVES: [&str; 4] = [
    "inflatacare_relay=info",
    "tower_http=info",
    "hyper=warn",
    "reqwest=warn",
];

/// Guard that shuts down OpenTelemetry when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are being exported.
    #[must_use]
    pub const fn exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown OpenTelemetry tracer provider: {e}");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Whether OpenTelemetry export is enabled.
    pub enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name for traces.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("OTEL_ENABLED").is_some_and(|v| v.eq_ignore_ascii_case("true"));

        let otlp_endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string());

        let service_name =
            lookup("OTEL_SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

        Self {
            enabled,
            otlp_endpoint,
            service_name,
        }
    }
}

/// Initialize telemetry with configuration from the environment.
///
/// Keep the returned guard alive for the life of the process.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(TelemetryConfig::from_env())
}

/// Initialize telemetry with explicit configuration.
///
/// If the OTLP exporter cannot be built, logging continues without export.
#[must_use]
pub fn init_with_config(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = DEFAULT_DIRECTIVES
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let (exporter, export_error) = span_exporter(&config);

    let Some(exporter) = exporter else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();

        if let Some(error) = export_error {
            tracing::warn!(
                endpoint = %config.otlp_endpoint,
                error = %error,
                "OTLP exporter unavailable, continuing without span export"
            );
        }

        return TelemetryGuard {
            tracer_provider: None,
        };
    };

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build();

    let tracer = tracer_provider.tracer(config.service_name);
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    TelemetryGuard {
        tracer_provider: Some(tracer_provider),
    }
}

/// Build the OTLP span exporter when export is enabled.
///
/// Returns the build error alongside `None` when the exporter cannot be
/// created. The error is also written to stderr since no subscriber is
/// installed yet.
fn span_exporter(
    config: &TelemetryConfig,
) -> (Option<opentelemetry_otlp::SpanExporter>, Option<String>) {
    if !config.enabled {
        return (None, None);
    }

    match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
    {
        Ok(exporter) => (Some(exporter), None),
        Err(e) => {
            eprintln!("OTLP exporter unavailable, continuing without span export: {e}");
            (None, Some(e.to_string()))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
