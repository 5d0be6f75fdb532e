//! Tracing and OpenTelemetry setup for crane binaries
//!
//! Logs are emitted as JSON. When an OTLP endpoint is configured, spans and
//! metrics are also exported over gRPC, tagged with the pod identity taken
//! from the downward API.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,crane=debug,kube=info,tower=warn,hyper=warn";

/// Downward API variables mapped onto resource attributes
const K8S_RESOURCE_ENV: &[(&str, &str)] = &[
    ("POD_NAME", "k8s.pod.name"),
    ("POD_NAMESPACE", "k8s.namespace.name"),
    ("NODE_NAME", "k8s.node.name"),
];

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize OpenTelemetry tracer
    #[error("failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize OTLP metrics exporter
    #[error("failed to initialize metrics exporter: {0}")]
    MetricsInit(String),

    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Service name for traces and metrics (e.g., "crane-operator")
    pub service_name: String,

    /// OTLP gRPC endpoint; logs only when unset
    pub otlp_endpoint: Option<String>,

    /// Pod identity from the downward API, as (attribute, value) pairs
    pub k8s_attributes: Vec<(String, String)>,
}

impl TelemetryConfig {
    /// Build a config, resolving pod identity through `lookup`
    pub fn new(
        service_name: impl Into<String>,
        otlp_endpoint: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let k8s_attributes = K8S_RESOURCE_ENV
            .iter()
            .filter_map(|(var, attr)| lookup(var).map(|v| (attr.to_string(), v)))
            .collect();
        Self {
            service_name: service_name.into(),
            otlp_endpoint,
            k8s_attributes,
        }
    }
}

/// Install the global tracing subscriber and, if configured, OTLP exporters
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = build_resource(&config);

    let otel_layer = if let Some(endpoint) = &config.otlp_endpoint {
        init_otlp_metrics(endpoint, resource.clone())?;
        let provider = init_otlp_tracer(endpoint, resource)?;
        let tracer = provider.tracer(config.service_name.clone());
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::SubscriberInit(e.to_string())
        })?;

    Ok(())
}

fn build_resource(config: &TelemetryConfig) -> Resource {
    let mut attributes = vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            config.service_name.clone(),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
    ];
    attributes.extend(
        config
            .k8s_attributes
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
    );
    Resource::new(attributes)
}

fn init_otlp_tracer(endpoint: &str, resource: Resource) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build();

    global::set_tracer_provider(provider.clone());

    Ok(provider)
}

fn init_otlp_metrics(endpoint: &str, resource: Resource) -> Result<(), TelemetryError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let reader =
        opentelemetry_sdk::metrics::PeriodicReader::builder(exporter, runtime::Tokio).build();

    let meter_provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build();

    global::set_meter_provider(meter_provider);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Key;

    #[test]
    fn pod_identity_is_resolved_through_lookup() {
        let config = TelemetryConfig::new("crane-operator", None, |var| match var {
            "POD_NAME" => Some("crane-0".to_string()),
            "POD_NAMESPACE" => Some("crane-system".to_string()),
            _ => None,
        });
        assert_eq!(
            config.k8s_attributes,
            vec![
                ("k8s.pod.name".to_string(), "crane-0".to_string()),
                ("k8s.namespace.name".to_string(), "crane-system".to_string()),
            ]
        );
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn resource_carries_service_name_and_pod_attributes() {
        let config = TelemetryConfig::new("crane-operator", None, |var| {
            (var == "NODE_NAME").then(|| "node-a".to_string())
        });
        let resource = build_resource(&config);
        assert_eq!(
            resource
                .get(Key::new(opentelemetry_semantic_conventions::resource::SERVICE_NAME))
                .map(|v| v.to_string()),
            Some("crane-operator".to_string())
        );
        assert_eq!(
            resource.get(Key::new("k8s.node.name")).map(|v| v.to_string()),
            Some("node-a".to_string())
        );
    }

    #[test]
    fn default_filter_enables_crane_debug() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert!(DEFAULT_LOG_FILTER.contains("crane=debug"));
    }
}
