//! Telemetry initialization for Sluice binaries.
//!
//! Produces a `tracing` layer that exports spans over OTLP/gRPC when the
//! `telemetry` feature is enabled, and an identity layer otherwise. Callers
//! stack it onto their own registry next to the `fmt` layer.

use sluice_error::{ErrorCode, Result, SluiceError};
use tracing_subscriber::layer::{Identity, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::config::TelemetryConfig;

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Builds the exporting layer for `service_name`, sending spans to `endpoint`.
pub fn init_telemetry<S>(service_name: &str, endpoint: &str) -> Result<BoxedLayer<S>>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    if endpoint.trim().is_empty() {
        return Err(SluiceError::new(
            ErrorCode::InvalidConfig,
            "Telemetry endpoint must not be empty",
        )
        .with_hint("Set telemetry.endpoint or SLUICE__TELEMETRY__ENDPOINT"));
    }

    #[cfg(feature = "telemetry")]
    {
        otlp::layer(service_name, endpoint)
    }
    #[cfg(not(feature = "telemetry"))]
    {
        tracing::debug!(
            service = service_name,
            "Built without the telemetry feature, spans are not exported"
        );
        Ok(Box::new(Identity::new()))
    }
}

/// Builds the telemetry layer described by `config`, or an identity layer
/// when telemetry is disabled.
pub fn layer_from_config<S>(config: &TelemetryConfig) -> Result<BoxedLayer<S>>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    if config.enabled {
        init_telemetry(&config.service_name, &config.endpoint)
    } else {
        Ok(Box::new(Identity::new()))
    }
}

/// Flushes pending spans. Safe to call when nothing was installed.
pub fn shutdown_telemetry() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(feature = "telemetry")]
mod otlp {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::TracerProvider;
    use opentelemetry_sdk::Resource;
    use sluice_error::{ErrorCode, Result, SluiceError};
    use tracing_opentelemetry::OpenTelemetryLayer;
    use tracing_subscriber::registry::LookupSpan;

    use super::BoxedLayer;

    pub(super) fn layer<S>(service_name: &str, endpoint: &str) -> Result<BoxedLayer<S>>
    where
        S: tracing::Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
    {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| {
                SluiceError::new(
                    ErrorCode::InvalidConfig,
                    format!("Failed to build OTLP exporter for {}: {}", endpoint, e),
                )
            })?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                service_name.to_string(),
            )]))
            .build();
        let tracer = provider.tracer(service_name.to_string());
        opentelemetry::global::set_tracer_provider(provider);

        Ok(Box::new(OpenTelemetryLayer::new(tracer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::Registry;

    #[test]
    fn test_disabled_config_yields_layer() {
        let config = TelemetryConfig::default();
        assert!(layer_from_config::<Registry>(&config).is_ok());
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let err = init_telemetry::<Registry>("sluice", " ").err().unwrap();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
        assert!(err.hint.is_some());
    }
}
