//! OpenTelemetry metrics export module
//!
//! Exports probe outcomes to an OpenTelemetry Collector. Disabled unless
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use anyhow::{Context, Result};
use log::info;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

/// Metric export interval in seconds
const METRIC_EXPORT_INTERVAL_SECS: u64 = 30;

static METRICS: OnceLock<ProbeMetrics> = OnceLock::new();

/// Kept for graceful shutdown
static METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();

/// Latest up/down state per target, read by the `target_online` gauge
static TARGET_STATE: OnceLock<RwLock<HashMap<String, u64>>> = OnceLock::new();

fn target_state_map() -> &'static RwLock<HashMap<String, u64>> {
    TARGET_STATE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Note: Do NOT add _total suffix to Counter names (Prometheus adds it automatically)
pub struct ProbeMetrics {
    pub probe_events: Counter<u64>,
    pub probe_latency_ms: Histogram<u64>,
}

impl ProbeMetrics {
    fn new(meter: &Meter) -> Self {
        Self {
            probe_events: meter
                .u64_counter("probe_events")
                .with_description("Number of status probes by outcome")
                .with_unit("events")
                .build(),
            probe_latency_ms: meter
                .u64_histogram("probe_latency_ms")
                .with_description("Time until the first response datagram")
                .with_unit("ms")
                .build(),
        }
    }
}

/// `OTEL_EXPORTER_OTLP_ENDPOINT`, with `http://` added when no scheme
/// is given. None (metrics disabled) when unset or empty.
fn get_otlp_endpoint() -> Option<String> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
    if endpoint.is_empty() {
        return None;
    }

    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        Some(format!("http://{}", endpoint))
    } else {
        Some(endpoint)
    }
}

/// Initialize OpenTelemetry metrics provider
///
/// Configures metrics export to OTLP Collector via gRPC.
/// Skips initialization if OTEL_EXPORTER_OTLP_ENDPOINT is not set.
pub fn init_metrics() -> Result<()> {
    let endpoint = match get_otlp_endpoint() {
        Some(ep) => ep,
        None => {
            info!("OTEL_EXPORTER_OTLP_ENDPOINT not set. Metrics export disabled.");
            return Ok(());
        }
    };

    info!("Initializing OpenTelemetry metrics exporter");
    info!("OTLP endpoint: {}", endpoint);

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .with_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create OTLP metric exporter")?;

    let reader = PeriodicReader::builder(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_interval(Duration::from_secs(METRIC_EXPORT_INTERVAL_SECS))
        .build();

    let resource = Resource::default().merge(&Resource::new(vec![
        KeyValue::new("service.name", "hytaleping"),
        KeyValue::new("telemetry.sdk.language", "rust"),
    ]));

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build();

    global::set_meter_provider(provider.clone());
    let _ = METER_PROVIDER.set(provider);

    let meter = global::meter("hytaleping");

    let _target_online_gauge = meter
        .u64_observable_gauge("target_online")
        .with_description("1 if the latest probe of the target succeeded, else 0")
        .with_callback(|observer| {
            if let Ok(targets) = target_state_map().read() {
                for (target, up) in targets.iter() {
                    observer.observe(*up, &[KeyValue::new("target", target.clone())]);
                }
            }
        })
        .build();

    let _ = METRICS.set(ProbeMetrics::new(&meter));

    info!("OpenTelemetry metrics initialized successfully");
    Ok(())
}

pub fn metrics() -> Option<&'static ProbeMetrics> {
    METRICS.get()
}

/// Record one settled probe. `latency_ms` is only present for online
/// targets.
pub fn record_probe(target: &str, outcome: &str, latency_ms: Option<u64>) {
    if let Ok(mut targets) = target_state_map().write() {
        targets.insert(target.to_string(), u64::from(latency_ms.is_some()));
    }

    if let Some(m) = metrics() {
        let attrs = [
            KeyValue::new("target", target.to_string()),
            KeyValue::new("outcome", outcome.to_string()),
        ];
        m.probe_events.add(1, &attrs);

        if let Some(lat) = latency_ms {
            m.probe_latency_ms.record(lat, &attrs[..1]);
        }
    }
}

/// Shutdown OpenTelemetry (graceful shutdown)
/// Flushes pending metrics and shuts down the MeterProvider
pub fn shutdown_metrics() {
    if let Some(provider) = METER_PROVIDER.get() {
        info!("Shutting down OpenTelemetry metrics...");
        if let Err(e) = provider.shutdown() {
            log::warn!("Failed to shutdown MeterProvider: {}", e);
        } else {
            info!("OpenTelemetry metrics shutdown complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_otlp_endpoint_not_set() {
        unsafe {
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
        assert!(get_otlp_endpoint().is_none());
    }

    #[test]
    #[serial]
    fn test_get_otlp_endpoint_empty() {
        unsafe {
            std::env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "");
        }
        assert!(get_otlp_endpoint().is_none());
        unsafe {
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
    }

    #[test]
    #[serial]
    fn test_get_otlp_endpoint_adds_http_prefix() {
        unsafe {
            std::env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "collector:4317");
        }
        assert_eq!(
            get_otlp_endpoint(),
            Some("http://collector:4317".to_string())
        );
        unsafe {
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
    }

    #[test]
    fn test_record_probe_tracks_target_state() {
        record_probe("state.example:5520", "ok", Some(12));
        assert_eq!(
            target_state_map().read().unwrap().get("state.example:5520"),
            Some(&1)
        );

        record_probe("state.example:5520", "timeout", None);
        assert_eq!(
            target_state_map().read().unwrap().get("state.example:5520"),
            Some(&0)
        );
    }
}
