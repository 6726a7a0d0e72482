//! Prometheus metrics for chat-relay.
//!
//! Relay counters live in a `prometheus` registry. HTTP request metrics come
//! from the `metrics` facade used by the service-core middleware and are
//! rendered by the installed Prometheus recorder. `/metrics` serves both.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Recorder behind the `metrics` facade.
pub static HTTP_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub static RELAY_GENERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static RELAY_GENERATIONS_IN_FLIGHT: OnceLock<IntGauge> = OnceLock::new();
pub static RELAY_FRAGMENTS_TOTAL: OnceLock<IntCounter> = OnceLock::new();
pub static RELAY_STOP_REQUESTS_TOTAL: OnceLock<IntCounter> = OnceLock::new();
pub static RELAY_GENERATION_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static UPSTREAM_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Must be called once at startup.
pub fn init_metrics() {
    let registry = Registry::new();

    // Generations by outcome: completed, cancelled, failed, disconnected
    let generations_total = IntCounterVec::new(
        Opts::new("relay_generations_total", "Total generations by outcome"),
        &["model", "outcome"],
    )
    .expect("Failed to create relay_generations_total metric");

    let in_flight = IntGauge::new(
        "relay_generations_in_flight",
        "Number of generations currently streaming",
    )
    .expect("Failed to create relay_generations_in_flight metric");

    let fragments_total = IntCounter::new(
        "relay_fragments_total",
        "Total text fragments forwarded to clients",
    )
    .expect("Failed to create relay_fragments_total metric");

    let stop_requests_total = IntCounter::new(
        "relay_stop_requests_total",
        "Total stop-generation requests",
    )
    .expect("Failed to create relay_stop_requests_total metric");

    let generation_duration = HistogramVec::new(
        HistogramOpts::new(
            "relay_generation_duration_seconds",
            "Wall time from opening the upstream stream to the end of the relay",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["outcome"],
    )
    .expect("Failed to create relay_generation_duration_seconds metric");

    let upstream_errors = IntCounterVec::new(
        Opts::new("upstream_errors_total", "Total upstream provider errors"),
        &["provider", "error_type"],
    )
    .expect("Failed to create upstream_errors_total metric");

    registry
        .register(Box::new(generations_total.clone()))
        .expect("Failed to register relay_generations_total");
    registry
        .register(Box::new(in_flight.clone()))
        .expect("Failed to register relay_generations_in_flight");
    registry
        .register(Box::new(fragments_total.clone()))
        .expect("Failed to register relay_fragments_total");
    registry
        .register(Box::new(stop_requests_total.clone()))
        .expect("Failed to register relay_stop_requests_total");
    registry
        .register(Box::new(generation_duration.clone()))
        .expect("Failed to register relay_generation_duration_seconds");
    registry
        .register(Box::new(upstream_errors.clone()))
        .expect("Failed to register upstream_errors_total");

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = RELAY_GENERATIONS_TOTAL.set(generations_total);
    let _ = RELAY_GENERATIONS_IN_FLIGHT.set(in_flight);
    let _ = RELAY_FRAGMENTS_TOTAL.set(fragments_total);
    let _ = RELAY_STOP_REQUESTS_TOTAL.set(stop_requests_total);
    let _ = RELAY_GENERATION_DURATION_SECONDS.set(generation_duration);
    let _ = UPSTREAM_ERRORS_TOTAL.set(upstream_errors);

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HTTP_METRICS_HANDLE.set(handle);
        }
        Err(e) => tracing::warn!(error = %e, "HTTP metrics recorder not installed"),
    }

    tracing::info!("Prometheus metrics initialized");
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    let mut output = match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    };

    if let Some(handle) = HTTP_METRICS_HANDLE.get() {
        output.push_str(&handle.render());
    }

    output
}

// Helper functions for recording metrics

pub fn inc_in_flight() {
    if let Some(gauge) = RELAY_GENERATIONS_IN_FLIGHT.get() {
        gauge.inc();
    }
}

pub fn dec_in_flight() {
    if let Some(gauge) = RELAY_GENERATIONS_IN_FLIGHT.get() {
        gauge.dec();
    }
}

/// Record a finished generation.
pub fn record_generation(model: &str, outcome: &str, duration_secs: f64) {
    if let Some(counter) = RELAY_GENERATIONS_TOTAL.get() {
        counter.with_label_values(&[model, outcome]).inc();
    }
    if let Some(histogram) = RELAY_GENERATION_DURATION_SECONDS.get() {
        histogram.with_label_values(&[outcome]).observe(duration_secs);
    }
}

pub fn record_fragment() {
    if let Some(counter) = RELAY_FRAGMENTS_TOTAL.get() {
        counter.inc();
    }
}

pub fn record_stop_request() {
    if let Some(counter) = RELAY_STOP_REQUESTS_TOTAL.get() {
        counter.inc();
    }
}

/// Record an upstream provider error.
pub fn record_upstream_error(provider: &str, error_type: &str) {
    if let Some(counter) = UPSTREAM_ERRORS_TOTAL.get() {
        counter.with_label_values(&[provider, error_type]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_relay_counters() {
        init_metrics();
        record_stop_request();
        record_generation("gemini-1.5-flash", "completed", 0.25);

        let output = get_metrics();
        assert!(output.contains("relay_stop_requests_total"));
        assert!(output.contains("relay_generations_total{model=\"gemini-1.5-flash\",outcome=\"completed\"}"));
    }
}
