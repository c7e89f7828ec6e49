//! Prometheus metrics for tax-rate-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Recorder behind the `metrics` facade used by the HTTP middleware.
static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Ledger operation counter by operation and outcome.
pub static LEDGER_OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tax_rate_operations_total",
        "Total number of tax rate ledger operations",
        &["operation", "status"]
    )
    .expect("Failed to register tax_rate_operations_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tax_rate_errors_total",
        "Total number of errors by type",
        &["error_type"] // conflict, forbidden, storage, ...
    )
    .expect("Failed to register tax_rate_errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tax_rate_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register tax_rate_db_query_duration_seconds")
});

/// Install the request metrics recorder and force the ledger metrics.
///
/// Safe to call more than once per process; the recorder is installed once.
pub fn init_metrics() {
    if let Err(e) =
        METRICS_HANDLE.get_or_try_init(|| PrometheusBuilder::new().install_recorder())
    {
        tracing::warn!(error = %e, "Failed to install Prometheus recorder");
    }

    Lazy::force(&LEDGER_OPERATIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format: HTTP request metrics first,
/// then the ledger's own registry.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&prometheus::gather()) {
        Ok(ledger_metrics) => output.push_str(&ledger_metrics),
        Err(e) => tracing::warn!(error = %e, "Failed to encode ledger metrics"),
    }

    output
}
