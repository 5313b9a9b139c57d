//! Prometheus metrics for the capture pipeline.
//!
//! Tracks incoming signals, exchange transitions, deliveries and validations.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, CounterVec, Encoder, Gauge, TextEncoder,
};

lazy_static! {
    /// Capture signals by kind and what the correlator did with them
    pub static ref SIGNALS_TOTAL: CounterVec = register_counter_vec!(
        "plopl_signals_total",
        "Total number of capture signals processed",
        &["kind", "outcome"]  // kind: request_started|request_body|response, outcome: accepted|buffered|ignored
    )
    .unwrap();

    /// Exchange state transitions
    pub static ref TRANSITIONS_TOTAL: CounterVec = register_counter_vec!(
        "plopl_transitions_total",
        "Total number of exchange state transitions",
        &["state"]
    )
    .unwrap();

    /// Delivery outcomes
    pub static ref DELIVERIES_TOTAL: CounterVec = register_counter_vec!(
        "plopl_deliveries_total",
        "Total number of exchange delivery attempts by outcome",
        &["result"]  // result: delivered|retry|undelivered
    )
    .unwrap();

    /// Response validations
    pub static ref VALIDATIONS_TOTAL: CounterVec = register_counter_vec!(
        "plopl_validations_total",
        "Total number of response validations",
        &["result"]  // result: valid|invalid
    )
    .unwrap();

    /// Exchanges currently in the live table
    pub static ref LIVE_EXCHANGES: Gauge = register_gauge!(
        "plopl_live_exchanges",
        "Number of in-flight exchanges tracked by the correlator"
    )
    .unwrap();
}

/// Collect all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record a processed signal
pub fn record_signal(kind: &str, outcome: &str) {
    SIGNALS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

/// Helper to record a state transition
pub fn record_transition(state: &str) {
    TRANSITIONS_TOTAL.with_label_values(&[state]).inc();
}

/// Helper to record a delivery outcome
pub fn record_delivery(result: &str) {
    DELIVERIES_TOTAL.with_label_values(&[result]).inc();
}

/// Helper to record a validation verdict
pub fn record_validation(valid: bool) {
    let result = if valid { "valid" } else { "invalid" };
    VALIDATIONS_TOTAL.with_label_values(&[result]).inc();
}

/// Helper to set the live exchange gauge
pub fn set_live_exchanges(count: usize) {
    LIVE_EXCHANGES.set(count as f64);
}
