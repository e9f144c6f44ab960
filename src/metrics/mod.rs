//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction submission outcomes
//! - Confirmation latency
//! - Nonce resynchronisation

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "ember_wallet_transactions_submitted_total",
        "Total transactions accepted by the network",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "ember_wallet_transactions_confirmed_total",
        "Total transactions included in a block, by execution status",
        &["chain_id", "status"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "ember_wallet_transactions_failed_total",
        "Total transactions that failed before inclusion, by error kind",
        &["chain_id", "kind"]
    ).unwrap();

    pub static ref TX_CONFIRMATION_TIMEOUTS: CounterVec = register_counter_vec!(
        "ember_wallet_confirmation_timeouts_total",
        "Total receipt waits that ended without an outcome",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "ember_wallet_confirmation_latency_seconds",
        "Time from broadcast to receipt",
        &["chain_id"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    // Nonce metrics
    pub static ref NONCE_RESYNCS: CounterVec = register_counter_vec!(
        "ember_wallet_nonce_resyncs_total",
        "Total nonce reads from the network",
        &[]
    ).unwrap();
}

/// Text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_tx_submitted(chain_id: u64) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_confirmed(chain_id: u64, success: bool) {
    let status = if success { "success" } else { "reverted" };
    TX_CONFIRMED
        .with_label_values(&[&chain_id.to_string(), status])
        .inc();
}

pub fn record_tx_failed(chain_id: u64, kind: &str) {
    TX_FAILED
        .with_label_values(&[&chain_id.to_string(), kind])
        .inc();
}

pub fn record_confirmation_timeout(chain_id: u64) {
    TX_CONFIRMATION_TIMEOUTS
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_latency(chain_id: u64, latency_secs: f64) {
    TX_LATENCY
        .with_label_values(&[&chain_id.to_string()])
        .observe(latency_secs);
}

pub fn record_nonce_resync() {
    NONCE_RESYNCS.with_label_values(&[]).inc();
}
