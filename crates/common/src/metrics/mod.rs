//! Metrics and observability utilities
//!
//! Prometheus metrics with SLO-aligned latency buckets and `mentorhub_`
//! prefixed names.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all MentorHub metrics
pub const METRICS_PREFIX: &str = "mentorhub";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 250ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.100,  // 100ms
    0.250,  // 250ms - P99 target
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Buckets for payment gateway calls (remote, slower)
pub const GATEWAY_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 15.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_sessions_booked_total", METRICS_PREFIX),
        Unit::Count,
        "Sessions created, by payment mode"
    );

    describe_counter!(
        format!("{}_session_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Session status transitions, by action"
    );

    describe_counter!(
        format!("{}_booking_conflicts_total", METRICS_PREFIX),
        Unit::Count,
        "Bookings rejected because the slot was taken"
    );

    describe_counter!(
        format!("{}_payments_total", METRICS_PREFIX),
        Unit::Count,
        "Payment outcomes, by mode and outcome"
    );

    describe_histogram!(
        format!("{}_gateway_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Payment gateway call latency in seconds"
    );

    describe_counter!(
        format!("{}_manual_payments_expired_total", METRICS_PREFIX),
        Unit::Count,
        "Manual-payment sessions cancelled by the expiry sweep"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

pub fn record_booking(payment_mode: &str) {
    counter!(
        format!("{}_sessions_booked_total", METRICS_PREFIX),
        "mode" => payment_mode.to_string()
    )
    .increment(1);
}

pub fn record_transition(action: &str) {
    counter!(
        format!("{}_session_transitions_total", METRICS_PREFIX),
        "action" => action.to_string()
    )
    .increment(1);
}

pub fn record_conflict() {
    counter!(format!("{}_booking_conflicts_total", METRICS_PREFIX)).increment(1);
}

/// Record a payment outcome such as `verified`, `rejected` or `bad_signature`
pub fn record_payment(mode: &str, outcome: &str) {
    counter!(
        format!("{}_payments_total", METRICS_PREFIX),
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_gateway_call(duration_secs: f64, provider: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    histogram!(
        format!("{}_gateway_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .record(duration_secs);
}

pub fn record_expired(count: u64) {
    if count > 0 {
        counter!(format!("{}_manual_payments_expired_total", METRICS_PREFIX)).increment(count);
    }
}
