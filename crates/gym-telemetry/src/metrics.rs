//! Prometheus metrics for the trainer workload bridge.
//!
//! All metrics follow the naming convention: `gym_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Metrics registry for the bridge
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // WORKLOAD QUERIES
    // =========================================================================

    /// Workload queries by outcome
    pub static ref WORKLOAD_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("gym_workload_requests_total", "Monthly workload queries by outcome"),
        &["outcome"]  // success, timeout, transport_error, rejected, unavailable
    ).expect("metric creation failed");

    /// Round trip from publish to reply
    pub static ref WORKLOAD_ROUND_TRIP: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "gym_workload_round_trip_seconds",
            "Time between publishing a workload query and receiving its reply"
        ).buckets(exponential_buckets(0.001, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");

    /// Correlation entries currently awaiting a reply
    pub static ref PENDING_CORRELATIONS: IntGauge = IntGauge::new(
        "gym_workload_pending_correlations",
        "Registered correlation entries awaiting a reply"
    ).expect("metric creation failed");

    // =========================================================================
    // REPLY CHANNEL
    // =========================================================================

    /// Replies with no registered waiter
    pub static ref ORPHAN_REPLIES: IntCounter = IntCounter::new(
        "gym_workload_orphan_replies_total",
        "Replies discarded because no waiter was registered for their correlation id"
    ).expect("metric creation failed");

    /// Replies that could not be parsed
    pub static ref MALFORMED_REPLIES: IntCounter = IntCounter::new(
        "gym_workload_malformed_replies_total",
        "Inbound messages dropped because they were malformed"
    ).expect("metric creation failed");

    // =========================================================================
    // NOTIFICATIONS & CIRCUIT BREAKERS
    // =========================================================================

    /// Session notifications by outcome
    pub static ref NOTIFICATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("gym_workload_notifications_total", "Training session notifications by outcome"),
        &["outcome"]  // delivered, dropped
    ).expect("metric creation failed");

    /// Calls rejected by an open circuit
    pub static ref CIRCUIT_REJECTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "gym_workload_circuit_rejections_total",
            "Calls short-circuited by an open breaker"
        ),
        &["operation"]
    ).expect("metric creation failed");
}

/// Handle to the metrics registry.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> Result<String, TelemetryError> {
        encode_families(&self.registry)
    }
}

/// Register all bridge metrics.
///
/// Safe to call more than once; metrics already registered are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(WORKLOAD_REQUESTS.clone()),
        Box::new(WORKLOAD_ROUND_TRIP.clone()),
        Box::new(PENDING_CORRELATIONS.clone()),
        Box::new(ORPHAN_REPLIES.clone()),
        Box::new(MALFORMED_REPLIES.clone()),
        Box::new(NOTIFICATIONS.clone()),
        Box::new(CIRCUIT_REJECTIONS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode_families(&REGISTRY)
}

fn encode_families(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_encode_contains_registered_metrics() {
        let handle = register_metrics().unwrap();
        ORPHAN_REPLIES.inc();
        WORKLOAD_REQUESTS.with_label_values(&["success"]).inc();

        let text = handle.render().unwrap();
        assert!(text.contains("gym_workload_orphan_replies_total"));
        assert!(text.contains("gym_workload_requests_total"));
        assert_eq!(text, encode_metrics().unwrap());
    }
}
