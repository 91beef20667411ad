//! # Gym Telemetry
//!
//! Logging and metrics for the trainer workload bridge.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gym_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GYM_SERVICE_NAME` | `gym-backend` | Service name attached to logs |
//! | `GYM_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `GYM_JSON_LOGS` | `false` | Emit JSON lines instead of human-readable output |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, CIRCUIT_REJECTIONS, MALFORMED_REPLIES,
    NOTIFICATIONS, ORPHAN_REPLIES, PENDING_CORRELATIONS, REGISTRY, WORKLOAD_REQUESTS,
    WORKLOAD_ROUND_TRIP,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(&config)?;

    tracing::info!(
        service = %config.service_name,
        log_level = %config.log_level,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    metrics: MetricsHandle,
}

impl TelemetryGuard {
    /// Metrics handle for rendering the exposition format.
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}
