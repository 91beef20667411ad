//! Error types for the trainer workload bridge.

use crate::domain::correlation::CorrelationId;
use std::time::Duration;
use thiserror::Error;

/// Correlation registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The id is already registered. Ids are generated fresh per request,
    /// so this is a programming error rather than a runtime condition.
    #[error("duplicate correlation id: {0}")]
    DuplicateCorrelation(CorrelationId),
}

/// Failure to hand a message to the transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel is shut down.
    #[error("message channel closed")]
    Closed,

    /// The payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The broker or channel could not be reached.
    #[error("transport unreachable: {0}")]
    Unreachable(String),
}

/// Errors surfaced to callers of the workload operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkloadError {
    /// Publishing the request failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No reply arrived within the bound.
    #[error("no reply from workload service within {}ms", .timeout.as_millis())]
    DownstreamTimeout { timeout: Duration },

    /// The circuit for this operation is open; nothing was attempted.
    #[error("workload service unavailable: circuit open for {operation}")]
    DownstreamUnavailable { operation: String },

    /// The workload service answered with an error indicator.
    #[error("workload service rejected the request: {0}")]
    DownstreamRejected(String),

    /// Correlation id collision (programming error).
    #[error("duplicate correlation id: {0}")]
    DuplicateCorrelation(CorrelationId),

    /// The query was invalid and was never sent.
    #[error("invalid workload query: {0}")]
    InvalidQuery(String),
}

impl From<RegistryError> for WorkloadError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateCorrelation(id) => WorkloadError::DuplicateCorrelation(id),
        }
    }
}

impl WorkloadError {
    /// Whether this outcome counts against the downstream dependency for
    /// circuit-breaking purposes. An error reply is an answer, so the
    /// service is reachable and it does not count.
    pub fn is_breaker_failure(&self) -> bool {
        matches!(
            self,
            WorkloadError::Transport(_) | WorkloadError::DownstreamTimeout { .. }
        )
    }

    /// HTTP status a controller should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            WorkloadError::Transport(_)
            | WorkloadError::DownstreamTimeout { .. }
            | WorkloadError::DownstreamUnavailable { .. } => 503,
            WorkloadError::DownstreamRejected(_) => 502,
            WorkloadError::InvalidQuery(_) => 400,
            WorkloadError::DuplicateCorrelation(_) => 500,
        }
    }

    /// Short label for metrics.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            WorkloadError::Transport(_) => "transport_error",
            WorkloadError::DownstreamTimeout { .. } => "timeout",
            WorkloadError::DownstreamUnavailable { .. } => "unavailable",
            WorkloadError::DownstreamRejected(_) => "rejected",
            WorkloadError::DuplicateCorrelation(_) => "duplicate_correlation",
            WorkloadError::InvalidQuery(_) => "invalid",
        }
    }
}
