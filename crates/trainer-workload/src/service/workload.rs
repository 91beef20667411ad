//! Workload client: monthly training duration over request/reply.

use crate::adapters::RequestPublisher;
use crate::domain::{
    AuthContext, CorrelationId, CorrelationRegistry, ReplyOutcome, TransportError, WorkloadError,
    WorkloadQuery,
};
use gym_telemetry::{WORKLOAD_REQUESTS, WORKLOAD_ROUND_TRIP};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Releases a registry entry when the waiting call ends, however it ends.
struct EntryGuard<'a> {
    registry: &'a CorrelationRegistry,
    id: CorrelationId,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

/// Asks the workload service for a trainer's monthly training duration and
/// waits, bounded, for the answer.
pub struct WorkloadClient {
    registry: Arc<CorrelationRegistry>,
    publisher: RequestPublisher,
    destination: String,
    reply_timeout: Duration,
}

impl WorkloadClient {
    pub fn new(
        registry: Arc<CorrelationRegistry>,
        publisher: RequestPublisher,
        destination: impl Into<String>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            publisher,
            destination: destination.into(),
            reply_timeout,
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    /// Total training duration for `query`.
    ///
    /// Suspends only on this request's own slot, for at most the reply
    /// timeout. The registry entry is released on every exit path,
    /// including the future being dropped mid-wait.
    pub async fn get_monthly_duration(
        &self,
        query: &WorkloadQuery,
        auth: &AuthContext,
    ) -> Result<f64, WorkloadError> {
        query.validate()?;

        let result = self.round_trip(query, auth).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome_label(),
        };
        WORKLOAD_REQUESTS.with_label_values(&[outcome]).inc();
        result
    }

    async fn round_trip(
        &self,
        query: &WorkloadQuery,
        auth: &AuthContext,
    ) -> Result<f64, WorkloadError> {
        let id = CorrelationId::new();
        let reply = self.registry.register(id)?;
        let _entry = EntryGuard {
            registry: &self.registry,
            id,
        };

        let started = Instant::now();
        self.publisher
            .publish(&self.destination, query, Some(id), auth)
            .await?;

        let outcome = match tokio::time::timeout(self.reply_timeout, reply).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => return Err(TransportError::Closed.into()),
            Err(_) => {
                warn!(
                    correlation_id = %id,
                    trainer_id = %query.trainer_id,
                    timeout_ms = self.reply_timeout.as_millis(),
                    "Workload query timed out"
                );
                return Err(WorkloadError::DownstreamTimeout {
                    timeout: self.reply_timeout,
                });
            }
        };
        WORKLOAD_ROUND_TRIP.observe(started.elapsed().as_secs_f64());

        match outcome {
            ReplyOutcome::Duration(value) => {
                debug!(
                    correlation_id = %id,
                    trainer_id = %query.trainer_id,
                    year = query.year,
                    month = query.month,
                    duration = value,
                    "Workload query answered"
                );
                Ok(value)
            }
            ReplyOutcome::Rejected(reason) => {
                warn!(correlation_id = %id, reason = %reason, "Workload service rejected query");
                Err(WorkloadError::DownstreamRejected(reason))
            }
        }
    }
}
