//! Failure guard: circuit breakers in front of both workload operations.
//!
//! | Operation | Breaker open | Call failed |
//! |-----------|--------------|-------------|
//! | monthly duration | `DownstreamUnavailable`, nothing published | error surfaced |
//! | session notification | logged and dropped | logged and dropped |

use crate::adapters::RequestPublisher;
use crate::domain::{
    AuthContext, CircuitBreaker, CorrelationRegistry, TrainingSessionNotice, WorkloadConfig,
    WorkloadError, WorkloadQuery,
};
use crate::ports::{Clock, MessageTransport};
use crate::service::{NotificationClient, WorkloadClient};
use gym_telemetry::{CIRCUIT_REJECTIONS, NOTIFICATIONS, WORKLOAD_REQUESTS};
use std::sync::Arc;
use tracing::warn;

const QUERY_OPERATION: &str = "workload-query";
const NOTIFICATION_OPERATION: &str = "workload-notification";

/// Result of a guarded notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Accepted by the transport
    Delivered,
    /// Not sent, or sending failed; the caller carries on regardless
    Dropped,
}

/// Entry point for callers of the workload service.
pub struct FailureGuard {
    workload: WorkloadClient,
    notifications: NotificationClient,
    query_breaker: CircuitBreaker,
    notification_breaker: CircuitBreaker,
}

impl FailureGuard {
    pub fn new(
        workload: WorkloadClient,
        notifications: NotificationClient,
        query_breaker: CircuitBreaker,
        notification_breaker: CircuitBreaker,
    ) -> Self {
        Self {
            workload,
            notifications,
            query_breaker,
            notification_breaker,
        }
    }

    /// Wire clients and breakers from configuration.
    pub fn from_config(
        config: &WorkloadConfig,
        registry: Arc<CorrelationRegistry>,
        transport: Arc<dyn MessageTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let destinations = &config.destinations;
        let publisher = RequestPublisher::new(transport, destinations.reply.clone());

        Self::new(
            WorkloadClient::new(
                registry,
                publisher.clone(),
                destinations.request.clone(),
                config.reply_timeout,
            ),
            NotificationClient::new(publisher, destinations.notification.clone()),
            CircuitBreaker::new(QUERY_OPERATION, config.query_breaker.clone(), clock.clone()),
            CircuitBreaker::new(
                NOTIFICATION_OPERATION,
                config.notification_breaker.clone(),
                clock,
            ),
        )
    }

    /// Monthly training duration, failing fast while the circuit is open.
    pub async fn get_monthly_duration(
        &self,
        query: &WorkloadQuery,
        auth: &AuthContext,
    ) -> Result<f64, WorkloadError> {
        let Some(permit) = self.query_breaker.try_acquire() else {
            CIRCUIT_REJECTIONS.with_label_values(&[QUERY_OPERATION]).inc();
            WORKLOAD_REQUESTS.with_label_values(&["unavailable"]).inc();
            return Err(WorkloadError::DownstreamUnavailable {
                operation: QUERY_OPERATION.to_string(),
            });
        };

        let result = self.workload.get_monthly_duration(query, auth).await;
        match &result {
            // An error reply still means the service answered
            Ok(_) | Err(WorkloadError::DownstreamRejected(_)) => permit.success(),
            Err(e) if e.is_breaker_failure() => permit.failure(),
            // Says nothing about the downstream service
            Err(_) => drop(permit),
        }
        result
    }

    /// Best-effort session notification. Never fails the caller.
    pub async fn notify_session(
        &self,
        notice: &TrainingSessionNotice,
        auth: &AuthContext,
    ) -> NotificationOutcome {
        let Some(permit) = self.notification_breaker.try_acquire() else {
            CIRCUIT_REJECTIONS
                .with_label_values(&[NOTIFICATION_OPERATION])
                .inc();
            NOTIFICATIONS.with_label_values(&["dropped"]).inc();
            warn!(
                trainer_username = %notice.trainer_username,
                action_type = ?notice.action_type,
                "Circuit open, dropping training session notification"
            );
            return NotificationOutcome::Dropped;
        };

        match self.notifications.notify(notice, auth).await {
            Ok(()) => {
                permit.success();
                NOTIFICATIONS.with_label_values(&["delivered"]).inc();
                NotificationOutcome::Delivered
            }
            Err(e) => {
                permit.failure();
                NOTIFICATIONS.with_label_values(&["dropped"]).inc();
                warn!(
                    trainer_username = %notice.trainer_username,
                    action_type = ?notice.action_type,
                    error = %e,
                    "Failed to publish training session notification, dropping"
                );
                NotificationOutcome::Dropped
            }
        }
    }

    pub fn query_breaker(&self) -> &CircuitBreaker {
        &self.query_breaker
    }

    pub fn notification_breaker(&self) -> &CircuitBreaker {
        &self.notification_breaker
    }

    pub fn workload(&self) -> &WorkloadClient {
        &self.workload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingTransport;
    use crate::domain::{ActionType, CircuitState, ReplyOutcome, TransportError};
    use crate::ports::ManualClock;
    use crate::service::test_support::{auth, notice, ReplyingTransport};
    use std::time::Duration;

    fn query() -> WorkloadQuery {
        WorkloadQuery::new("T1", 2024, 3)
    }

    fn guard(
        transport: Arc<dyn MessageTransport>,
        registry: Arc<CorrelationRegistry>,
    ) -> (FailureGuard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let guard = FailureGuard::from_config(
            &WorkloadConfig::default(),
            registry,
            transport,
            clock.clone(),
        );
        (guard, clock)
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let registry = Arc::new(CorrelationRegistry::new());
        let transport = Arc::new(ReplyingTransport::new(
            registry.clone(),
            ReplyOutcome::Duration(12.5),
        ));
        let (guard, _) = guard(transport, registry);

        assert_eq!(guard.get_monthly_duration(&query(), &auth()).await, Ok(12.5));
        assert_eq!(guard.query_breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ten_timeouts_open_circuit_and_eleventh_is_not_published() {
        let registry = Arc::new(CorrelationRegistry::new());
        let transport = Arc::new(RecordingTransport::new());
        let (guard, _) = guard(transport.clone(), registry.clone());

        for _ in 0..10 {
            let err = guard.get_monthly_duration(&query(), &auth()).await.unwrap_err();
            assert!(matches!(err, WorkloadError::DownstreamTimeout { .. }));
        }
        assert_eq!(transport.sent_count(), 10);
        assert_eq!(guard.query_breaker().state(), CircuitState::Open);

        let err = guard.get_monthly_duration(&query(), &auth()).await.unwrap_err();
        assert_eq!(
            err,
            WorkloadError::DownstreamUnavailable {
                operation: "workload-query".into()
            }
        );
        assert_eq!(err.status_code(), 503);
        assert_eq!(transport.sent_count(), 10);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_half_open_trial_success_closes() {
        let registry = Arc::new(CorrelationRegistry::new());
        let transport = Arc::new(ReplyingTransport::new(
            registry.clone(),
            ReplyOutcome::Duration(4.0),
        ));
        let (guard, clock) = guard(transport.clone(), registry);

        transport.set_failing(true);
        for _ in 0..10 {
            let err = guard.get_monthly_duration(&query(), &auth()).await.unwrap_err();
            assert!(matches!(err, WorkloadError::Transport(TransportError::Unreachable(_))));
        }
        assert_eq!(guard.query_breaker().state(), CircuitState::Open);

        transport.set_failing(false);
        clock.advance(Duration::from_secs(30));
        assert_eq!(guard.query_breaker().state(), CircuitState::HalfOpen);

        assert_eq!(guard.get_monthly_duration(&query(), &auth()).await, Ok(4.0));
        assert_eq!(guard.query_breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_failure_reopens() {
        let registry = Arc::new(CorrelationRegistry::new());
        let transport = Arc::new(ReplyingTransport::new(
            registry.clone(),
            ReplyOutcome::Duration(4.0),
        ));
        let (guard, clock) = guard(transport.clone(), registry);

        transport.set_failing(true);
        for _ in 0..10 {
            let _ = guard.get_monthly_duration(&query(), &auth()).await;
        }
        clock.advance(Duration::from_secs(30));

        assert!(guard.get_monthly_duration(&query(), &auth()).await.is_err());
        assert_eq!(guard.query_breaker().state(), CircuitState::Open);
        assert!(matches!(
            guard.get_monthly_duration(&query(), &auth()).await,
            Err(WorkloadError::DownstreamUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_error_replies_keep_circuit_closed() {
        let registry = Arc::new(CorrelationRegistry::new());
        let transport = Arc::new(ReplyingTransport::new(
            registry.clone(),
            ReplyOutcome::Rejected("unknown trainer".into()),
        ));
        let (guard, _) = guard(transport.clone(), registry);

        for _ in 0..10 {
            let err = guard
                .get_monthly_duration(&WorkloadQuery::new("NOPE", 2024, 3), &auth())
                .await
                .unwrap_err();
            assert_eq!(err, WorkloadError::DownstreamRejected("unknown trainer".into()));
        }
        assert_eq!(guard.query_breaker().state(), CircuitState::Closed);
        assert_eq!(guard.query_breaker().stats().window_failures, 0);

        // Still reaches the service rather than failing fast
        assert!(matches!(
            guard.get_monthly_duration(&query(), &auth()).await,
            Err(WorkloadError::DownstreamRejected(_))
        ));
        assert_eq!(transport.sent_count(), 11);
    }

    #[tokio::test]
    async fn test_invalid_queries_do_not_trip_breaker() {
        let registry = Arc::new(CorrelationRegistry::new());
        let (guard, _) = guard(Arc::new(RecordingTransport::new()), registry);

        for _ in 0..20 {
            let err = guard
                .get_monthly_duration(&WorkloadQuery::new("T1", 2024, 0), &auth())
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), 400);
        }
        assert_eq!(guard.query_breaker().state(), CircuitState::Closed);
        assert_eq!(guard.query_breaker().stats().window_calls, 0);
    }

    #[tokio::test]
    async fn test_notification_delivered() {
        let transport = Arc::new(RecordingTransport::new());
        let (guard, _) = guard(transport.clone(), Arc::new(CorrelationRegistry::new()));

        let outcome = guard.notify_session(&notice(ActionType::Add), &auth()).await;

        assert_eq!(outcome, NotificationOutcome::Delivered);
        assert_eq!(transport.sent_count(), 1);
        assert_eq!(transport.last().unwrap().destination, "trainer.workload.session");
    }

    #[tokio::test]
    async fn test_notification_failure_is_dropped_and_open_circuit_skips_publish() {
        let transport = Arc::new(RecordingTransport::new());
        let (guard, _) = guard(transport.clone(), Arc::new(CorrelationRegistry::new()));

        transport.set_failing(true);
        for _ in 0..10 {
            assert_eq!(
                guard.notify_session(&notice(ActionType::Remove), &auth()).await,
                NotificationOutcome::Dropped
            );
        }
        assert_eq!(guard.notification_breaker().state(), CircuitState::Open);
        // The query circuit is independent
        assert_eq!(guard.query_breaker().state(), CircuitState::Closed);

        transport.set_failing(false);
        assert_eq!(
            guard.notify_session(&notice(ActionType::Add), &auth()).await,
            NotificationOutcome::Dropped
        );
        assert_eq!(transport.sent_count(), 0);
    }
}
