//! Request publisher: serializes payloads and hands them to the transport.

use crate::domain::{AuthContext, CorrelationId, OutboundEnvelope, OutboundPayload, TransportError};
use crate::ports::MessageTransport;
use std::sync::Arc;
use tracing::debug;

/// Turns typed payloads into envelopes and publishes them.
///
/// Request/reply and fire-and-forget share this path; the only difference
/// is whether a correlation id (and with it a reply destination) is stamped.
#[derive(Clone)]
pub struct RequestPublisher {
    transport: Arc<dyn MessageTransport>,
    /// Where replies to correlated requests should be sent
    reply_to: String,
}

impl RequestPublisher {
    pub fn new(transport: Arc<dyn MessageTransport>, reply_to: impl Into<String>) -> Self {
        Self {
            transport,
            reply_to: reply_to.into(),
        }
    }

    /// Serialize `payload`, stamp it and send it to `destination`.
    ///
    /// Returns once the transport accepted the message. Delivery is
    /// at-least-once at best; nothing here waits for a consumer.
    pub async fn publish<P: OutboundPayload>(
        &self,
        destination: &str,
        payload: &P,
        correlation_id: Option<CorrelationId>,
        auth: &AuthContext,
    ) -> Result<(), TransportError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;

        let envelope = OutboundEnvelope {
            destination: destination.to_string(),
            message_type: P::MESSAGE_TYPE.to_string(),
            payload: body,
            correlation_id,
            reply_to: correlation_id.map(|_| self.reply_to.clone()),
            authorization: Some(auth.authorization_header()),
        };

        debug!(
            destination = %destination,
            message_type = P::MESSAGE_TYPE,
            correlation_id = ?correlation_id.map(|id| id.to_string()),
            username = %auth.username,
            "Publishing workload message"
        );

        self.transport.send(envelope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingTransport;
    use crate::domain::{ActionType, TrainingSessionNotice, WorkloadQuery};
    use chrono::NaiveDate;

    fn auth() -> AuthContext {
        AuthContext::new("admin", "token-123")
    }

    #[tokio::test]
    async fn test_publish_request_stamps_correlation() {
        let transport = Arc::new(RecordingTransport::new());
        let publisher = RequestPublisher::new(transport.clone(), "replies");
        let id = CorrelationId::new();

        publisher
            .publish("requests", &WorkloadQuery::new("T1", 2024, 3), Some(id), &auth())
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let envelope = &sent[0];
        assert_eq!(envelope.destination, "requests");
        assert_eq!(envelope.message_type, "workload.query");
        assert_eq!(envelope.correlation_id, Some(id));
        assert_eq!(envelope.reply_to.as_deref(), Some("replies"));
        assert_eq!(envelope.authorization.as_deref(), Some("Bearer token-123"));

        let body: serde_json::Value = serde_json::from_str(&envelope.payload).unwrap();
        assert_eq!(body["trainerId"], "T1");
        assert_eq!(body["month"], 3);
    }

    #[tokio::test]
    async fn test_publish_notification_has_no_correlation() {
        let transport = Arc::new(RecordingTransport::new());
        let publisher = RequestPublisher::new(transport.clone(), "replies");
        let notice = TrainingSessionNotice {
            trainer_username: "john.doe".into(),
            trainer_first_name: "John".into(),
            trainer_last_name: "Doe".into(),
            is_active: true,
            training_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            training_duration: 45.0,
            action_type: ActionType::Remove,
        };

        publisher.publish("sessions", &notice, None, &auth()).await.unwrap();

        let envelope = &transport.sent()[0];
        assert_eq!(envelope.message_type, "workload.session");
        assert_eq!(envelope.correlation_id, None);
        assert_eq!(envelope.reply_to, None);
        assert!(envelope.payload.contains("\"actionType\":\"REMOVE\""));
    }

    #[tokio::test]
    async fn test_publish_propagates_transport_failure() {
        let transport = Arc::new(RecordingTransport::new());
        transport.set_failing(true);
        let publisher = RequestPublisher::new(transport.clone(), "replies");

        let result = publisher
            .publish(
                "requests",
                &WorkloadQuery::new("T1", 2024, 3),
                Some(CorrelationId::new()),
                &auth(),
            )
            .await;

        assert!(matches!(result, Err(TransportError::Unreachable(_))));
        assert_eq!(transport.sent_count(), 0);
    }
}
