//! Response subscriber: the background listener on the reply channel.
//!
//! Every inbound message either resolves a registry slot, is an orphan
//! (logged and dropped) or is malformed (logged, counted and optionally
//! dead-lettered). None of these stop the loop; only a closed channel or a
//! shutdown signal does.

use crate::domain::{
    CorrelationId, CorrelationRegistry, InboundEnvelope, OutboundEnvelope,
    DEAD_LETTER_MESSAGE_TYPE,
};
use crate::ports::{InboundMessage, MessageTransport, ReceiveError, ReplyReceiver};
use gym_telemetry::MALFORMED_REPLIES;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause after a failed receive before asking again.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// Filled a waiting slot
    Resolved,
    /// No slot took it: unknown, expired or already fulfilled
    Orphaned,
    /// Could not be interpreted
    Malformed,
}

/// Listener that feeds replies into the correlation registry.
pub struct ResponseSubscriber {
    registry: Arc<CorrelationRegistry>,
    receiver: Arc<dyn ReplyReceiver>,
    dead_letter: Option<DeadLetter>,
}

struct DeadLetter {
    transport: Arc<dyn MessageTransport>,
    destination: String,
}

impl ResponseSubscriber {
    pub fn new(registry: Arc<CorrelationRegistry>, receiver: Arc<dyn ReplyReceiver>) -> Self {
        Self {
            registry,
            receiver,
            dead_letter: None,
        }
    }

    /// Forward malformed messages to `destination`.
    pub fn with_dead_letter(
        mut self,
        transport: Arc<dyn MessageTransport>,
        destination: impl Into<String>,
    ) -> Self {
        self.dead_letter = Some(DeadLetter {
            transport,
            destination: destination.into(),
        });
        self
    }

    /// Run the listener loop until the channel closes or `shutdown` flips
    /// to true (or its sender goes away).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Workload response subscriber started");

        if *shutdown.borrow() {
            info!("Workload response subscriber stopped before first receive");
            return;
        }

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Workload response subscriber shutting down");
                        break;
                    }
                }

                received = self.receiver.receive() => match received {
                    Ok(message) => {
                        self.handle_message(message).await;
                    }
                    Err(ReceiveError::Closed) => {
                        warn!("Reply channel closed, stopping workload response subscriber");
                        break;
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            retry_ms = RECEIVE_RETRY_DELAY.as_millis(),
                            "Error receiving workload reply"
                        );
                        tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                    }
                },
            }
        }
    }

    /// Run on a tokio task.
    ///
    /// Dropping the returned handle also stops the subscriber.
    pub fn spawn(self) -> SubscriberHandle {
        let (shutdown, rx) = watch::channel(false);
        let join = tokio::spawn(self.run(rx));
        SubscriberHandle { shutdown, join }
    }

    /// Process one inbound message.
    pub async fn handle_message(&self, message: InboundMessage) -> ReplyDisposition {
        let envelope: InboundEnvelope = match serde_json::from_str(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                let header_id = message.correlation_header.clone();
                return self
                    .reject(message, header_id.as_deref(), &format!("invalid JSON: {e}"))
                    .await;
            }
        };

        let raw_id = envelope
            .correlation_id
            .clone()
            .or_else(|| message.correlation_header.clone());
        let Some(raw_id) = raw_id else {
            return self.reject(message, None, "missing correlation id").await;
        };
        let Ok(id) = CorrelationId::parse(&raw_id) else {
            return self
                .reject(message, Some(&raw_id), "unparseable correlation id")
                .await;
        };
        let outcome = match envelope.outcome() {
            Ok(outcome) => outcome,
            Err(reason) => return self.reject(message, Some(&raw_id), &reason).await,
        };

        if self.registry.resolve(id, outcome) {
            debug!(correlation_id = %id, "Workload reply delivered to waiter");
            ReplyDisposition::Resolved
        } else {
            ReplyDisposition::Orphaned
        }
    }

    async fn reject(
        &self,
        message: InboundMessage,
        correlation_id: Option<&str>,
        reason: &str,
    ) -> ReplyDisposition {
        MALFORMED_REPLIES.inc();
        warn!(
            correlation_id = correlation_id.unwrap_or("-"),
            reason = %reason,
            "Dropping malformed workload reply"
        );

        if let Some(dead_letter) = &self.dead_letter {
            let envelope = OutboundEnvelope {
                destination: dead_letter.destination.clone(),
                message_type: DEAD_LETTER_MESSAGE_TYPE.to_string(),
                payload: message.body,
                correlation_id: correlation_id.and_then(|raw| CorrelationId::parse(raw).ok()),
                reply_to: None,
                authorization: None,
            };
            if let Err(e) = dead_letter.transport.send(envelope).await {
                warn!(
                    destination = %dead_letter.destination,
                    error = %e,
                    "Failed to dead-letter malformed workload reply"
                );
            }
        }

        ReplyDisposition::Malformed
    }
}

/// Handle to a spawned subscriber.
pub struct SubscriberHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SubscriberHandle {
    /// Whether the listener loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn shutdown(self) {
        // Fails only if the loop already exited
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "Workload response subscriber task failed");
        }
    }
}
