//! Message bus adapter.
//!
//! Implements `MessageTransport` and `ReplyReceiver` on top of shared-bus.

use crate::domain::{OutboundEnvelope, TransportError};
use crate::ports::{InboundMessage, MessageTransport, ReceiveError, ReplyReceiver};
use async_trait::async_trait;
use shared_bus::{
    BusError, BusMessage, DestinationFilter, InMemoryMessageBus, MessagePublisher, Subscription,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Publishes envelopes onto the shared message bus.
pub struct BusTransport {
    bus: Arc<InMemoryMessageBus>,
}

impl BusTransport {
    pub fn new(bus: Arc<InMemoryMessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl MessageTransport for BusTransport {
    async fn send(&self, envelope: OutboundEnvelope) -> Result<(), TransportError> {
        let mut message = BusMessage::new(envelope.destination, envelope.payload)
            .with_message_type(envelope.message_type);
        if let Some(id) = envelope.correlation_id {
            message = message.with_correlation_id(id.to_string());
        }
        if let Some(reply_to) = envelope.reply_to {
            message = message.with_reply_to(reply_to);
        }
        if let Some(authorization) = envelope.authorization {
            message = message.with_authorization(authorization);
        }

        let destination = message.destination.clone();
        let receivers = self.bus.publish(message).await.map_err(|e| match e {
            BusError::Closed => TransportError::Closed,
        })?;

        if receivers == 0 {
            // At-least-once brokers would hold the message; here it is gone.
            warn!(destination = %destination, "No consumer subscribed to destination");
        } else {
            debug!(destination = %destination, receivers, "Message delivered to bus");
        }
        Ok(())
    }
}

/// Receives replies from one destination on the shared message bus.
pub struct BusReplyReceiver {
    subscription: Mutex<Subscription>,
}

impl BusReplyReceiver {
    /// Subscribe to `destination`. The subscription exists from this call
    /// on, so replies published afterwards are not missed.
    pub fn new(bus: &InMemoryMessageBus, destination: impl Into<String>) -> Self {
        Self {
            subscription: Mutex::new(bus.subscribe(DestinationFilter::destination(destination))),
        }
    }
}

#[async_trait]
impl ReplyReceiver for BusReplyReceiver {
    async fn receive(&self) -> Result<InboundMessage, ReceiveError> {
        let mut subscription = self.subscription.lock().await;
        match subscription.recv().await {
            Some(message) => Ok(InboundMessage {
                correlation_header: message.headers.correlation_id,
                body: message.body,
            }),
            None => Err(ReceiveError::Closed),
        }
    }
}
