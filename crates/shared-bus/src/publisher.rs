//! # Message Publisher
//!
//! The bus itself: one broadcast channel shared by every destination.
//! Routing happens on the receiving side, where each [`Subscription`] drops
//! messages addressed elsewhere.

use crate::message::{BusMessage, DestinationFilter};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Errors from publish operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus was closed; nothing more is accepted.
    #[error("message bus closed")]
    Closed,
}

/// Puts messages on their destination.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Hand `message` to every live subscription.
    ///
    /// Returns the number of subscriptions attached at send time. Zero means
    /// the message reached nobody and is gone.
    async fn publish(&self, message: BusMessage) -> Result<usize, BusError>;
}

/// Single-process bus on `tokio::sync::broadcast`.
///
/// Closing drops the sender, so subscriptions drain what is already
/// buffered and then see the end of the stream.
pub struct InMemoryMessageBus {
    /// `None` once closed.
    sender: RwLock<Option<broadcast::Sender<BusMessage>>>,
}

impl InMemoryMessageBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            sender: RwLock::new(Some(sender)),
        }
    }

    /// Attach a subscription for the destinations in `filter`.
    ///
    /// Only messages published after this call are seen.
    #[must_use]
    pub fn subscribe(&self, filter: DestinationFilter) -> Subscription {
        let receiver = match self.sender.read().as_ref() {
            Some(sender) => sender.subscribe(),
            // Closed: the paired sender drops here, so the stream is already over
            None => broadcast::channel(1).1,
        };
        debug!(destinations = ?filter.destinations, "Subscription attached");
        Subscription::new(receiver, filter)
    }

    /// Stop accepting messages. Idempotent.
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            info!("Message bus closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    fn send(&self, message: BusMessage) -> Result<usize, BusError> {
        let sender = self.sender.read();
        let sender = sender.as_ref().ok_or(BusError::Closed)?;

        let destination = message.destination.clone();
        let message_id = message.message_id;
        // Fails only when no subscription exists
        let receivers = sender.send(message).unwrap_or(0);
        trace!(%destination, %message_id, receivers, "Message sent");
        Ok(receivers)
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryMessageBus {
    async fn publish(&self, message: BusMessage) -> Result<usize, BusError> {
        self.send(message)
    }
}
