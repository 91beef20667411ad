//! # Subscriptions
//!
//! A [`Subscription`] is one consumer's view of the bus, narrowed to the
//! destinations it asked for.

use crate::message::{BusMessage, DestinationFilter};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Receiving end for a set of destinations.
pub struct Subscription {
    receiver: broadcast::Receiver<BusMessage>,
    filter: DestinationFilter,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<BusMessage>,
        filter: DestinationFilter,
    ) -> Self {
        Self { receiver, filter }
    }

    /// Next message addressed to one of this subscription's destinations.
    ///
    /// `None` once the bus is closed or dropped and the buffer is drained.
    /// A consumer that falls behind loses the overwritten messages and
    /// carries on from the oldest one still buffered.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if self.filter.matches(&message) => return Some(message),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!(
                    missed,
                    destinations = ?self.filter.destinations,
                    "Subscription fell behind, messages lost"
                ),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
