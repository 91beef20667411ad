//! # Bus Messages
//!
//! The envelope every message travels in, plus destination filtering for
//! subscriptions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport-level headers stamped on each message.
///
/// The bus never interprets these; they exist for the producer and consumer
/// to route, correlate and authorize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders {
    /// Links a request to its reply. Absent for fire-and-forget messages.
    pub correlation_id: Option<String>,
    /// Bearer credential of the original caller, forwarded verbatim.
    pub authorization: Option<String>,
    /// Logical message kind (e.g. `workload.query`).
    pub message_type: Option<String>,
    /// Destination the consumer should answer on, if any.
    pub reply_to: Option<String>,
}

/// A single message on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    /// Unique message identifier, assigned at construction.
    pub message_id: Uuid,
    /// Named destination (queue) this message is addressed to.
    pub destination: String,
    /// Routing and auditing headers.
    pub headers: MessageHeaders,
    /// Serialized payload (JSON text).
    pub body: String,
}

impl BusMessage {
    /// Create a message with empty headers.
    #[must_use]
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            destination: destination.into(),
            headers: MessageHeaders::default(),
            body: body.into(),
        }
    }

    /// Set the correlation id header.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.headers.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the authorization header.
    #[must_use]
    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.headers.authorization = Some(authorization.into());
        self
    }

    /// Set the message type header.
    #[must_use]
    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.headers.message_type = Some(message_type.into());
        self
    }

    /// Set the reply-to header.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.headers.reply_to = Some(reply_to.into());
        self
    }

    /// Serialize a payload to JSON and wrap it in a message.
    pub fn json<T: Serialize>(
        destination: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(destination, serde_json::to_string(payload)?))
    }

    /// Deserialize the body as JSON.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Filter for subscribing to a subset of destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationFilter {
    /// Destinations to include. Empty means all destinations.
    pub destinations: Vec<String>,
}

impl DestinationFilter {
    /// Create a filter that accepts all messages.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for a single destination.
    #[must_use]
    pub fn destination(destination: impl Into<String>) -> Self {
        Self {
            destinations: vec![destination.into()],
        }
    }

    /// Create a filter for several destinations.
    #[must_use]
    pub fn destinations(destinations: Vec<String>) -> Self {
        Self { destinations }
    }

    /// Check if a message matches this filter.
    #[must_use]
    pub fn matches(&self, message: &BusMessage) -> bool {
        self.destinations.is_empty() || self.destinations.contains(&message.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_all() {
        let filter = DestinationFilter::all();
        assert!(filter.matches(&BusMessage::new("anything", "{}")));
    }

    #[test]
    fn test_filter_by_destination() {
        let filter = DestinationFilter::destination("trainer.workload.reply");

        assert!(filter.matches(&BusMessage::new("trainer.workload.reply", "{}")));
        assert!(!filter.matches(&BusMessage::new("trainer.workload.request", "{}")));
    }

    #[test]
    fn test_builder_headers() {
        let message = BusMessage::new("q", "{}")
            .with_correlation_id("abc")
            .with_authorization("Bearer t")
            .with_message_type("workload.query")
            .with_reply_to("r");

        assert_eq!(message.headers.correlation_id.as_deref(), Some("abc"));
        assert_eq!(message.headers.authorization.as_deref(), Some("Bearer t"));
        assert_eq!(message.headers.message_type.as_deref(), Some("workload.query"));
        assert_eq!(message.headers.reply_to.as_deref(), Some("r"));
    }

    #[test]
    fn test_json_body() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Sample {
            value: u32,
        }

        let message = BusMessage::json("q", &Sample { value: 7 }).unwrap();
        assert_eq!(message.body, r#"{"value":7}"#);
        assert_eq!(message.decode::<Sample>().unwrap(), Sample { value: 7 });
        assert!(BusMessage::new("q", "not json").decode::<Sample>().is_err());
    }

    #[test]
    fn test_message_ids_unique() {
        let a = BusMessage::new("q", "{}");
        let b = BusMessage::new("q", "{}");
        assert_ne!(a.message_id, b.message_id);
    }
}
