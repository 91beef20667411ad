//! Driven ports for the workload bridge.
//!
//! These traits define what the bridge needs from the message channel and
//! from time.

use crate::domain::{OutboundEnvelope, TransportError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Hands outbound envelopes to the message channel.
///
/// Both request/reply queries and fire-and-forget notifications go through
/// this port; the envelope says which kind it is.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Publish one envelope. Success means the channel accepted it, not that
    /// anybody consumed it.
    async fn send(&self, envelope: OutboundEnvelope) -> Result<(), TransportError>;
}

/// A raw message taken off the reply channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Correlation id carried as a transport header, if any
    pub correlation_header: Option<String>,
    /// JSON body
    pub body: String,
}

/// Receive errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    /// The reply channel is shut down; no more messages will arrive.
    #[error("reply channel closed")]
    Closed,
    /// A single receive failed; the channel is still usable.
    #[error("receive failed: {0}")]
    Failed(String),
}

/// Delivers inbound replies to the response subscriber.
#[async_trait]
pub trait ReplyReceiver: Send + Sync {
    async fn receive(&self) -> Result<InboundMessage, ReceiveError>;
}

/// Monotonic time source.
///
/// Abstracted to allow testing breaker cool-downs with deterministic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}
