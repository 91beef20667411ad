//! In-memory transport that records what would have been sent.
//!
//! Used by unit tests and by anyone wiring the bridge without a bus.

use crate::domain::{OutboundEnvelope, TransportError};
use crate::ports::MessageTransport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Recording transport that can be switched to fail.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundEnvelope>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send fails with `TransportError::Unreachable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of everything sent so far.
    pub fn sent(&self) -> Vec<OutboundEnvelope> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Most recently sent envelope.
    pub fn last(&self) -> Option<OutboundEnvelope> {
        self.sent.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, envelope: OutboundEnvelope) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable(format!(
                "recording transport set to fail ({})",
                envelope.destination
            )));
        }
        self.sent.lock().push(envelope);
        Ok(())
    }
}
