//! Correlation Registry - async-to-sync bridge for workload replies.
//!
//! Maps correlation IDs to single-assignment result slots.
//!
//! Flow:
//! 1. WorkloadClient generates a CorrelationId and calls `register()`
//! 2. WorkloadClient publishes the request carrying that id
//! 3. ResponseSubscriber receives the reply and calls `resolve()`
//! 4. WorkloadClient awaits the receiver (bounded) and calls `release()`
//!
//! Only the waiter removes entries. `resolve()` fills a slot but leaves the
//! entry in place, so "removed after timeout" and "about to be fulfilled"
//! can never race into a double wake-up or a stale value.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::RegistryError;
use crate::domain::payloads::ReplyOutcome;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gym_telemetry::{ORPHAN_REPLIES, PENDING_CORRELATIONS};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Registered entry awaiting a reply.
struct Slot {
    /// Taken on first fulfilment; `None` afterwards.
    sender: Option<oneshot::Sender<ReplyOutcome>>,
    /// When the entry was registered
    registered_at: Instant,
}

/// Counters for registry activity.
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Total entries registered
    pub total_registered: AtomicU64,
    /// Total slots fulfilled
    pub total_resolved: AtomicU64,
    /// Replies with no registered entry
    pub total_orphaned: AtomicU64,
    /// Replies for an entry whose slot was already filled
    pub total_duplicates: AtomicU64,
    /// Total entries removed
    pub total_released: AtomicU64,
}

/// Concurrent store of correlation id to result slot.
///
/// All synchronization is internal; callers never hold a lock.
#[derive(Default)]
pub struct CorrelationRegistry {
    slots: DashMap<CorrelationId, Slot>,
    stats: RegistryStats,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty slot for `id` and return its receiving end.
    ///
    /// The entry is fully constructed before it becomes visible to `resolve`.
    pub fn register(
        &self,
        id: CorrelationId,
    ) -> Result<oneshot::Receiver<ReplyOutcome>, RegistryError> {
        match self.slots.entry(id) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateCorrelation(id)),
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel();
                vacant.insert(Slot {
                    sender: Some(tx),
                    registered_at: Instant::now(),
                });
                self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
                PENDING_CORRELATIONS.inc();
                debug!(correlation_id = %id, "Registered correlation entry");
                Ok(rx)
            }
        }
    }

    /// Fill the slot for `id` with `outcome`.
    ///
    /// Returns true only if this call performed the single assignment.
    /// Returns false for orphans (no entry), duplicates (slot already
    /// filled) and waiters that went away between lookup and send.
    pub fn resolve(&self, id: CorrelationId, outcome: ReplyOutcome) -> bool {
        let (sender, waited) = {
            let Some(mut slot) = self.slots.get_mut(&id) else {
                self.stats.total_orphaned.fetch_add(1, Ordering::Relaxed);
                ORPHAN_REPLIES.inc();
                warn!(
                    correlation_id = %id,
                    "Reply for unknown or expired correlation id, dropping"
                );
                return false;
            };
            let Some(sender) = slot.sender.take() else {
                self.stats.total_duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %id, "Duplicate reply for fulfilled slot, dropping");
                return false;
            };
            (sender, slot.registered_at.elapsed())
        };

        match sender.send(outcome) {
            Ok(()) => {
                self.stats.total_resolved.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %id,
                    waited_ms = waited.as_millis(),
                    "Resolved correlation entry"
                );
                true
            }
            Err(_) => {
                // Waiter dropped its receiver and is about to release
                debug!(correlation_id = %id, "Waiter gone before reply delivered");
                false
            }
        }
    }

    /// Remove the entry for `id`. Idempotent.
    ///
    /// Returns true if an entry was removed by this call.
    pub fn release(&self, id: CorrelationId) -> bool {
        if self.slots.remove(&id).is_some() {
            self.stats.total_released.fetch_add(1, Ordering::Relaxed);
            PENDING_CORRELATIONS.dec();
            debug!(correlation_id = %id, "Released correlation entry");
            true
        } else {
            false
        }
    }

    /// Number of entries currently registered
    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    /// Check if a correlation ID is registered
    pub fn is_pending(&self, id: &CorrelationId) -> bool {
        self.slots.contains_key(id)
    }

    /// Get statistics
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_register_resolve_release() {
        let registry = CorrelationRegistry::new();
        let id = CorrelationId::new();

        let rx = registry.register(id).unwrap();
        assert!(registry.is_pending(&id));
        assert_eq!(registry.pending_count(), 1);

        assert!(registry.resolve(id, ReplyOutcome::Duration(12.5)));
        assert_eq!(rx.await.unwrap(), ReplyOutcome::Duration(12.5));

        // Resolve leaves the entry for the waiter to remove
        assert!(registry.is_pending(&id));
        assert!(registry.release(id));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = CorrelationRegistry::new();
        let id = CorrelationId::new();

        let _rx = registry.register(id).unwrap();
        assert_eq!(
            registry.register(id).unwrap_err(),
            RegistryError::DuplicateCorrelation(id)
        );
        assert_eq!(registry.pending_count(), 1);
    }

    #[test]
    fn test_resolve_unknown_id_is_orphan() {
        let registry = CorrelationRegistry::new();

        assert!(!registry.resolve(CorrelationId::new(), ReplyOutcome::Duration(1.0)));
        assert_eq!(registry.stats().total_orphaned.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_resolve_after_release_is_orphan() {
        let registry = CorrelationRegistry::new();
        let id = CorrelationId::new();

        let _rx = registry.register(id).unwrap();
        registry.release(id);

        assert!(!registry.resolve(id, ReplyOutcome::Duration(12.5)));
        assert_eq!(registry.stats().total_orphaned.load(Ordering::Relaxed), 1);
        assert_eq!(registry.stats().total_resolved.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_second_resolve_is_rejected() {
        let registry = CorrelationRegistry::new();
        let id = CorrelationId::new();

        let rx = registry.register(id).unwrap();
        assert!(registry.resolve(id, ReplyOutcome::Duration(1.0)));
        assert!(!registry.resolve(id, ReplyOutcome::Duration(2.0)));

        assert_eq!(rx.await.unwrap(), ReplyOutcome::Duration(1.0));
        assert_eq!(registry.stats().total_duplicates.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = CorrelationRegistry::new();
        let id = CorrelationId::new();

        let _rx = registry.register(id).unwrap();
        assert!(registry.release(id));
        assert!(!registry.release(id));
        assert!(!registry.release(CorrelationId::new()));
        assert_eq!(registry.stats().total_released.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_resolve_with_dropped_receiver() {
        let registry = CorrelationRegistry::new();
        let id = CorrelationId::new();

        drop(registry.register(id).unwrap());
        assert!(!registry.resolve(id, ReplyOutcome::Duration(1.0)));
    }

    #[tokio::test]
    async fn test_resolving_one_id_does_not_touch_another() {
        let registry = CorrelationRegistry::new();
        let a = CorrelationId::new();
        let b = CorrelationId::new();

        let rx_a = registry.register(a).unwrap();
        let mut rx_b = registry.register(b).unwrap();

        assert!(registry.resolve(a, ReplyOutcome::Duration(3.0)));
        assert_eq!(rx_a.await.unwrap(), ReplyOutcome::Duration(3.0));
        assert!(rx_b.try_recv().is_err());
        assert!(registry.is_pending(&b));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolvers_assign_once() {
        let registry = Arc::new(CorrelationRegistry::new());
        let id = CorrelationId::new();
        let rx = registry.register(id).unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.resolve(id, ReplyOutcome::Duration(f64::from(i)))
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert!(matches!(rx.await.unwrap(), ReplyOutcome::Duration(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_release() {
        let registry = Arc::new(CorrelationRegistry::new());

        let mut handles = Vec::new();
        for _ in 0..64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let id = CorrelationId::new();
                let rx = registry.register(id).unwrap();
                assert!(registry.resolve(id, ReplyOutcome::Duration(1.0)));
                let value = rx.await.unwrap();
                assert!(registry.release(id));
                value
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), ReplyOutcome::Duration(1.0));
        }
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.stats().total_registered.load(Ordering::Relaxed), 64);
        assert_eq!(registry.stats().total_released.load(Ordering::Relaxed), 64);
    }
}
