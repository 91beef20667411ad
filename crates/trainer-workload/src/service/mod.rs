//! Service layer: the operations callers actually invoke.

pub mod guard;
pub mod notification;
pub mod workload;

pub use guard::{FailureGuard, NotificationOutcome};
pub use notification::NotificationClient;
pub use workload::WorkloadClient;
