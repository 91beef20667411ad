//! # Shared Bus - Message Bus for Service-to-Service Communication
//!
//! Carries messages between the gym backend and the trainer workload service.
//! Every message is addressed to a named destination (a queue name in broker
//! terms) and carries headers for correlation and authorization.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Service A  │                    │   Service B  │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Message Bus │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Delivery
//!
//! - At-least-once from the producer's point of view; consumers must tolerate
//!   duplicates and reordering.
//! - A message published while nobody listens on its destination is dropped.
//! - A closed bus rejects further publishes with [`BusError::Closed`];
//!   subscriptions drain their buffer and then end.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod message;
pub mod publisher;
pub mod subscriber;

pub use message::{BusMessage, DestinationFilter, MessageHeaders};
pub use publisher::{BusError, InMemoryMessageBus, MessagePublisher};
pub use subscriber::Subscription;

/// Messages buffered per subscription before the slowest one starts losing
/// the oldest.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
