//! # Trainer Workload Bridge
//!
//! Synchronous-looking access to the trainer workload service, which is only
//! reachable through an asynchronous message channel.
//!
//! ## Operations
//!
//! | Operation | Kind | Entry point |
//! |-----------|------|-------------|
//! | Monthly training duration | request/reply | [`FailureGuard::get_monthly_duration`] |
//! | Training session added/removed | fire-and-forget | [`FailureGuard::notify_session`] |
//!
//! ## Request/Reply Flow
//!
//! ```text
//! caller ─→ FailureGuard ─→ WorkloadClient ─register─→ CorrelationRegistry
//!                               │                            ↑
//!                               └─→ RequestPublisher ─→ bus  │ resolve
//!                                                        │   │
//!                                   downstream service ←─┘   │
//!                                          │                 │
//!                                          └─→ bus ─→ ResponseSubscriber
//! ```
//!
//! The waiter owns its registry entry: it registers before publishing and
//! releases on every exit path (success, timeout, error, cancellation).
//! The subscriber only ever fulfils slots, so a reply that arrives after
//! the waiter gave up finds nothing and is dropped.
//!
//! ## Module Structure
//!
//! ```text
//! domain/   - CorrelationId, CorrelationRegistry, CircuitBreaker, payloads, config, errors
//! ports/    - MessageTransport, ReplyReceiver, Clock
//! adapters/ - RequestPublisher, ResponseSubscriber, bus-backed transport
//! service/  - WorkloadClient, NotificationClient, FailureGuard
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{
    BusReplyReceiver, BusTransport, RecordingTransport, ReplyDisposition, RequestPublisher,
    ResponseSubscriber, SubscriberHandle,
};
pub use domain::{
    ActionType, AuthContext, BearerToken, CallPermit, CircuitBreaker, CircuitBreakerConfig,
    CircuitState, CircuitStats, ConfigError, CorrelationId, CorrelationRegistry,
    DestinationsConfig, InboundEnvelope, OutboundEnvelope, OutboundPayload, RegistryError,
    RegistryStats, ReplyOutcome, TrainingSessionNotice, TransportError, WorkloadConfig,
    WorkloadError, WorkloadQuery,
};
pub use ports::{
    Clock, InboundMessage, ManualClock, MessageTransport, ReceiveError, ReplyReceiver, SystemClock,
};
pub use service::{FailureGuard, NotificationClient, NotificationOutcome, WorkloadClient};
