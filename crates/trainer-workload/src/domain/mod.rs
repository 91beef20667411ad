//! Domain layer: identifiers, payloads, the correlation registry and the
//! circuit breaker. Nothing here touches the bus directly.

pub mod circuit_breaker;
pub mod config;
pub mod correlation;
pub mod error;
pub(crate) mod humantime_serde;
pub mod payloads;
pub mod registry;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats,
};
pub use config::{ConfigError, DestinationsConfig, WorkloadConfig};
pub use correlation::CorrelationId;
pub use error::{RegistryError, TransportError, WorkloadError};
pub use payloads::{
    ActionType, AuthContext, BearerToken, InboundEnvelope, OutboundEnvelope, OutboundPayload,
    ReplyOutcome, TrainingSessionNotice, WorkloadQuery, DEAD_LETTER_MESSAGE_TYPE,
    NOTIFICATION_MESSAGE_TYPE, QUERY_MESSAGE_TYPE,
};
pub use registry::{CorrelationRegistry, RegistryStats};
