//! Wire payloads exchanged with the trainer workload service.
//!
//! JSON field names are camelCase to match what the workload service reads.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::WorkloadError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message type header for workload queries.
pub const QUERY_MESSAGE_TYPE: &str = "workload.query";
/// Message type header for session notifications.
pub const NOTIFICATION_MESSAGE_TYPE: &str = "workload.session";
/// Message type header for dead-lettered replies.
pub const DEAD_LETTER_MESSAGE_TYPE: &str = "workload.reply.malformed";

/// A body that can be published to the workload service.
pub trait OutboundPayload: Serialize + Send + Sync {
    /// Value of the message type header.
    const MESSAGE_TYPE: &'static str;
}

/// Bearer credential, forwarded verbatim and never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Identity and credential of the caller on whose behalf a message is sent.
///
/// Obtained from the session layer; this crate neither mints nor validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub username: String,
    pub token: BearerToken,
}

impl AuthContext {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: BearerToken::new(token),
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token.expose())
    }
}

/// Monthly workload query for one trainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadQuery {
    pub trainer_id: String,
    pub year: i32,
    pub month: u32,
}

impl WorkloadQuery {
    pub fn new(trainer_id: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            trainer_id: trainer_id.into(),
            year,
            month,
        }
    }

    /// Reject queries the workload service could never answer.
    pub fn validate(&self) -> Result<(), WorkloadError> {
        if self.trainer_id.trim().is_empty() {
            return Err(WorkloadError::InvalidQuery("trainer id is empty".into()));
        }
        if !(1..=12).contains(&self.month) {
            return Err(WorkloadError::InvalidQuery(format!(
                "month {} outside 1..=12",
                self.month
            )));
        }
        if self.year <= 0 {
            return Err(WorkloadError::InvalidQuery(format!(
                "year {} is not positive",
                self.year
            )));
        }
        Ok(())
    }
}

impl OutboundPayload for WorkloadQuery {
    const MESSAGE_TYPE: &'static str = QUERY_MESSAGE_TYPE;
}

/// Whether a session was added to or removed from the trainer's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Add,
    Remove,
}

/// Training session change sent to the workload service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSessionNotice {
    pub trainer_username: String,
    pub trainer_first_name: String,
    pub trainer_last_name: String,
    pub is_active: bool,
    pub training_date: NaiveDate,
    /// Duration in minutes.
    pub training_duration: f64,
    pub action_type: ActionType,
}

impl OutboundPayload for TrainingSessionNotice {
    const MESSAGE_TYPE: &'static str = NOTIFICATION_MESSAGE_TYPE;
}

/// What a reply carries for a registered request.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// Total monthly training duration.
    Duration(f64),
    /// The workload service reported an error.
    Rejected(String),
}

/// A message on its way to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEnvelope {
    /// Destination channel name.
    pub destination: String,
    /// Message type header.
    pub message_type: String,
    /// Serialized payload (JSON).
    pub payload: String,
    /// Present only for request/reply.
    pub correlation_id: Option<CorrelationId>,
    /// Where the reply should go; present only for request/reply.
    pub reply_to: Option<String>,
    /// `Authorization` header value of the original caller.
    pub authorization: Option<String>,
}

/// Reply body on the inbound channel.
///
/// Exactly one of `duration_value` and `error` is expected. The correlation
/// id may also travel as a transport header instead of in the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub duration_value: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl InboundEnvelope {
    /// Reply carrying a duration.
    pub fn duration(correlation_id: CorrelationId, value: f64) -> Self {
        Self {
            correlation_id: Some(correlation_id.to_string()),
            duration_value: Some(value),
            error: None,
        }
    }

    /// Reply carrying an error indicator.
    pub fn rejected(correlation_id: CorrelationId, error: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.to_string()),
            duration_value: None,
            error: Some(error.into()),
        }
    }

    /// Extract the outcome, or describe why the envelope is malformed.
    pub fn outcome(&self) -> Result<ReplyOutcome, String> {
        match (self.duration_value, &self.error) {
            (Some(_), Some(_)) => Err("both durationValue and error present".into()),
            (Some(value), None) if value.is_finite() && value >= 0.0 => {
                Ok(ReplyOutcome::Duration(value))
            }
            (Some(value), None) => Err(format!("invalid durationValue {value}")),
            (None, Some(error)) => Ok(ReplyOutcome::Rejected(error.clone())),
            (None, None) => Err("neither durationValue nor error present".into()),
        }
    }
}
