//! Notification client: fire-and-forget session updates.

use crate::adapters::RequestPublisher;
use crate::domain::{AuthContext, TrainingSessionNotice, TransportError};
use tracing::debug;

/// Tells the workload service that a training session was added or removed.
///
/// Returns as soon as the transport accepted the message; there is no reply
/// and no confirmation that the service processed it.
pub struct NotificationClient {
    publisher: RequestPublisher,
    destination: String,
}

impl NotificationClient {
    pub fn new(publisher: RequestPublisher, destination: impl Into<String>) -> Self {
        Self {
            publisher,
            destination: destination.into(),
        }
    }

    pub async fn notify(
        &self,
        notice: &TrainingSessionNotice,
        auth: &AuthContext,
    ) -> Result<(), TransportError> {
        self.publisher
            .publish(&self.destination, notice, None, auth)
            .await?;
        debug!(
            trainer_username = %notice.trainer_username,
            action_type = ?notice.action_type,
            training_date = %notice.training_date,
            "Training session notification published"
        );
        Ok(())
    }
}
