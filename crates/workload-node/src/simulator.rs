//! In-process stand-in for the trainer workload service.
//!
//! Consumes session notifications, keeps a running total of training
//! minutes per trainer and month, and answers workload queries on the
//! `reply_to` destination of each request.

use chrono::Datelike;
use dashmap::DashMap;
use shared_bus::{
    BusMessage, DestinationFilter, InMemoryMessageBus, MessagePublisher, Subscription,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use trainer_workload::domain::{NOTIFICATION_MESSAGE_TYPE, QUERY_MESSAGE_TYPE};
use trainer_workload::{
    ActionType, DestinationsConfig, InboundEnvelope, TrainingSessionNotice, WorkloadQuery,
};
use tracing::{debug, info, warn};

/// Trainer username, year, month
type MonthKey = (String, i32, u32);

/// Simulated workload service.
pub struct WorkloadSimulator {
    bus: Arc<InMemoryMessageBus>,
    destinations: DestinationsConfig,
    totals: DashMap<MonthKey, f64>,
}

impl WorkloadSimulator {
    pub fn new(bus: Arc<InMemoryMessageBus>, destinations: DestinationsConfig) -> Self {
        Self {
            bus,
            destinations,
            totals: DashMap::new(),
        }
    }

    /// Subscribe now and process messages on a task until `shutdown`.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let subscription = self.bus.subscribe(DestinationFilter::destinations(vec![
            self.destinations.request.clone(),
            self.destinations.notification.clone(),
        ]));
        tokio::spawn(self.run(subscription, shutdown))
    }

    async fn run(
        self: Arc<Self>,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Workload simulator started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Workload simulator shutting down");
                        break;
                    }
                }
                message = subscription.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
            }
        }
    }

    async fn handle(&self, message: BusMessage) {
        match message.headers.message_type.as_deref() {
            Some(NOTIFICATION_MESSAGE_TYPE) => match message.decode::<TrainingSessionNotice>() {
                Ok(notice) => self.apply_notice(&notice),
                Err(e) => warn!(error = %e, "Simulator ignoring undecodable notification"),
            },
            Some(QUERY_MESSAGE_TYPE) => self.answer(&message).await,
            other => debug!(message_type = ?other, "Simulator ignoring message"),
        }
    }

    /// Add or remove a session's minutes from its month.
    pub fn apply_notice(&self, notice: &TrainingSessionNotice) {
        let date = notice.training_date;
        let key = (notice.trainer_username.clone(), date.year(), date.month());
        let mut total = self.totals.entry(key).or_insert(0.0);
        match notice.action_type {
            ActionType::Add => *total += notice.training_duration,
            ActionType::Remove => *total = (*total - notice.training_duration).max(0.0),
        }
        debug!(
            trainer_username = %notice.trainer_username,
            total = *total,
            "Simulator applied training session"
        );
    }

    /// Recorded minutes for a trainer's month, zero if nothing was recorded.
    pub fn monthly_total(&self, query: &WorkloadQuery) -> f64 {
        self.totals
            .get(&(query.trainer_id.clone(), query.year, query.month))
            .map(|total| *total)
            .unwrap_or(0.0)
    }

    async fn answer(&self, message: &BusMessage) {
        let (Some(correlation_id), Some(reply_to)) = (
            message.headers.correlation_id.clone(),
            message.headers.reply_to.clone(),
        ) else {
            warn!("Simulator received a query without correlation id or reply_to");
            return;
        };

        let reply = match message.decode::<WorkloadQuery>() {
            Ok(query) => InboundEnvelope {
                correlation_id: Some(correlation_id),
                duration_value: Some(self.monthly_total(&query)),
                error: None,
            },
            Err(e) => InboundEnvelope {
                correlation_id: Some(correlation_id),
                duration_value: None,
                error: Some(format!("invalid workload query: {e}")),
            },
        };

        let published = match BusMessage::json(reply_to, &reply) {
            Ok(reply) => self
                .bus
                .publish(reply)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = published {
            warn!(error = %e, "Simulator failed to publish reply");
        }
    }
}
