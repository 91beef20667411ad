//! Node runtime: owns the bus, the bridge and the background tasks.

use crate::simulator::WorkloadSimulator;
use shared_bus::InMemoryMessageBus;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use trainer_workload::{
    BusReplyReceiver, BusTransport, CorrelationRegistry, FailureGuard, MessageTransport,
    ResponseSubscriber, SubscriberHandle, SystemClock, WorkloadConfig,
};

/// Everything the process runs.
pub struct WorkloadNode {
    bus: Arc<InMemoryMessageBus>,
    registry: Arc<CorrelationRegistry>,
    guard: Arc<FailureGuard>,
    subscriber: SubscriberHandle,
    simulator: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkloadNode {
    /// Wire the bridge onto a fresh bus and start the reply listener.
    ///
    /// With `simulate` set, a simulated workload service is started too.
    /// Must be called inside a tokio runtime.
    pub fn start(config: &WorkloadConfig, simulate: bool) -> Self {
        info!(
            request = %config.destinations.request,
            reply = %config.destinations.reply,
            notification = %config.destinations.notification,
            reply_timeout_ms = config.reply_timeout.as_millis(),
            "Starting workload node"
        );

        let bus = Arc::new(InMemoryMessageBus::new());
        let registry = Arc::new(CorrelationRegistry::new());
        let transport: Arc<dyn MessageTransport> = Arc::new(BusTransport::new(bus.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let simulator = simulate.then(|| {
            Arc::new(WorkloadSimulator::new(bus.clone(), config.destinations.clone()))
                .spawn(shutdown_rx.clone())
        });

        let receiver = Arc::new(BusReplyReceiver::new(&bus, config.destinations.reply.clone()));
        let mut subscriber = ResponseSubscriber::new(registry.clone(), receiver);
        if let Some(dead_letter) = config.destinations.dead_letter() {
            subscriber = subscriber.with_dead_letter(transport.clone(), dead_letter);
        }
        let subscriber = subscriber.spawn();

        let guard = Arc::new(FailureGuard::from_config(
            config,
            registry.clone(),
            transport,
            Arc::new(SystemClock),
        ));

        Self {
            bus,
            registry,
            guard,
            subscriber,
            simulator,
            shutdown_tx,
        }
    }

    /// Entry point for workload operations.
    pub fn guard(&self) -> Arc<FailureGuard> {
        Arc::clone(&self.guard)
    }

    pub fn bus(&self) -> Arc<InMemoryMessageBus> {
        Arc::clone(&self.bus)
    }

    pub fn registry(&self) -> Arc<CorrelationRegistry> {
        Arc::clone(&self.registry)
    }

    /// Stop the background tasks and close the bus.
    pub async fn shutdown(self) {
        info!("Initiating workload node shutdown...");

        // Fails only if every receiver is already gone
        let _ = self.shutdown_tx.send(true);
        self.subscriber.shutdown().await;
        if let Some(simulator) = self.simulator {
            if let Err(e) = simulator.await {
                error!(error = %e, "Workload simulator task failed");
            }
        }
        self.bus.close();

        info!(
            pending = self.registry.pending_count(),
            "Workload node shutdown complete"
        );
    }
}
