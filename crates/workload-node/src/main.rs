//! Workload node entry point.
//!
//! Starts the bridge with a simulated workload service, exercises both
//! operations once, then runs until Ctrl+C.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use gym_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{info, warn};
use trainer_workload::{
    ActionType, AuthContext, TrainingSessionNotice, WorkloadConfig, WorkloadQuery,
};
use workload_node::WorkloadNode;

/// Path to an optional TOML configuration file
const CONFIG_PATH_ENV: &str = "GYM_WORKLOAD_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = init_telemetry(TelemetryConfig::for_component("workload-node"))
        .context("failed to initialize telemetry")?;

    let config = load_config()?;
    let node = WorkloadNode::start(&config, true);

    run_smoke_check(&node).await;

    info!("Workload node running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    node.shutdown().await;

    match telemetry.metrics().render() {
        Ok(text) => info!(metrics = %text, "Final metrics"),
        Err(e) => warn!(error = %e, "Failed to render metrics"),
    }
    Ok(())
}

fn load_config() -> Result<WorkloadConfig> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read configuration file {path}"))?;
            WorkloadConfig::from_toml_str(&raw)
                .with_context(|| format!("invalid configuration file {path}"))
        }
        Err(_) => WorkloadConfig::from_env().context("invalid GYM_WORKLOAD_* environment"),
    }
}

/// Publish one session and ask for the month it falls in.
async fn run_smoke_check(node: &WorkloadNode) {
    let guard = node.guard();
    let auth = AuthContext::new("workload-node", "local-dev-token");

    let Some(training_date) = NaiveDate::from_ymd_opt(2024, 3, 15) else {
        return;
    };
    let notice = TrainingSessionNotice {
        trainer_username: "T1".into(),
        trainer_first_name: "Tess".into(),
        trainer_last_name: "Trainer".into(),
        is_active: true,
        training_date,
        training_duration: 12.5,
        action_type: ActionType::Add,
    };
    let outcome = guard.notify_session(&notice, &auth).await;
    info!(?outcome, "Smoke check notification");

    match guard
        .get_monthly_duration(&WorkloadQuery::new("T1", 2024, 3), &auth)
        .await
    {
        Ok(duration) => info!(duration, "Smoke check workload query answered"),
        Err(e) => warn!(error = %e, status = e.status_code(), "Smoke check workload query failed"),
    }
}
