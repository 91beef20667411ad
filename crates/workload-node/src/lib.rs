//! # Workload Node
//!
//! Hosts the trainer workload bridge in one process.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logging + metrics)
//! 2. Load configuration (TOML file or `GYM_WORKLOAD_*` environment)
//! 3. Create the message bus and correlation registry
//! 4. Start the response subscriber (and the simulated workload service)
//! 5. Serve workload operations through the `FailureGuard`
//!
//! ## Modules
//!
//! - `runtime/` - Wiring and lifecycle of the bridge
//! - `simulator/` - In-process stand-in for the workload service

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod runtime;
pub mod simulator;

pub use runtime::WorkloadNode;
pub use simulator::WorkloadSimulator;
