//! vecbench-core: Lifecycle orchestration for container-isolated vector benchmarks
//!
//! This crate provides everything the benchmark needs except the concrete
//! container engine and service protocol, including:
//!
//! - Run configuration and validation
//! - Capability traits (ContainerBackend, ServiceClient, HealthProbe, GpuMonitor)
//! - External process execution
//! - Readiness probing, cancellation and interrupt handling
//! - The workload driver and the lifecycle orchestrator
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod readiness;
pub mod traits;
pub mod workload;

pub use cancel::{CancellationFlag, InterruptCoordinator, InterruptState};
pub use config::*;
pub use error::*;
pub use orchestrator::{
    LifecyclePhase, Orchestrator, OrchestratorBuilder, RunOutcome, RunReport, RunStatus,
};
pub use process::{CommandOutput, ProcessError, ProcessRunner, SystemProcessRunner};
pub use readiness::{wait_ready, Readiness};
pub use traits::*;
pub use workload::{
    InsertionSummary, QuerySummary, QueryVector, VectorBatch, VectorData, VectorRow, WorkloadDriver,
};
