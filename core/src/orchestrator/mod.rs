//! Orchestrator for run lifecycle management
//!
//! The Orchestrator coordinates one benchmark run:
//! - Provisioning the service instance under a lease
//! - Waiting for readiness
//! - Driving the load and measurement phases
//! - Emitting the run report
//! - Tearing the instance down exactly once on every exit path
//!
//! # Example
//!
//! ```ignore
//! use vecbench_core::{OrchestratorBuilder, RunConfig};
//!
//! let orchestrator = OrchestratorBuilder::new()
//!     .config(RunConfig::default())
//!     .backend(backend)
//!     .client(client)
//!     .probe(probe)
//!     .build()?;
//!
//! let outcome = orchestrator.run().await?;
//! ```

mod builder;
mod executor;
mod lease;
mod lifecycle;
mod report;

pub use builder::OrchestratorBuilder;
pub use executor::{Orchestrator, RunOutcome, RunStatus};
pub use lease::{ServiceLease, TeardownReport};
pub use lifecycle::{Lifecycle, LifecyclePhase};
pub use report::{estimate_database_size, format_duration, format_size, ResourceSnapshot, RunReport};

#[cfg(test)]
mod tests;
