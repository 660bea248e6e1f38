//! Concrete backends for vecbench
//!
//! This crate provides implementations of the `vecbench-core` capability
//! traits for:
//!
//! - Docker (container provisioning, stats, teardown)
//! - Qdrant (REST client and readiness probe)
//! - GPU statistics via `nvidia-smi` / `nvtop`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod docker;
pub mod gpu;
pub mod http;
pub mod qdrant;

pub use docker::DockerBackend;
pub use gpu::CommandGpuMonitor;
pub use http::HttpConfig;
pub use qdrant::{HttpHealthProbe, QdrantClient};
