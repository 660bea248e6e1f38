//! Capability traits for the measured service and the host
//!
//! These traits are defined in core so the orchestrator stays
//! backend-agnostic. Implementations live in `vecbench-backends`; tests use
//! in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ResourceLimits, RunConfig, StorageOptions, VectorEncoding, SERVICE_PORT};
use crate::error::BenchError;
use crate::workload::{QueryVector, VectorBatch};

// ============================================================================
// Service Client Trait
// ============================================================================

/// Client for the measured vector service
///
/// Covers the opaque capability set {create, configure, upload, search,
/// delete, stats}. Wire format is owned by the implementation.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Service identifier for logs (e.g. "qdrant")
    fn service_name(&self) -> &str;

    /// Whether a collection exists
    async fn collection_exists(&self, name: &str) -> Result<bool, ServiceError>;

    /// Create a collection
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), ServiceError>;

    /// Delete a collection
    async fn delete_collection(&self, name: &str) -> Result<(), ServiceError>;

    /// Update background indexing parameters
    async fn configure_indexing(
        &self,
        collection: &str,
        params: &IndexingParams,
    ) -> Result<(), ServiceError>;

    /// Upload one batch and wait for it to be applied
    async fn upload(&self, collection: &str, batch: &VectorBatch) -> Result<(), ServiceError>;

    /// Nearest-neighbour search, returns the number of hits
    async fn search(
        &self,
        collection: &str,
        vector: &QueryVector,
        limit: usize,
    ) -> Result<usize, ServiceError>;

    /// Collection statistics
    async fn collection_stats(&self, collection: &str) -> Result<CollectionStats, ServiceError>;
}

/// Collection creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection name
    pub name: String,
    /// Vector dimensionality
    pub vector_size: usize,
    /// Element encoding
    pub encoding: VectorEncoding,
    /// On-disk toggles
    pub storage: StorageOptions,
}

impl CollectionSpec {
    /// Derive the collection parameters from the run configuration
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            name: config.collection.clone(),
            vector_size: config.workload.vector_size,
            encoding: config.workload.encoding,
            storage: config.storage,
        }
    }
}

/// Background index parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingParams {
    /// HNSW graph degree; zero disables index building
    pub hnsw_m: usize,
    /// HNSW construction beam width
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ef_construct: Option<usize>,
}

impl IndexingParams {
    /// HNSW degree restored after a deferred load
    pub const RESTORED_M: usize = 16;

    /// Construction beam width restored after a deferred load
    pub const RESTORED_EF_CONSTRUCT: usize = 100;

    /// Parameters that suspend index building during bulk load
    ///
    /// Only touches settings that [`IndexingParams::restored`] sets again,
    /// so a restored collection carries no load-time configuration.
    pub fn deferred() -> Self {
        Self {
            hnsw_m: 0,
            ef_construct: None,
        }
    }

    /// Parameters that re-enable index building
    pub fn restored() -> Self {
        Self {
            hnsw_m: Self::RESTORED_M,
            ef_construct: Some(Self::RESTORED_EF_CONSTRUCT),
        }
    }

    /// Whether these parameters disable indexing
    pub fn is_disabled(&self) -> bool {
        self.hnsw_m == 0
    }
}

/// Collection statistics reported by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Stored points
    pub points_count: u64,
    /// Vectors covered by the index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_vectors_count: Option<u64>,
    /// Service-reported collection status
    pub status: String,
}

/// Errors from the measured service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Could not connect
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request exceeded its timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status
    #[error("service returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Collection or resource missing
    #[error("not found: {0}")]
    NotFound(String),

    /// Response body could not be decoded
    #[error("invalid response: {0}")]
    Decode(String),

    /// Any other request failure
    #[error("request failed: {0}")]
    Request(String),
}

impl ServiceError {
    /// Whether the failure happened before reaching the service
    pub fn is_connection(&self) -> bool {
        matches!(self, ServiceError::Connection(_))
    }
}

// ============================================================================
// Health Probe Trait
// ============================================================================

/// Result of a single readiness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The service answered with success
    Ready,
    /// The service answered but is not ready yet
    NotReady(String),
    /// The service could not be reached
    ConnectionFailed(String),
    /// Any other probe failure
    Error(String),
}

/// Lightweight health check against a freshly provisioned service
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Endpoint being probed, for logs
    fn endpoint(&self) -> &str;

    /// Issue one probe
    async fn probe(&self) -> ProbeOutcome;
}

// ============================================================================
// Container Backend Trait
// ============================================================================

/// Parameters for provisioning the service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionSpec {
    /// Instance name
    pub name: String,
    /// Image to run
    pub image: String,
    /// Resource limits
    pub resources: ResourceLimits,
    /// Host port
    pub host_port: u16,
    /// Port inside the instance
    pub service_port: u16,
    /// Host the port is reachable on
    pub host: String,
}

impl ProvisionSpec {
    /// Derive provisioning parameters from the run configuration
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            name: config.container_name.clone(),
            image: config.image.clone(),
            resources: config.resources.clone(),
            host_port: config.port,
            service_port: SERVICE_PORT,
            host: config.host.clone(),
        }
    }
}

/// Identifies the provisioned instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHandle {
    /// Instance name
    pub name: String,
    /// Engine-assigned identifier
    pub id: String,
    /// Host the service is reachable on
    pub host: String,
    /// Host port
    pub port: u16,
}

/// Inspection result for an instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Engine status string (e.g. "running", "exited")
    pub status: String,
    /// Whether the instance is running
    pub running: bool,
    /// Whether the engine killed the instance for exceeding its memory limit
    pub oom_killed: bool,
    /// Exit code, if exited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
}

/// Point-in-time resource usage of the instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    /// CPU percentage
    #[serde(rename = "CPU")]
    pub cpu: String,
    /// Memory usage / limit
    #[serde(rename = "Memory")]
    pub memory: String,
    /// Block IO read / write
    #[serde(rename = "Disk")]
    pub disk_io: String,
    /// Network IO received / sent
    #[serde(rename = "Network")]
    pub network_io: String,
}

/// Non-fatal cleanup problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownWarning {
    /// Nothing to act on (already stopped or removed)
    NotFound {
        /// Cleanup step, e.g. "stop"
        action: &'static str,
    },
    /// The cleanup command failed
    Failed {
        /// Cleanup step, e.g. "remove"
        action: &'static str,
        /// Failure description
        message: String,
    },
}

impl std::fmt::Display for TeardownWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownWarning::NotFound { action } => write!(f, "no container to {action}"),
            TeardownWarning::Failed { action, message } => {
                write!(f, "failed to {action} container: {message}")
            }
        }
    }
}

/// Provisions and controls the isolated service instance
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Backend identifier (e.g. "docker")
    fn backend_name(&self) -> &str;

    /// Start the instance
    async fn provision(&self, spec: &ProvisionSpec) -> Result<ServiceHandle, BenchError>;

    /// Stop and remove the instance
    ///
    /// Never fails; problems are returned as warnings. Safe to call when the
    /// instance does not exist.
    async fn teardown(&self, name: &str) -> Vec<TeardownWarning>;

    /// Inspect the instance state
    async fn inspect(&self, name: &str) -> Result<ContainerStatus, BenchError>;

    /// Current resource usage
    async fn stats(&self, name: &str) -> Result<ContainerStats, BenchError>;

    /// Filesystem usage inside the instance
    async fn disk_usage(&self, name: &str) -> Result<String, BenchError>;
}

// ============================================================================
// GPU Monitor Trait
// ============================================================================

/// One GPU as reported by `nvidia-smi`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDevice {
    /// Position in the tool's output
    pub index: usize,
    /// Utilisation in percent
    pub utilization_percent: f64,
    /// Used memory in MB
    pub memory_used_mb: f64,
    /// Total memory in MB
    pub memory_total_mb: f64,
}

impl std::fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GPU {} Utilization: {}%, Memory: {}/{} MB",
            self.index, self.utilization_percent, self.memory_used_mb, self.memory_total_mb
        )
    }
}

/// GPU utilisation at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum GpuSnapshot {
    /// Parsed `nvidia-smi` query, one entry per GPU
    Nvidia {
        /// Per-device readings
        devices: Vec<GpuDevice>,
    },
    /// Unparsed output of another tool
    Raw {
        /// Tool name
        tool: String,
        /// Trimmed output
        output: String,
    },
    /// No GPU tool available
    Unavailable,
}

impl std::fmt::Display for GpuSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuSnapshot::Nvidia { devices } => {
                for (i, device) in devices.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{device}")?;
                }
                Ok(())
            }
            GpuSnapshot::Raw { output, .. } => f.write_str(output),
            GpuSnapshot::Unavailable => f.write_str("GPU stats not available"),
        }
    }
}

/// Source of GPU statistics
#[async_trait]
pub trait GpuMonitor: Send + Sync {
    /// Take a snapshot; returns [`GpuSnapshot::Unavailable`] when no GPU tool works
    async fn snapshot(&self) -> GpuSnapshot;
}
