//! Run configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default container image for the measured service
pub const DEFAULT_IMAGE: &str = "qdrant/qdrant";

/// Default container name
pub const DEFAULT_CONTAINER_NAME: &str = "qdrant_benchmark";

/// Default collection name
pub const DEFAULT_COLLECTION: &str = "benchmark_collection";

/// Port the service listens on inside the container
pub const SERVICE_PORT: u16 = 6333;

/// Element encoding of generated vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VectorEncoding {
    /// 32-bit floats, uniform in `[0, 1)`
    #[default]
    #[serde(rename = "FP32")]
    Float32,
    /// Unsigned bytes, uniform in `0..=255`
    #[serde(rename = "UINT8")]
    Uint8,
}

impl VectorEncoding {
    /// Bytes per vector element
    pub fn element_size(&self) -> usize {
        match self {
            VectorEncoding::Float32 => 4,
            VectorEncoding::Uint8 => 1,
        }
    }

    /// Datatype name understood by the service
    pub fn service_datatype(&self) -> &'static str {
        match self {
            VectorEncoding::Float32 => "float32",
            VectorEncoding::Uint8 => "uint8",
        }
    }
}

impl std::fmt::Display for VectorEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorEncoding::Float32 => f.write_str("FP32"),
            VectorEncoding::Uint8 => f.write_str("UINT8"),
        }
    }
}

impl std::str::FromStr for VectorEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FP32" | "FLOAT32" => Ok(VectorEncoding::Float32),
            "UINT8" | "U8" => Ok(VectorEncoding::Uint8),
            _ => Err(format!("unsupported data type: {s} (expected FP32 or UINT8)")),
        }
    }
}

/// Resource limits applied to the service container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Number of CPUs
    pub cpus: u32,

    /// Memory limit in GB
    pub memory_gb: u32,

    /// Size of the tmpfs storage mount in GB
    pub storage_gb: u32,

    /// NUMA memory nodes to pin to (e.g. "0,1")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numa_nodes: Option<String>,

    /// CPU set to pin to (e.g. "0-3")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_set: Option<String>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpus: 1,
            memory_gb: 4,
            storage_gb: 10,
            numa_nodes: None,
            cpu_set: None,
        }
    }
}

/// Parameters of the synthetic workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Vector dimensionality
    pub vector_size: usize,

    /// Number of vectors to insert
    pub num_vectors: usize,

    /// Element encoding
    pub encoding: VectorEncoding,

    /// Vectors per upload batch
    pub batch_size: usize,

    /// Number of queries in the measurement phase
    pub num_queries: usize,

    /// Nearest neighbours requested per query
    pub search_limit: usize,

    /// RNG seed for reproducible data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            vector_size: 384,
            num_vectors: 1_000_000,
            encoding: VectorEncoding::Float32,
            batch_size: 1000,
            num_queries: 1000,
            search_limit: 10,
            seed: None,
        }
    }
}

/// On-disk storage toggles for the collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOptions {
    /// Memory-map vectors from disk
    pub vectors_on_disk: bool,
    /// Keep the HNSW index on disk
    pub hnsw_on_disk: bool,
    /// Keep payloads on disk
    pub payload_on_disk: bool,
}

/// Readiness probing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Give up after this long
    pub timeout: Duration,
    /// Delay between probes
    pub interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(1),
        }
    }
}

/// Complete configuration of one benchmark run
///
/// Built once from user input and read-only for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Container resource limits
    pub resources: ResourceLimits,

    /// Host port mapped to the service port
    pub port: u16,

    /// Host the service is reached on
    pub host: String,

    /// Container image
    pub image: String,

    /// Container name
    pub container_name: String,

    /// Collection the workload writes to
    pub collection: String,

    /// Workload parameters
    pub workload: WorkloadConfig,

    /// On-disk storage toggles
    pub storage: StorageOptions,

    /// Disable background indexing during the load phase
    pub defer_indexing: bool,

    /// Readiness probing
    pub readiness: ReadinessConfig,

    /// Timeout applied to each request against the service
    pub request_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            resources: ResourceLimits::default(),
            port: SERVICE_PORT,
            host: "localhost".to_string(),
            image: DEFAULT_IMAGE.to_string(),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            workload: WorkloadConfig::default(),
            storage: StorageOptions::default(),
            defer_indexing: false,
            readiness: ReadinessConfig::default(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl RunConfig {
    /// Set the resource limits
    pub fn with_resources(mut self, resources: ResourceLimits) -> Self {
        self.resources = resources;
        self
    }

    /// Set the host port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the workload parameters
    pub fn with_workload(mut self, workload: WorkloadConfig) -> Self {
        self.workload = workload;
        self
    }

    /// Set the storage toggles
    pub fn with_storage(mut self, storage: StorageOptions) -> Self {
        self.storage = storage;
        self
    }

    /// Enable or disable index deferral
    pub fn with_defer_indexing(mut self, defer: bool) -> Self {
        self.defer_indexing = defer;
        self
    }

    /// Set readiness parameters
    pub fn with_readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.readiness = readiness;
        self
    }

    /// Base URL of the service
    pub fn service_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workload.num_vectors == 0 {
            return Err(ConfigError::InvalidWorkload(
                "the number of vectors must be greater than 0".into(),
            ));
        }
        if self.workload.vector_size == 0 {
            return Err(ConfigError::InvalidWorkload(
                "vector size must be at least 1".into(),
            ));
        }
        if self.workload.batch_size == 0 {
            return Err(ConfigError::InvalidWorkload(
                "batch size must be at least 1".into(),
            ));
        }
        if self.workload.search_limit == 0 {
            return Err(ConfigError::InvalidWorkload(
                "search limit must be at least 1".into(),
            ));
        }
        if self.resources.cpus == 0 || self.resources.memory_gb == 0 {
            return Err(ConfigError::InvalidResources(
                "cpus and memory must be at least 1".into(),
            ));
        }
        if self.resources.storage_gb == 0 {
            return Err(ConfigError::InvalidResources(
                "storage must be at least 1 GB".into(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.readiness.interval.is_zero() {
            return Err(ConfigError::InvalidReadiness(
                "probe interval must be positive".into(),
            ));
        }
        if self.container_name.trim().is_empty() || self.collection.trim().is_empty() {
            return Err(ConfigError::InvalidName);
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid workload parameter
    #[error("Invalid workload: {0}")]
    InvalidWorkload(String),

    /// Invalid resource limit
    #[error("Invalid resources: {0}")]
    InvalidResources(String),

    /// Port zero
    #[error("Invalid port: must be between 1 and 65535")]
    InvalidPort,

    /// Invalid readiness parameter
    #[error("Invalid readiness settings: {0}")]
    InvalidReadiness(String),

    /// Empty container or collection name
    #[error("Invalid name: container and collection names must not be empty")]
    InvalidName,
}
