//! CLI argument parsing

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use vecbench_core::{
    ReadinessConfig, ResourceLimits, RunConfig, StorageOptions, VectorEncoding, WorkloadConfig,
    DEFAULT_COLLECTION, DEFAULT_CONTAINER_NAME, DEFAULT_IMAGE,
};

/// vecbench - Container-isolated vector database benchmark
#[derive(Parser, Debug)]
#[command(name = "vecbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text", env = "VECBENCH_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a benchmark
    Run(RunArgs),
    /// Print the resolved configuration without running
    Validate(RunArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Number of CPUs for the container
    #[arg(long, default_value = "1", env = "VECBENCH_CPUS")]
    pub cpus: u32,

    /// Memory limit in GB
    #[arg(long, default_value = "4", env = "VECBENCH_MEMORY")]
    pub memory: u32,

    /// Size of the tmpfs storage in GB
    #[arg(long, default_value = "10", env = "VECBENCH_STORAGE")]
    pub storage: u32,

    /// Host port mapped to the service
    #[arg(long, default_value = "6333", env = "VECBENCH_PORT")]
    pub port: u16,

    /// NUMA memory nodes to pin the container to (e.g. "0,1")
    #[arg(long, env = "VECBENCH_NUMA_NODES")]
    pub numa_nodes: Option<String>,

    /// CPU set to pin the container to (e.g. "0-3")
    #[arg(long, env = "VECBENCH_CPU_SET")]
    pub cpu_set: Option<String>,

    /// Vector dimensionality
    #[arg(long, default_value = "384", env = "VECBENCH_VECTOR_SIZE")]
    pub vector_size: usize,

    /// Number of vectors to insert
    #[arg(long, default_value = "1000000", env = "VECBENCH_NUM_VECTORS")]
    pub num_vectors: usize,

    /// Vector element type (FP32 or UINT8)
    #[arg(long, default_value = "FP32", env = "VECBENCH_DATA_TYPE")]
    pub data_type: VectorEncoding,

    /// Store vectors on disk
    #[arg(long)]
    pub on_disk: bool,

    /// Store the HNSW index on disk
    #[arg(long)]
    pub hnsw_on_disk: bool,

    /// Store payloads on disk
    #[arg(long)]
    pub on_disk_payload: bool,

    /// Disable indexing while loading and rebuild it afterwards
    #[arg(long)]
    pub disable_hnsw_indexing_for_loading: bool,

    /// Vectors per upload batch
    #[arg(long, default_value = "1000", env = "VECBENCH_BATCH_SIZE")]
    pub batch_size: usize,

    /// Number of search queries to time
    #[arg(long, default_value = "1000", env = "VECBENCH_NUM_QUERIES")]
    pub num_queries: usize,

    /// Seconds to wait for the service to become ready
    #[arg(long, default_value = "60", env = "VECBENCH_READY_TIMEOUT")]
    pub ready_timeout: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "60", env = "VECBENCH_REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    /// Container image
    #[arg(long, default_value = DEFAULT_IMAGE, env = "VECBENCH_IMAGE")]
    pub image: String,

    /// Container name
    #[arg(long, default_value = DEFAULT_CONTAINER_NAME, env = "VECBENCH_CONTAINER_NAME")]
    pub container_name: String,

    /// Collection name
    #[arg(long, default_value = DEFAULT_COLLECTION, env = "VECBENCH_COLLECTION")]
    pub collection: String,

    /// RNG seed for reproducible vectors
    #[arg(long, env = "VECBENCH_SEED")]
    pub seed: Option<u64>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Skip the root privilege check
    #[arg(long, env = "VECBENCH_ALLOW_NON_ROOT")]
    pub allow_non_root: bool,
}

impl RunArgs {
    /// Resolve the arguments into a run configuration
    pub fn to_config(&self) -> RunConfig {
        RunConfig {
            resources: ResourceLimits {
                cpus: self.cpus,
                memory_gb: self.memory,
                storage_gb: self.storage,
                numa_nodes: self.numa_nodes.clone(),
                cpu_set: self.cpu_set.clone(),
            },
            port: self.port,
            image: self.image.clone(),
            container_name: self.container_name.clone(),
            collection: self.collection.clone(),
            workload: WorkloadConfig {
                vector_size: self.vector_size,
                num_vectors: self.num_vectors,
                encoding: self.data_type,
                batch_size: self.batch_size,
                num_queries: self.num_queries,
                seed: self.seed,
                ..Default::default()
            },
            storage: StorageOptions {
                vectors_on_disk: self.on_disk,
                hnsw_on_disk: self.hnsw_on_disk,
                payload_on_disk: self.on_disk_payload,
            },
            defer_indexing: self.disable_hnsw_indexing_for_loading,
            readiness: ReadinessConfig {
                timeout: Duration::from_secs(self.ready_timeout),
                ..Default::default()
            },
            request_timeout: Duration::from_secs(self.request_timeout),
            ..Default::default()
        }
    }
}
