//! Docker container backend
//!
//! Drives the `docker` CLI through a [`ProcessRunner`]. Storage is a tmpfs
//! mount so every run starts from an empty data directory.

use async_trait::async_trait;
use serde::Deserialize;
use vecbench_core::{
    BenchError, CommandOutput, ContainerBackend, ContainerStats, ContainerStatus, ProcessRunner,
    ProvisionSpec, ServiceHandle, SystemProcessRunner, TeardownWarning,
};

/// Data directory of the service inside the container
pub const STORAGE_MOUNT: &str = "/qdrant/storage";

const OOM_MARKER: &str = "\"OOMKilled\": true";

/// [`ContainerBackend`] backed by the `docker` CLI
pub struct DockerBackend<R = SystemProcessRunner> {
    runner: R,
    binary: String,
}

impl DockerBackend<SystemProcessRunner> {
    /// Backend using the system `docker` binary
    pub fn new() -> Self {
        Self::with_runner(SystemProcessRunner::new())
    }
}

impl Default for DockerBackend<SystemProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ProcessRunner> DockerBackend<R> {
    /// Backend using a custom runner
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            binary: "docker".to_string(),
        }
    }

    /// Override the engine binary (e.g. `podman`)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Whether the engine binary is on `PATH`
    pub fn is_available(&self) -> bool {
        self.runner.is_available(&self.binary)
    }

    async fn docker(&self, args: Vec<String>) -> Result<CommandOutput, BenchError> {
        self.runner
            .run(&self.binary, &args)
            .await
            .map_err(BenchError::from)
    }

    async fn docker_checked(&self, args: Vec<String>) -> Result<CommandOutput, BenchError> {
        self.docker(args)
            .await?
            .into_checked()
            .map_err(BenchError::from)
    }

    async fn cleanup_step(
        &self,
        action: &'static str,
        subcommand: &str,
        name: &str,
    ) -> Option<TeardownWarning> {
        match self.docker(vec![subcommand.to_string(), name.to_string()]).await {
            Ok(output) if output.success() => {
                tracing::info!(container = name, "Container {action} succeeded");
                None
            }
            Ok(output) if is_missing_container(&output.stderr) => {
                Some(TeardownWarning::NotFound { action })
            }
            Ok(output) => Some(TeardownWarning::Failed {
                action,
                message: output.stderr.trim().to_string(),
            }),
            Err(e) => Some(TeardownWarning::Failed {
                action,
                message: e.message,
            }),
        }
    }
}

/// Arguments for `docker run`
pub fn run_args(spec: &ProvisionSpec) -> Vec<String> {
    let resources = &spec.resources;
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--cpus".to_string(),
        resources.cpus.to_string(),
        "--memory".to_string(),
        format!("{}g", resources.memory_gb),
        "--mount".to_string(),
        format!(
            "type=tmpfs,destination={STORAGE_MOUNT},tmpfs-size={}g",
            resources.storage_gb
        ),
        "-p".to_string(),
        format!("{}:{}", spec.host_port, spec.service_port),
        "--name".to_string(),
        spec.name.clone(),
    ];
    if let Some(nodes) = &resources.numa_nodes {
        args.push("--cpuset-mems".to_string());
        args.push(nodes.clone());
    }
    if let Some(cpus) = &resources.cpu_set {
        args.push("--cpuset-cpus".to_string());
        args.push(cpus.clone());
    }
    args.push(spec.image.clone());
    args
}

fn is_missing_container(stderr: &str) -> bool {
    stderr.contains("No such container")
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "State")]
    state: InspectState,
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Running", default)]
    running: bool,
    #[serde(rename = "OOMKilled", default)]
    oom_killed: bool,
    #[serde(rename = "ExitCode")]
    exit_code: Option<i64>,
}

/// Parse `docker inspect` output, falling back to a marker search
pub fn parse_inspect(stdout: &str) -> ContainerStatus {
    match serde_json::from_str::<Vec<InspectEntry>>(stdout) {
        Ok(entries) => match entries.into_iter().next() {
            Some(InspectEntry { state }) => ContainerStatus {
                status: state.status,
                running: state.running,
                oom_killed: state.oom_killed,
                exit_code: state.exit_code,
            },
            None => ContainerStatus::default(),
        },
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable inspect output, scanning for OOM marker");
            ContainerStatus {
                oom_killed: stdout.contains(OOM_MARKER),
                ..ContainerStatus::default()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatsLine {
    #[serde(rename = "CPUPerc")]
    cpu: String,
    #[serde(rename = "MemUsage")]
    memory: String,
    #[serde(rename = "BlockIO")]
    block_io: String,
    #[serde(rename = "NetIO")]
    net_io: String,
}

/// Parse one `docker stats --format '{{json .}}'` line
pub fn parse_stats(stdout: &str) -> Result<ContainerStats, BenchError> {
    let line = stdout.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let stats: StatsLine = serde_json::from_str(line)
        .map_err(|e| BenchError::process(format!("invalid docker stats output: {e}")))?;
    Ok(ContainerStats {
        cpu: stats.cpu,
        memory: stats.memory,
        disk_io: stats.block_io,
        network_io: stats.net_io,
    })
}

#[async_trait]
impl<R: ProcessRunner> ContainerBackend for DockerBackend<R> {
    fn backend_name(&self) -> &str {
        "docker"
    }

    async fn provision(&self, spec: &ProvisionSpec) -> Result<ServiceHandle, BenchError> {
        let resources = &spec.resources;
        tracing::info!(
            cpus = resources.cpus,
            memory_gb = resources.memory_gb,
            storage_gb = resources.storage_gb,
            port = spec.host_port,
            numa_nodes = ?resources.numa_nodes,
            cpu_set = ?resources.cpu_set,
            image = %spec.image,
            "Starting container"
        );

        let output = self
            .docker_checked(run_args(spec))
            .await
            .map_err(|e| BenchError::provisioning(e.message))?;

        Ok(ServiceHandle {
            name: spec.name.clone(),
            id: output.stdout.trim().to_string(),
            host: spec.host.clone(),
            port: spec.host_port,
        })
    }

    async fn teardown(&self, name: &str) -> Vec<TeardownWarning> {
        let mut warnings = Vec::new();
        warnings.extend(self.cleanup_step("stop", "stop", name).await);
        warnings.extend(self.cleanup_step("remove", "rm", name).await);
        warnings
    }

    async fn inspect(&self, name: &str) -> Result<ContainerStatus, BenchError> {
        let output = self
            .docker_checked(vec!["inspect".to_string(), name.to_string()])
            .await?;
        Ok(parse_inspect(&output.stdout))
    }

    async fn stats(&self, name: &str) -> Result<ContainerStats, BenchError> {
        let output = self
            .docker_checked(vec![
                "stats".to_string(),
                "--no-stream".to_string(),
                "--format".to_string(),
                "{{json .}}".to_string(),
                name.to_string(),
            ])
            .await?;
        parse_stats(&output.stdout)
    }

    async fn disk_usage(&self, name: &str) -> Result<String, BenchError> {
        let output = self
            .docker_checked(vec![
                "exec".to_string(),
                name.to_string(),
                "df".to_string(),
                "-h".to_string(),
            ])
            .await?;
        Ok(output.stdout)
    }
}

impl<R> std::fmt::Debug for DockerBackend<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerBackend")
            .field("binary", &self.binary)
            .finish()
    }
}
