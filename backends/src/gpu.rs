//! GPU statistics from `nvidia-smi` or `nvtop`

use async_trait::async_trait;
use vecbench_core::{GpuDevice, GpuMonitor, GpuSnapshot, ProcessRunner, SystemProcessRunner};

const NVIDIA_SMI: &str = "nvidia-smi";
const NVTOP: &str = "nvtop";

/// [`GpuMonitor`] that shells out to the vendor tools
///
/// Tries `nvidia-smi` first, then `nvtop`; reports
/// [`GpuSnapshot::Unavailable`] when neither works.
pub struct CommandGpuMonitor<R = SystemProcessRunner> {
    runner: R,
}

impl CommandGpuMonitor<SystemProcessRunner> {
    /// Monitor using the system tools
    pub fn new() -> Self {
        Self::with_runner(SystemProcessRunner::new())
    }
}

impl Default for CommandGpuMonitor<SystemProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ProcessRunner> CommandGpuMonitor<R> {
    /// Monitor using a custom runner
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    async fn query_nvidia(&self) -> Option<GpuSnapshot> {
        if !self.runner.is_available(NVIDIA_SMI) {
            return None;
        }
        let args = [
            "--query-gpu=utilization.gpu,memory.used,memory.total".to_string(),
            "--format=csv,noheader,nounits".to_string(),
        ];
        match self.runner.run_checked(NVIDIA_SMI, &args).await {
            Ok(output) => {
                let parsed = parse_nvidia_smi(&output.stdout);
                if parsed.is_none() {
                    tracing::debug!(stdout = %output.stdout.trim(), "Unrecognised nvidia-smi output");
                }
                parsed
            }
            Err(e) => {
                tracing::debug!(error = %e, "nvidia-smi failed");
                None
            }
        }
    }

    async fn query_nvtop(&self) -> Option<GpuSnapshot> {
        if !self.runner.is_available(NVTOP) {
            return None;
        }
        let args = [
            "-o".to_string(),
            "gpu_util,mem_util".to_string(),
            "-f".to_string(),
            "csv".to_string(),
        ];
        match self.runner.run_checked(NVTOP, &args).await {
            Ok(output) => Some(GpuSnapshot::Raw {
                tool: NVTOP.to_string(),
                output: output.stdout.trim().to_string(),
            }),
            Err(e) => {
                tracing::debug!(error = %e, "nvtop failed");
                None
            }
        }
    }
}

/// Parse `nvidia-smi --format=csv,noheader,nounits` output, one GPU per line
///
/// Lines that do not parse are skipped and counted in a debug log; `None`
/// when no line parses.
pub fn parse_nvidia_smi(stdout: &str) -> Option<GpuSnapshot> {
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    let devices: Vec<GpuDevice> = lines
        .iter()
        .enumerate()
        .filter_map(|(index, line)| parse_device(index, line))
        .collect();

    let skipped = lines.len() - devices.len();
    if skipped > 0 {
        tracing::debug!(skipped, parsed = devices.len(), "Skipped unparsable nvidia-smi lines");
    }
    if devices.is_empty() {
        return None;
    }
    Some(GpuSnapshot::Nvidia { devices })
}

fn parse_device(index: usize, line: &str) -> Option<GpuDevice> {
    let mut fields = line.split(',').map(|f| f.trim().parse::<f64>());
    Some(GpuDevice {
        index,
        utilization_percent: fields.next()?.ok()?,
        memory_used_mb: fields.next()?.ok()?,
        memory_total_mb: fields.next()?.ok()?,
    })
}

#[async_trait]
impl<R: ProcessRunner> GpuMonitor for CommandGpuMonitor<R> {
    async fn snapshot(&self) -> GpuSnapshot {
        if let Some(snapshot) = self.query_nvidia().await {
            return snapshot;
        }
        if let Some(snapshot) = self.query_nvtop().await {
            return snapshot;
        }
        GpuSnapshot::Unavailable
    }
}

impl<R> std::fmt::Debug for CommandGpuMonitor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGpuMonitor").finish()
    }
}
