//! Builder pattern for Orchestrator construction

use std::sync::Arc;

use crate::cancel::CancellationFlag;
use crate::config::RunConfig;
use crate::error::{BenchError, BenchResult};
use crate::traits::{ContainerBackend, GpuMonitor, HealthProbe, ServiceClient};
use crate::workload::WorkloadDriver;

use super::executor::Orchestrator;

/// Builder for creating an Orchestrator with proper configuration
///
/// # Example
///
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .config(config)
///     .backend(docker)
///     .client(qdrant)
///     .probe(probe)
///     .gpu(gpu)
///     .cancellation(coordinator.flag().clone())
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    config: RunConfig,
    backend: Option<Arc<dyn ContainerBackend>>,
    client: Option<Arc<dyn ServiceClient>>,
    probe: Option<Arc<dyn HealthProbe>>,
    gpu: Option<Arc<dyn GpuMonitor>>,
    cancel: CancellationFlag,
    show_progress: bool,
}

impl OrchestratorBuilder {
    /// Create a new orchestrator builder with default configuration
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
            backend: None,
            client: None,
            probe: None,
            gpu: None,
            cancel: CancellationFlag::new(),
            show_progress: false,
        }
    }

    /// Set the full run configuration
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the container backend
    pub fn backend(mut self, backend: Arc<dyn ContainerBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the service client
    pub fn client(mut self, client: Arc<dyn ServiceClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the readiness probe
    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Set the GPU monitor; without one GPU stats are reported unavailable
    pub fn gpu(mut self, gpu: Arc<dyn GpuMonitor>) -> Self {
        self.gpu = Some(gpu);
        self
    }

    /// Share a cancellation flag with the interrupt coordinator
    pub fn cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Show the insertion progress bar
    pub fn progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if the backend, client or probe is not set, or if
    /// configuration validation fails.
    pub fn build(self) -> BenchResult<Orchestrator> {
        let backend = self
            .backend
            .ok_or_else(|| BenchError::missing_config("backend"))?;

        let client = self
            .client
            .ok_or_else(|| BenchError::missing_config("client"))?;

        let probe = self
            .probe
            .ok_or_else(|| BenchError::missing_config("probe"))?;

        self.config.validate()?;

        let driver = WorkloadDriver::new(
            Arc::clone(&client),
            self.config.collection.clone(),
            self.cancel.clone(),
        )
        .with_seed(self.config.workload.seed)
        .with_progress(self.show_progress);

        Ok(Orchestrator::new(
            self.config,
            backend,
            client,
            probe,
            self.gpu,
            driver,
            self.cancel,
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
