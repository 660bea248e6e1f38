//! Orchestrator execution logic

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::cancel::CancellationFlag;
use crate::config::RunConfig;
use crate::error::{BenchError, BenchResult};
use crate::readiness::{wait_ready, Readiness};
use crate::traits::{
    CollectionSpec, ContainerBackend, GpuMonitor, GpuSnapshot, HealthProbe, ProvisionSpec,
    ServiceClient,
};
use crate::workload::{LoadPlan, QueryPlan, WorkloadDriver};

use super::lease::{ServiceLease, TeardownReport};
use super::lifecycle::{Lifecycle, LifecyclePhase};
use super::report::{estimate_database_size, ResourceSnapshot, RunReport};

/// How a run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every phase ran and the report was emitted
    Completed,
    /// An interrupt stopped the run; teardown still happened
    Cancelled,
}

/// Result of a run that did not fail
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Completed or cancelled
    pub status: RunStatus,
    /// Measurements, partial when cancelled
    pub report: RunReport,
    /// Cleanup result
    pub teardown: TeardownReport,
}

/// Orchestrator manages the run lifecycle
///
/// Provisions the instance, waits for readiness, drives the load and
/// measurement phases and always tears the instance down.
pub struct Orchestrator {
    /// Run configuration
    pub(crate) config: RunConfig,

    /// Container backend
    pub(crate) backend: Arc<dyn ContainerBackend>,

    /// Service client
    pub(crate) client: Arc<dyn ServiceClient>,

    /// Readiness probe
    pub(crate) probe: Arc<dyn HealthProbe>,

    /// GPU monitor, if any
    pub(crate) gpu: Option<Arc<dyn GpuMonitor>>,

    /// Workload driver
    pub(crate) driver: WorkloadDriver,

    /// Cancellation flag shared with the interrupt coordinator
    pub(crate) cancel: CancellationFlag,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Use `OrchestratorBuilder` for a more ergonomic construction.
    pub fn new(
        config: RunConfig,
        backend: Arc<dyn ContainerBackend>,
        client: Arc<dyn ServiceClient>,
        probe: Arc<dyn HealthProbe>,
        gpu: Option<Arc<dyn GpuMonitor>>,
        driver: WorkloadDriver,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            config,
            backend,
            client,
            probe,
            gpu,
            driver,
            cancel,
        }
    }

    /// Get the run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the benchmark
    ///
    /// Teardown runs exactly once whether the run completes, fails or is
    /// cancelled. Cancellation is not an error and yields
    /// [`RunStatus::Cancelled`].
    pub async fn run(&self) -> BenchResult<RunOutcome> {
        let mut lifecycle = Lifecycle::new();
        let mut report = RunReport::new(self.client.service_name(), &self.config.collection);

        match serde_json::to_string(&self.config) {
            Ok(json) => tracing::info!(config = %json, "Configuration options for this run"),
            Err(e) => tracing::debug!(error = %e, "Failed to serialize configuration"),
        }

        let mut lease =
            ServiceLease::register(Arc::clone(&self.backend), &self.config.container_name);

        let result = self.execute(&mut lifecycle, &mut lease, &mut report).await;

        if let Err(e) = lifecycle.advance(LifecyclePhase::Teardown) {
            tracing::error!(error = %e, "Unexpected lifecycle state before teardown");
        }
        let teardown = lease.release().await;
        if let Err(e) = lifecycle.advance(LifecyclePhase::Done) {
            tracing::error!(error = %e, "Unexpected lifecycle state after teardown");
        }

        if report.finished_at.is_none() {
            report.finish();
        }

        match result {
            Ok(status) => {
                tracing::info!(status = ?status, "Run finished");
                Ok(RunOutcome {
                    status,
                    report,
                    teardown,
                })
            }
            Err(mut error) => {
                if teardown.oom_killed == Some(true) {
                    error.message = format!("{} (container was OOM killed)", error.message);
                }
                tracing::error!(
                    phase = %error.phase.map(|p| p.as_str()).unwrap_or("unknown"),
                    kind = %error.kind,
                    error = %error.message,
                    "Run failed"
                );
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        lifecycle: &mut Lifecycle,
        lease: &mut ServiceLease,
        report: &mut RunReport,
    ) -> BenchResult<RunStatus> {
        // ====================================================================
        // Provisioning
        // ====================================================================
        lifecycle.advance(LifecyclePhase::Provisioning)?;
        if self.interrupted(lifecycle) {
            return Ok(RunStatus::Cancelled);
        }

        let spec = ProvisionSpec::from_config(&self.config);
        let handle = self
            .backend
            .provision(&spec)
            .await
            .map_err(|e| e.in_phase(LifecyclePhase::Provisioning))?;
        tracing::info!(
            container = %handle.name,
            id = %handle.id,
            port = handle.port,
            "Service instance started"
        );
        lease.attach(handle);

        // ====================================================================
        // Readiness
        // ====================================================================
        lifecycle.advance(LifecyclePhase::AwaitingReady)?;
        match wait_ready(self.probe.as_ref(), &self.config.readiness, &self.cancel).await {
            Readiness::Ready { .. } => {}
            Readiness::TimedOut { attempts } => {
                return Err(BenchError::readiness_timeout(
                    self.probe.endpoint(),
                    attempts,
                    self.config.readiness.timeout,
                )
                .in_phase(LifecyclePhase::AwaitingReady));
            }
            Readiness::Cancelled => return Ok(RunStatus::Cancelled),
        }

        // ====================================================================
        // Loading
        // ====================================================================
        lifecycle.advance(LifecyclePhase::Loading)?;
        if self.interrupted(lifecycle) {
            return Ok(RunStatus::Cancelled);
        }

        self.driver
            .prepare_collection(&CollectionSpec::from_config(&self.config))
            .await
            .map_err(|e| e.in_phase(LifecyclePhase::Loading))?;

        tracing::info!("Initial database size: 0 bytes");
        report.before_load = Some(self.snapshot().await);

        let started = Instant::now();
        let insertion = self.driver.insert(&LoadPlan::from_config(&self.config)).await;
        report.load_duration = Some(started.elapsed());
        match insertion {
            Ok(summary) => report.insertion = Some(summary),
            Err(failure) => {
                tracing::warn!(
                    inserted = failure.partial.inserted,
                    batches = failure.partial.batches,
                    "Partial insertion results before failure"
                );
                report.insertion = Some(failure.partial);
                return Err(failure.error.in_phase(LifecyclePhase::Loading));
            }
        }
        if self.interrupted(lifecycle) {
            return Ok(RunStatus::Cancelled);
        }

        self.record_storage(report).await;
        report.after_load = Some(self.snapshot().await);
        report.disk_usage = match self.backend.disk_usage(&self.config.container_name).await {
            Ok(usage) => Some(usage),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get disk usage");
                None
            }
        };

        // ====================================================================
        // Measuring
        // ====================================================================
        lifecycle.advance(LifecyclePhase::Measuring)?;
        if self.interrupted(lifecycle) {
            return Ok(RunStatus::Cancelled);
        }

        let started = Instant::now();
        let queries = self
            .driver
            .measure_queries(&QueryPlan::from_config(&self.config))
            .await;
        report.measure_duration = Some(started.elapsed());
        match queries {
            Ok(summary) => report.queries = Some(summary),
            Err(failure) => {
                tracing::warn!(
                    completed = failure.partial.completed,
                    requested = failure.partial.requested,
                    "Partial query results before failure"
                );
                report.queries = Some(failure.partial);
                return Err(failure.error.in_phase(LifecyclePhase::Measuring));
            }
        }
        if self.interrupted(lifecycle) {
            return Ok(RunStatus::Cancelled);
        }

        // ====================================================================
        // Reporting
        // ====================================================================
        lifecycle.advance(LifecyclePhase::Reporting)?;
        report.finish();
        report.log();

        Ok(RunStatus::Completed)
    }

    fn interrupted(&self, lifecycle: &Lifecycle) -> bool {
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            tracing::info!(phase = %lifecycle.phase(), "Run cancelled");
        }
        cancelled
    }

    async fn record_storage(&self, report: &mut RunReport) {
        match self.client.collection_stats(&self.config.collection).await {
            Ok(stats) => {
                let size = estimate_database_size(
                    stats.points_count,
                    self.config.workload.vector_size,
                    self.config.workload.encoding,
                );
                report.points_count = Some(stats.points_count);
                report.database_size_bytes = Some(size);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get collection stats");
            }
        }
    }

    async fn snapshot(&self) -> ResourceSnapshot {
        let container = match self.backend.stats(&self.config.container_name).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get container stats");
                None
            }
        };
        let gpu = match &self.gpu {
            Some(monitor) => monitor.snapshot().await,
            None => GpuSnapshot::Unavailable,
        };
        ResourceSnapshot { container, gpu }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("backend", &self.backend.backend_name())
            .field("client", &self.client.service_name())
            .field("probe", &self.probe.endpoint())
            .field("driver", &self.driver)
            .finish()
    }
}
