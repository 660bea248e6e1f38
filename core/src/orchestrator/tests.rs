//! Tests for the Orchestrator module

use super::builder::OrchestratorBuilder;
use super::executor::RunStatus;
use super::lease::ServiceLease;
use super::lifecycle::LifecyclePhase;
use crate::cancel::CancellationFlag;
use crate::config::{ReadinessConfig, RunConfig, WorkloadConfig};
use crate::error::{BenchError, ErrorKind};
use crate::traits::{
    CollectionSpec, CollectionStats, ContainerBackend, ContainerStats, ContainerStatus,
    GpuMonitor, GpuSnapshot, HealthProbe, IndexingParams, ProbeOutcome, ProvisionSpec,
    ServiceClient, ServiceError, ServiceHandle, TeardownWarning,
};
use crate::workload::{QueryVector, VectorBatch};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fake ContainerBackend
// ============================================================================

#[derive(Default)]
struct FakeBackend {
    provisions: AtomicUsize,
    teardowns: AtomicUsize,
    stats_calls: AtomicUsize,
    fail_provision: bool,
    oom_killed: bool,
}

impl FakeBackend {
    fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerBackend for FakeBackend {
    fn backend_name(&self) -> &str {
        "fake"
    }

    async fn provision(&self, spec: &ProvisionSpec) -> Result<ServiceHandle, BenchError> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        if self.fail_provision {
            return Err(BenchError::provisioning("docker run exited with status 125"));
        }
        Ok(ServiceHandle {
            name: spec.name.clone(),
            id: "abc123".into(),
            host: spec.host.clone(),
            port: spec.host_port,
        })
    }

    async fn teardown(&self, _name: &str) -> Vec<TeardownWarning> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        if self.provisions.load(Ordering::SeqCst) == 0 || self.fail_provision {
            vec![
                TeardownWarning::NotFound { action: "stop" },
                TeardownWarning::NotFound { action: "remove" },
            ]
        } else {
            Vec::new()
        }
    }

    async fn inspect(&self, _name: &str) -> Result<ContainerStatus, BenchError> {
        Ok(ContainerStatus {
            status: "running".into(),
            running: !self.oom_killed,
            oom_killed: self.oom_killed,
            exit_code: None,
        })
    }

    async fn stats(&self, _name: &str) -> Result<ContainerStats, BenchError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ContainerStats {
            cpu: "1.00%".into(),
            memory: "100MiB / 4GiB".into(),
            disk_io: "0B / 0B".into(),
            network_io: "0B / 0B".into(),
        })
    }

    async fn disk_usage(&self, _name: &str) -> Result<String, BenchError> {
        Ok("Filesystem Size Used Avail Use% Mounted on".into())
    }
}

// ============================================================================
// Fake ServiceClient
// ============================================================================

#[derive(Default)]
struct FakeClient {
    points: AtomicUsize,
    searches: AtomicUsize,
    fail_upload: bool,
    cancel_on_upload: Option<CancellationFlag>,
}

#[async_trait]
impl ServiceClient for FakeClient {
    fn service_name(&self) -> &str {
        "fake"
    }

    async fn collection_exists(&self, _name: &str) -> Result<bool, ServiceError> {
        Ok(false)
    }

    async fn create_collection(&self, _spec: &CollectionSpec) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn delete_collection(&self, _name: &str) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn configure_indexing(
        &self,
        _collection: &str,
        _params: &IndexingParams,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn upload(&self, _collection: &str, batch: &VectorBatch) -> Result<(), ServiceError> {
        if self.fail_upload {
            return Err(ServiceError::Status {
                status: 500,
                message: "internal error".into(),
            });
        }
        self.points.fetch_add(batch.len(), Ordering::SeqCst);
        if let Some(flag) = &self.cancel_on_upload {
            flag.cancel();
        }
        Ok(())
    }

    async fn search(
        &self,
        _collection: &str,
        _vector: &QueryVector,
        limit: usize,
    ) -> Result<usize, ServiceError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(limit)
    }

    async fn collection_stats(&self, _collection: &str) -> Result<CollectionStats, ServiceError> {
        Ok(CollectionStats {
            points_count: self.points.load(Ordering::SeqCst) as u64,
            indexed_vectors_count: None,
            status: "green".into(),
        })
    }
}

// ============================================================================
// Fake HealthProbe / GpuMonitor
// ============================================================================

struct FakeProbe {
    ready: bool,
}

#[async_trait]
impl HealthProbe for FakeProbe {
    fn endpoint(&self) -> &str {
        "http://localhost:6333/collections"
    }

    async fn probe(&self) -> ProbeOutcome {
        if self.ready {
            ProbeOutcome::Ready
        } else {
            ProbeOutcome::ConnectionFailed("connection refused".into())
        }
    }
}

#[derive(Default)]
struct FakeGpu {
    called: AtomicBool,
}

#[async_trait]
impl GpuMonitor for FakeGpu {
    async fn snapshot(&self) -> GpuSnapshot {
        self.called.store(true, Ordering::SeqCst);
        GpuSnapshot::Unavailable
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn small_config() -> RunConfig {
    RunConfig::default()
        .with_workload(WorkloadConfig {
            vector_size: 4,
            num_vectors: 30,
            batch_size: 10,
            num_queries: 5,
            seed: Some(1),
            ..WorkloadConfig::default()
        })
        .with_readiness(ReadinessConfig {
            timeout: Duration::from_millis(50),
            interval: Duration::from_millis(10),
        })
}

struct Harness {
    backend: Arc<FakeBackend>,
    client: Arc<FakeClient>,
    gpu: Arc<FakeGpu>,
    cancel: CancellationFlag,
    ready: bool,
}

impl Harness {
    fn new(backend: FakeBackend, client: FakeClient) -> Self {
        Self {
            backend: Arc::new(backend),
            client: Arc::new(client),
            gpu: Arc::new(FakeGpu::default()),
            cancel: CancellationFlag::new(),
            ready: true,
        }
    }

    fn builder(&self) -> OrchestratorBuilder {
        OrchestratorBuilder::new()
            .config(small_config())
            .backend(Arc::clone(&self.backend) as Arc<dyn ContainerBackend>)
            .client(Arc::clone(&self.client) as Arc<dyn ServiceClient>)
            .probe(Arc::new(FakeProbe { ready: self.ready }))
            .gpu(Arc::clone(&self.gpu) as Arc<dyn GpuMonitor>)
            .cancellation(self.cancel.clone())
    }
}

// ============================================================================
// Builder Tests
// ============================================================================

#[test]
fn test_builder_requires_backend() {
    let err = OrchestratorBuilder::new()
        .client(Arc::new(FakeClient::default()))
        .probe(Arc::new(FakeProbe { ready: true }))
        .build()
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
    assert!(err.message.contains("backend"));
}

#[test]
fn test_builder_validates_config() {
    let harness = Harness::new(FakeBackend::default(), FakeClient::default());
    let mut config = small_config();
    config.workload.num_vectors = 0;

    let err = harness.builder().config(config).build().unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidConfig);
}

// ============================================================================
// Run Tests
// ============================================================================

#[tokio::test]
async fn test_successful_run_tears_down_once() {
    let harness = Harness::new(FakeBackend::default(), FakeClient::default());
    let orchestrator = harness.builder().build().unwrap();

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(harness.backend.teardowns(), 1);
    assert!(outcome.teardown.warnings.is_empty());
    assert_eq!(outcome.teardown.oom_killed, Some(false));

    let report = &outcome.report;
    assert_eq!(report.insertion.as_ref().unwrap().inserted, 30);
    assert_eq!(report.queries.as_ref().unwrap().completed, 5);
    assert_eq!(report.points_count, Some(30));
    assert_eq!(report.database_size_bytes, Some(30 * 4 * 4));
    assert!(report.before_load.is_some());
    assert!(report.after_load.is_some());
    assert!(report.disk_usage.is_some());
    assert!(report.finished_at.is_some());
    assert_eq!(harness.backend.stats_calls.load(Ordering::SeqCst), 2);
    assert!(harness.gpu.called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_operation_error_tears_down_once() {
    let harness = Harness::new(
        FakeBackend::default(),
        FakeClient {
            fail_upload: true,
            ..FakeClient::default()
        },
    );
    let orchestrator = harness.builder().build().unwrap();

    let err = orchestrator.run().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Operation);
    assert_eq!(err.phase, Some(LifecyclePhase::Loading));
    assert_eq!(harness.backend.teardowns(), 1);
    assert_eq!(harness.client.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancellation_during_load_tears_down_once() {
    let cancel = CancellationFlag::new();
    let mut harness = Harness::new(
        FakeBackend::default(),
        FakeClient {
            cancel_on_upload: Some(cancel.clone()),
            ..FakeClient::default()
        },
    );
    harness.cancel = cancel;
    let orchestrator = harness.builder().build().unwrap();

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(harness.backend.teardowns(), 1);
    let insertion = outcome.report.insertion.unwrap();
    assert_eq!(insertion.inserted, 10);
    assert!(insertion.interrupted);
    assert!(outcome.report.queries.is_none());
    assert_eq!(harness.client.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_still_tears_down() {
    let harness = Harness::new(FakeBackend::default(), FakeClient::default());
    harness.cancel.cancel();
    let orchestrator = harness.builder().build().unwrap();

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(harness.backend.provisions.load(Ordering::SeqCst), 0);
    assert_eq!(harness.backend.teardowns(), 1);
}

#[tokio::test]
async fn test_provisioning_failure_tears_down_once() {
    let harness = Harness::new(
        FakeBackend {
            fail_provision: true,
            ..FakeBackend::default()
        },
        FakeClient::default(),
    );
    let orchestrator = harness.builder().build().unwrap();

    let err = orchestrator.run().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Provisioning);
    assert_eq!(err.phase, Some(LifecyclePhase::Provisioning));
    assert_eq!(harness.backend.teardowns(), 1);
}

#[tokio::test]
async fn test_readiness_timeout_tears_down_once() {
    let mut harness = Harness::new(FakeBackend::default(), FakeClient::default());
    harness.ready = false;
    let orchestrator = harness.builder().build().unwrap();

    let err = orchestrator.run().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::ReadinessTimeout);
    assert_eq!(err.phase, Some(LifecyclePhase::AwaitingReady));
    assert_eq!(harness.backend.teardowns(), 1);
    assert_eq!(harness.client.points.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_oom_kill_is_reported_on_failure() {
    let harness = Harness::new(
        FakeBackend {
            oom_killed: true,
            ..FakeBackend::default()
        },
        FakeClient {
            fail_upload: true,
            ..FakeClient::default()
        },
    );
    let orchestrator = harness.builder().build().unwrap();

    let err = orchestrator.run().await.unwrap_err();

    assert!(err.message.contains("OOM killed"));
}

// ============================================================================
// Lease Tests
// ============================================================================

#[tokio::test]
async fn test_lease_release_is_idempotent() {
    let backend = Arc::new(FakeBackend::default());
    let mut lease = ServiceLease::register(
        Arc::clone(&backend) as Arc<dyn ContainerBackend>,
        "qdrant_benchmark",
    );

    let first = lease.release().await;
    let second = lease.release().await;

    assert_eq!(backend.teardowns(), 1);
    assert_eq!(first.warnings.len(), 2);
    assert!(second.warnings.is_empty());
    assert!(lease.is_released());
}

#[tokio::test]
async fn test_dropped_lease_schedules_teardown() {
    let backend = Arc::new(FakeBackend::default());
    {
        let _lease = ServiceLease::register(
            Arc::clone(&backend) as Arc<dyn ContainerBackend>,
            "qdrant_benchmark",
        );
    }

    for _ in 0..50 {
        if backend.teardowns() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(backend.teardowns(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_lease_tears_down_before_drop_returns() {
    let backend = Arc::new(FakeBackend::default());
    {
        let _lease = ServiceLease::register(
            Arc::clone(&backend) as Arc<dyn ContainerBackend>,
            "qdrant_benchmark",
        );
    }
    assert_eq!(backend.teardowns(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lease_dropped_by_panic_still_tears_down() {
    let backend = Arc::new(FakeBackend::default());
    let task = {
        let backend = Arc::clone(&backend) as Arc<dyn ContainerBackend>;
        tokio::spawn(async move {
            let _lease = ServiceLease::register(backend, "qdrant_benchmark");
            panic!("run aborted");
        })
    };

    let joined = task.await;
    assert!(joined.unwrap_err().is_panic());
    assert_eq!(backend.teardowns(), 1);
}
