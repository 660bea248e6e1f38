//! Workload driver: collection setup, bulk load and query measurement

use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use crate::cancel::CancellationFlag;
use crate::config::{RunConfig, VectorEncoding};
use crate::error::{BenchError, BenchResult};
use crate::traits::{CollectionSpec, IndexingParams, ServiceClient, ServiceError};

use super::data::{BatchPlan, VectorGenerator};
use super::stats::{BatchResult, InsertionStats, InsertionSummary, QuerySummary};

/// A fatal phase error together with what was measured before it
#[derive(Debug, Clone)]
pub struct PhaseFailure<T> {
    /// Summary accumulated up to the failure
    pub partial: T,
    /// The failure
    pub error: BenchError,
}

impl<T> PhaseFailure<T> {
    fn new(partial: T, error: BenchError) -> Self {
        Self { partial, error }
    }
}

/// Parameters of the load phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    /// Vectors to insert
    pub total: usize,
    /// Vector dimensionality
    pub vector_size: usize,
    /// Vectors per upload
    pub batch_size: usize,
    /// Element encoding
    pub encoding: VectorEncoding,
    /// Suspend index building for the duration of the load
    pub defer_indexing: bool,
}

impl LoadPlan {
    /// Derive the load plan from the run configuration
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            total: config.workload.num_vectors,
            vector_size: config.workload.vector_size,
            batch_size: config.workload.batch_size,
            encoding: config.workload.encoding,
            defer_indexing: config.defer_indexing,
        }
    }
}

/// Parameters of the measurement phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPlan {
    /// Searches to issue
    pub count: usize,
    /// Hits requested per search
    pub limit: usize,
    /// Query dimensionality
    pub vector_size: usize,
    /// Query element encoding
    pub encoding: VectorEncoding,
}

impl QueryPlan {
    /// Derive the query plan from the run configuration
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            count: config.workload.num_queries,
            limit: config.workload.search_limit,
            vector_size: config.workload.vector_size,
            encoding: config.workload.encoding,
        }
    }
}

/// Drives the load and measurement phases against a [`ServiceClient`]
///
/// Every loop checks the cancellation flag before issuing the next
/// operation. A single failed operation ends its phase; nothing is retried.
pub struct WorkloadDriver {
    client: Arc<dyn ServiceClient>,
    collection: String,
    cancel: CancellationFlag,
    seed: Option<u64>,
    show_progress: bool,
}

impl WorkloadDriver {
    /// Create a driver for `collection`
    pub fn new(
        client: Arc<dyn ServiceClient>,
        collection: impl Into<String>,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            client,
            collection: collection.into(),
            cancel,
            seed: None,
            show_progress: false,
        }
    }

    /// Seed the vector generator
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Show a progress bar during the load phase
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Collection this driver targets
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Recreate the benchmark collection from scratch
    pub async fn prepare_collection(&self, spec: &CollectionSpec) -> BenchResult<()> {
        let exists = self
            .client
            .collection_exists(&spec.name)
            .await
            .map_err(|e| service_failure("checking collection", e))?;

        if exists {
            tracing::info!(collection = %spec.name, "Deleting existing collection");
            self.client
                .delete_collection(&spec.name)
                .await
                .map_err(|e| service_failure("deleting collection", e))?;
        }

        tracing::info!(
            collection = %spec.name,
            vector_size = spec.vector_size,
            encoding = %spec.encoding,
            vectors_on_disk = spec.storage.vectors_on_disk,
            hnsw_on_disk = spec.storage.hnsw_on_disk,
            payload_on_disk = spec.storage.payload_on_disk,
            "Creating collection"
        );
        self.client
            .create_collection(spec)
            .await
            .map_err(|e| service_failure("creating collection", e))
    }

    /// Insert `plan.total` synthetic vectors in batches
    ///
    /// With index deferral enabled, indexing is disabled before the first
    /// batch and restored after the last attempted one, whether the loop
    /// finished, was cancelled or failed.
    pub async fn insert(
        &self,
        plan: &LoadPlan,
    ) -> Result<InsertionSummary, PhaseFailure<InsertionSummary>> {
        if plan.total == 0 {
            tracing::info!("No vectors to insert");
            return Ok(InsertionSummary::empty());
        }

        if plan.defer_indexing {
            tracing::info!(collection = %self.collection, "Disabling HNSW indexing for loading");
            self.set_indexing(&IndexingParams::deferred())
                .await
                .map_err(|e| PhaseFailure::new(InsertionSummary::empty(), e))?;
        }

        let result = self.insert_batches(plan).await;

        if !plan.defer_indexing {
            return result;
        }

        tracing::info!(collection = %self.collection, "Re-enabling HNSW indexing");
        let restored = self.set_indexing(&IndexingParams::restored()).await;
        match (result, restored) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(summary), Err(error)) => Err(PhaseFailure::new(summary, error)),
            (Err(failure), Ok(())) => Err(failure),
            (Err(failure), Err(error)) => {
                tracing::error!(error = %error, "Failed to re-enable indexing after load failure");
                Err(failure)
            }
        }
    }

    async fn insert_batches(
        &self,
        plan: &LoadPlan,
    ) -> Result<InsertionSummary, PhaseFailure<InsertionSummary>> {
        let mut generator = VectorGenerator::new(plan.vector_size, plan.encoding, self.seed);
        let mut stats = InsertionStats::new();
        let progress = self.progress_bar(plan.total);
        let batches = BatchPlan::new(plan.total, plan.batch_size);

        tracing::info!(
            total = plan.total,
            batch_size = plan.batch_size,
            batches = batches.batch_count(),
            "Inserting vectors"
        );

        let mut interrupted = false;
        for slot in batches {
            if self.cancel.is_cancelled() {
                tracing::info!(inserted = stats.inserted(), "Vector insertion interrupted");
                interrupted = true;
                break;
            }

            // Generated outside the timed window
            let batch = generator.batch(slot.index, slot.start as u64, slot.count);

            let started = Instant::now();
            let outcome = self.client.upload(&self.collection, &batch).await;
            let elapsed = started.elapsed();

            if let Err(e) = outcome {
                progress.abandon();
                let error = service_failure(&format!("uploading batch {}", slot.index), e);
                tracing::error!(
                    batch = slot.index,
                    inserted = stats.inserted(),
                    error = %error,
                    "Vector insertion failed"
                );
                return Err(PhaseFailure::new(stats.summary(false), error));
            }

            let result = BatchResult {
                index: slot.index,
                items: slot.count,
                elapsed,
            };
            tracing::debug!(
                batch = result.index,
                items = result.items,
                elapsed_ms = result.elapsed.as_secs_f64() * 1000.0,
                rate = result.rate(),
                "Batch inserted"
            );
            stats.record(&result);
            progress.inc(slot.count as u64);
        }

        progress.finish_and_clear();
        let summary = stats.summary(interrupted);
        tracing::info!(
            inserted = summary.inserted,
            batches = summary.batches,
            elapsed_secs = summary.total_elapsed.as_secs_f64(),
            "Average insertion rate: {:.2} vectors/second",
            summary.average_rate
        );
        tracing::info!(
            "Lowest batch rate: {:.2} vectors/second, highest: {:.2} vectors/second",
            summary.min_rate,
            summary.max_rate
        );
        Ok(summary)
    }

    /// Issue `plan.count` sequential searches with one fixed random query
    pub async fn measure_queries(
        &self,
        plan: &QueryPlan,
    ) -> Result<QuerySummary, PhaseFailure<QuerySummary>> {
        if plan.count == 0 {
            tracing::info!("No queries to run");
            return Ok(QuerySummary::empty(0));
        }

        // Distinct stream from the inserted vectors when seeded
        let seed = self.seed.map(|s| s.wrapping_add(1));
        let query = VectorGenerator::new(plan.vector_size, plan.encoding, seed).query_vector();

        tracing::info!(queries = plan.count, limit = plan.limit, "Measuring query performance");

        let started = Instant::now();
        let mut completed = 0usize;
        let mut interrupted = false;

        for _ in 0..plan.count {
            if self.cancel.is_cancelled() {
                tracing::info!(completed, "Query measurement interrupted");
                interrupted = true;
                break;
            }

            match self.client.search(&self.collection, &query, plan.limit).await {
                Ok(hits) => {
                    tracing::trace!(query = completed, hits, "Search completed");
                    completed += 1;
                }
                Err(e) => {
                    let error = service_failure(&format!("search {completed}"), e);
                    tracing::error!(completed, error = %error, "Query measurement failed");
                    let partial = QuerySummary::new(plan.count, completed, started.elapsed(), false);
                    return Err(PhaseFailure::new(partial, error));
                }
            }
        }

        let summary = QuerySummary::new(plan.count, completed, started.elapsed(), interrupted);
        tracing::info!(
            completed = summary.completed,
            "Average query time: {:.6} seconds",
            summary.average_latency.as_secs_f64()
        );
        Ok(summary)
    }

    async fn set_indexing(&self, params: &IndexingParams) -> BenchResult<()> {
        self.client
            .configure_indexing(&self.collection, params)
            .await
            .map_err(|e| service_failure("configuring indexing", e))
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} vectors ({eta})",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar
    }
}

impl std::fmt::Debug for WorkloadDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadDriver")
            .field("service", &self.client.service_name())
            .field("collection", &self.collection)
            .field("seed", &self.seed)
            .field("show_progress", &self.show_progress)
            .finish()
    }
}

fn service_failure(action: &str, err: ServiceError) -> BenchError {
    let mut error = BenchError::from(err);
    error.message = format!("{action}: {}", error.message);
    error
}
