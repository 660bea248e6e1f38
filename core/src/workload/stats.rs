//! Load and query phase statistics

use std::time::Duration;

use serde::{Serialize, Serializer};

/// Lower bound applied to elapsed times before dividing
pub const MIN_ELAPSED: Duration = Duration::from_micros(1);

fn per_second(items: usize, elapsed: Duration) -> f64 {
    items as f64 / elapsed.max(MIN_ELAPSED).as_secs_f64()
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Timing of one uploaded batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchResult {
    /// Batch position
    pub index: usize,
    /// Vectors in the batch
    pub items: usize,
    /// Time spent in the upload call
    pub elapsed: Duration,
}

impl BatchResult {
    /// Vectors per second for this batch
    pub fn rate(&self) -> f64 {
        per_second(self.items, self.elapsed)
    }
}

/// Running aggregate over [`BatchResult`]s
///
/// Batches are folded in as they complete and not retained.
#[derive(Debug, Clone, Default)]
pub struct InsertionStats {
    inserted: usize,
    batches: usize,
    total_elapsed: Duration,
    min_rate: Option<f64>,
    max_rate: Option<f64>,
}

impl InsertionStats {
    /// Create an empty aggregate
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one batch
    pub fn record(&mut self, batch: &BatchResult) {
        let rate = batch.rate();
        self.inserted += batch.items;
        self.batches += 1;
        self.total_elapsed += batch.elapsed;
        self.min_rate = Some(self.min_rate.map_or(rate, |min| min.min(rate)));
        self.max_rate = Some(self.max_rate.map_or(rate, |max| max.max(rate)));
    }

    /// Vectors recorded so far
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Summarise; `interrupted` marks a phase cut short by cancellation
    pub fn summary(&self, interrupted: bool) -> InsertionSummary {
        let average_rate = if self.batches == 0 {
            0.0
        } else {
            per_second(self.inserted, self.total_elapsed)
        };
        InsertionSummary {
            inserted: self.inserted,
            batches: self.batches,
            total_elapsed: self.total_elapsed,
            average_rate,
            min_rate: self.min_rate.unwrap_or(0.0),
            max_rate: self.max_rate.unwrap_or(0.0),
            interrupted,
        }
    }
}

/// Result of the load phase
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsertionSummary {
    /// Vectors inserted
    pub inserted: usize,
    /// Batches uploaded
    pub batches: usize,
    /// Sum of batch upload times
    #[serde(rename = "total_elapsed_secs", serialize_with = "serialize_secs")]
    pub total_elapsed: Duration,
    /// Inserted vectors divided by the summed batch time
    pub average_rate: f64,
    /// Slowest batch rate
    pub min_rate: f64,
    /// Fastest batch rate
    pub max_rate: f64,
    /// Whether cancellation stopped the phase early
    pub interrupted: bool,
}

impl InsertionSummary {
    /// The summary of a phase that issued no uploads
    pub fn empty() -> Self {
        Self::default()
    }

    /// Aggregate a slice of batch results
    pub fn from_batches(batches: &[BatchResult]) -> Self {
        let mut stats = InsertionStats::new();
        for batch in batches {
            stats.record(batch);
        }
        stats.summary(false)
    }
}

/// Result of the measurement phase
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySummary {
    /// Queries requested
    pub requested: usize,
    /// Queries that completed
    pub completed: usize,
    /// Wall time of the phase
    #[serde(rename = "total_elapsed_secs", serialize_with = "serialize_secs")]
    pub total_elapsed: Duration,
    /// Mean latency over completed queries
    #[serde(rename = "average_latency_secs", serialize_with = "serialize_secs")]
    pub average_latency: Duration,
    /// Whether cancellation stopped the phase early
    pub interrupted: bool,
}

impl QuerySummary {
    /// Build a summary; average latency is zero when nothing completed
    pub fn new(requested: usize, completed: usize, total_elapsed: Duration, interrupted: bool) -> Self {
        let average_latency = match u32::try_from(completed) {
            Ok(0) => Duration::ZERO,
            Ok(n) => total_elapsed / n,
            Err(_) => Duration::from_secs_f64(total_elapsed.as_secs_f64() / completed as f64),
        };
        Self {
            requested,
            completed,
            total_elapsed,
            average_latency,
            interrupted,
        }
    }

    /// Summary of a phase that issued no queries
    pub fn empty(requested: usize) -> Self {
        Self::new(requested, 0, Duration::ZERO, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(index: usize, items: usize, millis: u64) -> BatchResult {
        BatchResult {
            index,
            items,
            elapsed: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_average_is_total_over_total_time() {
        // 1000 items in 1s (1000/s) and 1000 items in 3s (~333/s):
        // overall 2000 / 4s = 500/s, not the 666/s mean of rates
        let summary = InsertionSummary::from_batches(&[batch(0, 1000, 1000), batch(1, 1000, 3000)]);

        assert_eq!(summary.inserted, 2000);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.total_elapsed, Duration::from_secs(4));
        assert!((summary.average_rate - 500.0).abs() < 1e-9);
        assert!((summary.max_rate - 1000.0).abs() < 1e-9);
        assert!((summary.min_rate - 1000.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let summary = InsertionSummary::from_batches(&[]);
        assert_eq!(summary, InsertionSummary::empty());
        assert_eq!(summary.average_rate, 0.0);
        assert_eq!(summary.min_rate, 0.0);
    }

    #[test]
    fn test_zero_elapsed_batch_uses_floor() {
        let rate = batch(0, 10, 0).rate();
        assert!(rate.is_finite());
        assert!((rate - 10_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_stats_track_inserted() {
        let mut stats = InsertionStats::new();
        stats.record(&batch(0, 100, 10));
        stats.record(&batch(1, 50, 10));
        assert_eq!(stats.inserted(), 150);
        assert!(stats.summary(true).interrupted);
    }

    #[test]
    fn test_query_summary_averages_completed_only() {
        let summary = QuerySummary::new(10, 4, Duration::from_millis(200), true);
        assert_eq!(summary.average_latency, Duration::from_millis(50));
        assert_eq!(summary.requested, 10);

        let none = QuerySummary::new(10, 0, Duration::from_millis(5), true);
        assert_eq!(none.average_latency, Duration::ZERO);
    }

    #[test]
    fn test_summary_serializes_seconds() {
        let summary = InsertionSummary::from_batches(&[batch(0, 10, 1500)]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["total_elapsed_secs"], 1.5);
        assert_eq!(json["inserted"], 10);
    }
}
