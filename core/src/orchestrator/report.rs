//! Run report and human-readable formatting helpers

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::config::VectorEncoding;
use crate::traits::{ContainerStats, GpuSnapshot};
use crate::workload::{InsertionSummary, QuerySummary};

fn serialize_opt_secs<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_some(&d.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

/// Container and GPU usage at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    /// Container stats, `None` if they could not be collected
    pub container: Option<ContainerStats>,
    /// GPU stats
    pub gpu: GpuSnapshot,
}

/// Everything measured during one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Service being measured
    pub service: String,
    /// Collection used
    pub collection: String,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end, set when the report is finalised
    pub finished_at: Option<DateTime<Utc>>,
    /// Load phase result
    pub insertion: Option<InsertionSummary>,
    /// Measurement phase result
    pub queries: Option<QuerySummary>,
    /// Resources before the load phase
    pub before_load: Option<ResourceSnapshot>,
    /// Resources after the load phase
    pub after_load: Option<ResourceSnapshot>,
    /// Wall time of the load phase
    #[serde(rename = "load_duration_secs", serialize_with = "serialize_opt_secs")]
    pub load_duration: Option<Duration>,
    /// Wall time of the measurement phase
    #[serde(rename = "measure_duration_secs", serialize_with = "serialize_opt_secs")]
    pub measure_duration: Option<Duration>,
    /// Points stored after the load phase
    pub points_count: Option<u64>,
    /// Estimated raw vector storage after the load phase
    pub database_size_bytes: Option<u64>,
    /// `df -h` output from inside the instance
    pub disk_usage: Option<String>,
}

impl RunReport {
    /// Start an empty report
    pub fn new(service: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            collection: collection.into(),
            started_at: Utc::now(),
            finished_at: None,
            insertion: None,
            queries: None,
            before_load: None,
            after_load: None,
            load_duration: None,
            measure_duration: None,
            points_count: None,
            database_size_bytes: None,
            disk_usage: None,
        }
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Emit the report through `tracing`, followed by one JSON line
    pub fn log(&self) {
        tracing::info!(service = %self.service, collection = %self.collection, "Benchmark report");

        if let Some(snapshot) = &self.before_load {
            log_snapshot("before insertion", snapshot);
        }

        if let (Some(insertion), Some(duration)) = (&self.insertion, self.load_duration) {
            tracing::info!(
                "Inserted {} vectors in {} ({:.2} seconds)",
                insertion.inserted,
                format_duration(duration),
                duration.as_secs_f64()
            );
            tracing::info!(
                "Insertion rate: average {:.2}, min {:.2}, max {:.2} vectors/second",
                insertion.average_rate,
                insertion.min_rate,
                insertion.max_rate
            );
        }

        if let Some(size) = self.database_size_bytes {
            tracing::info!("Database size after insertion: {}", format_size(size));
        }

        if let Some(snapshot) = &self.after_load {
            log_snapshot("after insertion", snapshot);
        }

        if let Some(disk) = &self.disk_usage {
            tracing::info!("Disk usage after insertion:\n{disk}");
        }

        if let Some(queries) = &self.queries {
            tracing::info!(
                completed = queries.completed,
                requested = queries.requested,
                "Final average query time: {:.6} seconds",
                queries.average_latency.as_secs_f64()
            );
        }

        if let Some(duration) = self.measure_duration {
            tracing::info!(
                "Query benchmark completed in {} ({:.2} seconds)",
                format_duration(duration),
                duration.as_secs_f64()
            );
        }

        match serde_json::to_string(self) {
            Ok(json) => tracing::info!(report = %json, "Benchmark report (json)"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize report"),
        }
    }
}

fn log_snapshot(label: &str, snapshot: &ResourceSnapshot) {
    match &snapshot.container {
        Some(stats) => tracing::info!(
            cpu = %stats.cpu,
            memory = %stats.memory,
            disk_io = %stats.disk_io,
            network_io = %stats.network_io,
            "Container stats {label}"
        ),
        None => tracing::info!("Container stats {label}: not available"),
    }
    tracing::info!("GPU stats {label}: {}", snapshot.gpu);
}

/// Raw vector storage estimate: points × dimension × element size
pub fn estimate_database_size(points: u64, dimension: usize, encoding: VectorEncoding) -> u64 {
    points
        .saturating_mul(dimension as u64)
        .saturating_mul(encoding.element_size() as u64)
}

/// Render a duration as e.g. "1 hours, 2 minutes, 5 seconds"
///
/// Zero components are omitted; seconds are always shown when nothing else is.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days} days"));
    }
    if hours > 0 {
        parts.push(format!("{hours} hours"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes} minutes"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds} seconds"));
    }
    parts.join(", ")
}

/// Render a byte count as e.g. "1.50 KB (1536 bytes)"
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {} ({bytes} bytes)", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0 seconds");
        assert_eq!(format_duration(Duration::from_millis(5900)), "5 seconds");
        assert_eq!(format_duration(Duration::from_secs(120)), "2 minutes");
        assert_eq!(
            format_duration(Duration::from_secs(90_061)),
            "1 days, 1 hours, 1 minutes, 1 seconds"
        );
        assert_eq!(format_duration(Duration::from_secs(3_605)), "1 hours, 5 seconds");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 B (0 bytes)");
        assert_eq!(format_size(1536), "1.50 KB (1536 bytes)");
        assert_eq!(format_size(1_536_000_000), "1.43 GB (1536000000 bytes)");
        assert_eq!(format_size(1024u64.pow(5)), "1024.00 TB (1125899906842624 bytes)");
    }

    #[test]
    fn test_estimate_database_size() {
        assert_eq!(
            estimate_database_size(1_000_000, 384, VectorEncoding::Float32),
            1_536_000_000
        );
        assert_eq!(estimate_database_size(10, 4, VectorEncoding::Uint8), 40);
    }

    #[test]
    fn test_report_json_uses_seconds() {
        let mut report = RunReport::new("qdrant", "bench");
        report.load_duration = Some(Duration::from_millis(2500));
        report.finish();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["load_duration_secs"], 2.5);
        assert!(json["measure_duration_secs"].is_null());
        assert!(json["finished_at"].is_string());
    }
}
