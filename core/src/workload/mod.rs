//! Synthetic workload: vector generation, batched load and query timing

mod data;
mod driver;
mod stats;


pub use data::{BatchPlan, BatchSlot, QueryVector, VectorBatch, VectorData, VectorGenerator, VectorRow};
pub use driver::{LoadPlan, PhaseFailure, QueryPlan, WorkloadDriver};
pub use stats::{BatchResult, InsertionStats, InsertionSummary, QuerySummary, MIN_ELAPSED};
