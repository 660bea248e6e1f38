//! Run lifecycle state machine

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// Phase of a benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Configuration accepted, nothing started
    Init,
    /// Starting the service instance
    Provisioning,
    /// Polling the service until it answers
    AwaitingReady,
    /// Bulk insertion
    Loading,
    /// Query timing
    Measuring,
    /// Emitting the run report
    Reporting,
    /// Stopping and removing the instance
    Teardown,
    /// Terminal
    Done,
}

impl LifecyclePhase {
    /// Short identifier used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Init => "init",
            LifecyclePhase::Provisioning => "provisioning",
            LifecyclePhase::AwaitingReady => "awaiting_ready",
            LifecyclePhase::Loading => "loading",
            LifecyclePhase::Measuring => "measuring",
            LifecyclePhase::Reporting => "reporting",
            LifecyclePhase::Teardown => "teardown",
            LifecyclePhase::Done => "done",
        }
    }

    /// The phase that follows on the happy path
    pub fn next(&self) -> Option<LifecyclePhase> {
        match self {
            LifecyclePhase::Init => Some(LifecyclePhase::Provisioning),
            LifecyclePhase::Provisioning => Some(LifecyclePhase::AwaitingReady),
            LifecyclePhase::AwaitingReady => Some(LifecyclePhase::Loading),
            LifecyclePhase::Loading => Some(LifecyclePhase::Measuring),
            LifecyclePhase::Measuring => Some(LifecyclePhase::Reporting),
            LifecyclePhase::Reporting => Some(LifecyclePhase::Teardown),
            LifecyclePhase::Teardown => Some(LifecyclePhase::Done),
            LifecyclePhase::Done => None,
        }
    }

    /// Whether `to` is reachable in one step
    ///
    /// Every phase except `Teardown` and `Done` may jump straight to
    /// `Teardown`.
    pub fn can_transition_to(&self, to: LifecyclePhase) -> bool {
        if self.next() == Some(to) {
            return true;
        }
        to == LifecyclePhase::Teardown
            && !matches!(self, LifecyclePhase::Teardown | LifecyclePhase::Done)
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current phase and rejects illegal transitions
#[derive(Debug, Clone)]
pub struct Lifecycle {
    phase: LifecyclePhase,
    visited: Vec<LifecyclePhase>,
}

impl Lifecycle {
    /// Start in [`LifecyclePhase::Init`]
    pub fn new() -> Self {
        Self {
            phase: LifecyclePhase::Init,
            visited: vec![LifecyclePhase::Init],
        }
    }

    /// Current phase
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Phases entered so far, in order
    pub fn visited(&self) -> &[LifecyclePhase] {
        &self.visited
    }

    /// Move to `to`
    pub fn advance(&mut self, to: LifecyclePhase) -> BenchResult<()> {
        if !self.phase.can_transition_to(to) {
            return Err(BenchError::internal(format!(
                "illegal lifecycle transition {} -> {}",
                self.phase, to
            ))
            .in_phase(self.phase));
        }
        tracing::debug!(from = %self.phase, to = %to, "Entering phase");
        self.phase = to;
        self.visited.push(to);
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
