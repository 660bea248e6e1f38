//! Cooperative cancellation and interrupt handling
//!
//! A [`CancellationFlag`] is threaded explicitly into every loop that must
//! observe an interrupt (readiness probing, batch insertion, queries). The
//! [`InterruptCoordinator`] owns the signal listeners and is the only writer
//! of the flag in production; tests set the flag directly.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shared, set-once cancellation flag
///
/// Cloning is cheap; all clones observe the same flag. Once set it is never
/// cleared.
#[derive(Clone, Debug)]
pub struct CancellationFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationFlag {
    /// Create a new, clear flag
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the flag
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// flag was already set.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Check the flag without waiting
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the flag is set
    ///
    /// Returns immediately if it already is.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// State of the interrupt coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptState {
    /// Listening, flag clear
    Armed,
    /// Interrupt received, flag set, cleanup in progress
    ///
    /// The signal listener releases nothing itself. Resource release is
    /// left to the main flow: the readiness wait and the workload loops
    /// stop at their next flag check, and the orchestrator then releases
    /// the service lease. An operation already in flight finishes first.
    Cancelling,
    /// Cleanup finished; process exit follows
    Cancelled,
}

impl InterruptState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => InterruptState::Armed,
            1 => InterruptState::Cancelling,
            _ => InterruptState::Cancelled,
        }
    }
}

/// Listens for termination signals and flips the cancellation flag
///
/// Only the first interrupt has an effect; later ones are ignored.
pub struct InterruptCoordinator {
    flag: CancellationFlag,
    state: Arc<AtomicU8>,
    listener: Option<JoinHandle<()>>,
}

impl InterruptCoordinator {
    /// Create a coordinator without installing signal listeners
    pub fn new(flag: CancellationFlag) -> Self {
        Self {
            flag,
            state: Arc::new(AtomicU8::new(0)),
            listener: None,
        }
    }

    /// Create a coordinator and install Ctrl-C (and SIGTERM on unix) listeners
    ///
    /// Must be called from within a tokio runtime.
    pub fn install(flag: CancellationFlag) -> Self {
        let mut coordinator = Self::new(flag);
        let flag = coordinator.flag.clone();
        let state = Arc::clone(&coordinator.state);

        coordinator.listener = Some(tokio::spawn(async move {
            loop {
                match wait_for_signal().await {
                    Ok(signal) => {
                        trigger_with(&flag, &state, signal);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to listen for termination signals");
                        break;
                    }
                }
            }
        }));

        coordinator
    }

    /// The flag this coordinator controls
    pub fn flag(&self) -> &CancellationFlag {
        &self.flag
    }

    /// Current state
    pub fn state(&self) -> InterruptState {
        InterruptState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Deliver an interrupt as if a signal had arrived
    ///
    /// Returns `true` if this moved the coordinator from Armed to Cancelling.
    pub fn trigger(&self, source: &str) -> bool {
        trigger_with(&self.flag, &self.state, source)
    }

    /// Mark cleanup as finished (Cancelling -> Cancelled)
    ///
    /// Has no effect unless an interrupt was received.
    pub fn finish(&self) -> InterruptState {
        let _ = self
            .state
            .compare_exchange(1, 2, Ordering::SeqCst, Ordering::SeqCst);
        self.state()
    }
}

impl Drop for InterruptCoordinator {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for InterruptCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptCoordinator")
            .field("state", &self.state())
            .field("listening", &self.listener.is_some())
            .finish()
    }
}

fn trigger_with(flag: &CancellationFlag, state: &AtomicU8, source: &str) -> bool {
    if state
        .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        flag.cancel();
        tracing::info!(signal = source, "Interrupt received, cleaning up...");
        true
    } else {
        tracing::debug!(signal = source, "Interrupt ignored, already cancelling");
        false
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
