//! Service lease: guaranteed, single teardown of the provisioned instance

use std::sync::Arc;

use tokio::runtime::RuntimeFlavor;

use crate::traits::{ContainerBackend, ServiceHandle, TeardownWarning};

/// What happened during teardown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Whether inspection found an out-of-memory kill; `None` if inspection failed
    pub oom_killed: Option<bool>,
    /// Non-fatal cleanup problems
    pub warnings: Vec<TeardownWarning>,
}

/// Ownership of the provisioned instance for the duration of a run
///
/// Registered before provisioning starts, so a half-started instance is
/// still cleaned up. [`ServiceLease::release`] runs teardown at most once.
///
/// A lease dropped without release (for example while a panic unwinds)
/// tears down from `Drop`. On a multi-threaded runtime this blocks the
/// dropping thread until teardown finishes, so it completes even if the
/// runtime shuts down right after. On a current-thread runtime it can only
/// spawn a detached task, which never runs if the runtime is shutting down;
/// the container then has to be removed by hand.
pub struct ServiceLease {
    backend: Arc<dyn ContainerBackend>,
    name: String,
    handle: Option<ServiceHandle>,
    released: bool,
}

impl ServiceLease {
    /// Register a lease for the instance called `name`
    pub fn register(backend: Arc<dyn ContainerBackend>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
            handle: None,
            released: false,
        }
    }

    /// Record the handle of the started instance
    pub fn attach(&mut self, handle: ServiceHandle) {
        self.handle = Some(handle);
    }

    /// Handle of the live instance, if provisioning succeeded and teardown has not run
    pub fn handle(&self) -> Option<&ServiceHandle> {
        self.handle.as_ref()
    }

    /// Instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether teardown already ran
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Inspect for an OOM kill, then stop and remove the instance
    ///
    /// A second call is a no-op and returns an empty report.
    pub async fn release(&mut self) -> TeardownReport {
        if self.released {
            return TeardownReport::default();
        }
        self.released = true;

        tracing::info!(container = %self.name, "Cleaning up");

        let oom_killed = match self.backend.inspect(&self.name).await {
            Ok(status) => {
                if status.oom_killed {
                    tracing::error!(
                        container = %self.name,
                        "Container was killed due to Out of Memory (OOM)"
                    );
                } else {
                    tracing::debug!(
                        container = %self.name,
                        status = %status.status,
                        exit_code = ?status.exit_code,
                        "Container state before teardown"
                    );
                }
                Some(status.oom_killed)
            }
            Err(e) => {
                tracing::debug!(container = %self.name, error = %e, "Could not inspect container");
                None
            }
        };

        let warnings = self.backend.teardown(&self.name).await;
        for warning in &warnings {
            tracing::warn!(container = %self.name, "{warning}");
        }
        self.handle = None;

        TeardownReport {
            oom_killed,
            warnings,
        }
    }
}

impl Drop for ServiceLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        tracing::error!(container = %self.name, "Service lease dropped without teardown");

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::error!(
                    container = %self.name,
                    "No runtime available; remove the container manually"
                );
                return;
            }
        };

        let backend = Arc::clone(&self.backend);
        let name = std::mem::take(&mut self.name);
        let teardown = async move {
            for warning in backend.teardown(&name).await {
                tracing::warn!(container = %name, "{warning}");
            }
        };

        match runtime.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| runtime.block_on(teardown));
            }
            _ => {
                tracing::warn!("Scheduling detached teardown; it is lost if the runtime stops first");
                runtime.spawn(teardown);
            }
        }
    }
}

impl std::fmt::Debug for ServiceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLease")
            .field("backend", &self.backend.backend_name())
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("released", &self.released)
            .finish()
    }
}
