//! Error types for vecbench-core

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::LifecyclePhase;

/// Classification of a failure, used for exit codes and log context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// User-supplied configuration is invalid
    InvalidConfig,
    /// The run needs privileges the current user does not have
    PrivilegeRequired,
    /// The service instance failed to start
    Provisioning,
    /// The service never became ready within the readiness timeout
    ReadinessTimeout,
    /// The service could not be reached over the network
    Connection,
    /// A single write or query operation failed
    Operation,
    /// An external control-plane command failed
    Process,
    /// The run was cancelled by an interrupt
    Cancelled,
    /// Anything else (builder misuse, internal invariant broken)
    Internal,
}

impl ErrorKind {
    /// Process exit code for this error class
    ///
    /// Follows the `sysexits.h` convention where one exists.
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::InvalidConfig => 2,
            ErrorKind::PrivilegeRequired => 77,
            ErrorKind::Connection => 69,
            ErrorKind::Cancelled => 0,
            ErrorKind::Provisioning
            | ErrorKind::ReadinessTimeout
            | ErrorKind::Operation
            | ErrorKind::Process
            | ErrorKind::Internal => 1,
        }
    }

    /// Short identifier used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::PrivilegeRequired => "privilege_required",
            ErrorKind::Provisioning => "provisioning",
            ErrorKind::ReadinessTimeout => "readiness_timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::Operation => "operation",
            ErrorKind::Process => "process",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type
///
/// Carries a kind for classification, a human readable message and, once
/// the orchestrator has seen it, the lifecycle phase it surfaced in.
#[derive(Error, Debug, Clone)]
#[error("{kind} error: {message}")]
pub struct BenchError {
    /// Error classification
    pub kind: ErrorKind,

    /// Human readable description including command or endpoint context
    pub message: String,

    /// Lifecycle phase the error was raised in, if known
    pub phase: Option<LifecyclePhase>,
}

impl BenchError {
    /// Create a new error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            phase: None,
        }
    }

    /// Attach the lifecycle phase, keeping an existing one
    pub fn in_phase(mut self, phase: LifecyclePhase) -> Self {
        self.phase.get_or_insert(phase);
        self
    }

    /// Invalid configuration value
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, message)
    }

    /// A required builder field was never set
    pub fn missing_config(field: &str) -> Self {
        Self::new(
            ErrorKind::Internal,
            format!("missing required component: {field}"),
        )
    }

    /// Insufficient privileges
    pub fn privilege(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PrivilegeRequired, message)
    }

    /// Instance failed to start
    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Provisioning, message)
    }

    /// Instance did not become ready in time
    pub fn readiness_timeout(endpoint: &str, attempts: u32, timeout: std::time::Duration) -> Self {
        Self::new(
            ErrorKind::ReadinessTimeout,
            format!(
                "{endpoint} did not become ready within {:.0}s ({attempts} probes)",
                timeout.as_secs_f64()
            ),
        )
    }

    /// A single write or query failed
    pub fn operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Operation, message)
    }

    /// Network-level failure reaching the service
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// External command failure
    pub fn process(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Process, message)
    }

    /// Internal invariant violation
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Exit code for this error
    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

impl From<crate::config::ConfigError> for BenchError {
    fn from(err: crate::config::ConfigError) -> Self {
        BenchError::config(err.to_string())
    }
}

impl From<crate::process::ProcessError> for BenchError {
    fn from(err: crate::process::ProcessError) -> Self {
        BenchError::process(err.to_string())
    }
}

impl From<crate::traits::ServiceError> for BenchError {
    fn from(err: crate::traits::ServiceError) -> Self {
        let kind = if err.is_connection() {
            ErrorKind::Connection
        } else {
            ErrorKind::Operation
        };
        BenchError::new(kind, err.to_string())
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
