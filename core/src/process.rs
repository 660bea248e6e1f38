//! External command execution
//!
//! Control-plane commands (container engine, GPU tools) go through the
//! [`ProcessRunner`] trait so backends can be exercised with a fake runner.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Rendered command line, for error messages
    pub command: String,

    /// Exit code, `None` if terminated by a signal
    pub status: Option<i32>,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status zero
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a non-zero exit into [`ProcessError::NonZeroExit`]
    pub fn into_checked(self) -> Result<Self, ProcessError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ProcessError::NonZeroExit {
                command: self.command,
                code: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Errors from running an external command
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Rendered command line
        command: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The program ran but exited unsuccessfully
    #[error("`{command}` exited with {}: {stderr}", display_code(*.code))]
    NonZeroExit {
        /// Rendered command line
        command: String,
        /// Exit code, `None` if killed by a signal
        code: Option<i32>,
        /// Trimmed standard error
        stderr: String,
    },
}

impl ProcessError {
    /// Standard error text of a failed command, empty for spawn failures
    pub fn stderr(&self) -> &str {
        match self {
            ProcessError::NonZeroExit { stderr, .. } => stderr,
            ProcessError::Spawn { .. } => "",
        }
    }
}

fn display_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Render a command line for logs and errors
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs external commands to completion
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args`, wait for it to exit and capture its output
    ///
    /// A non-zero exit is not an error at this level; use
    /// [`CommandOutput::into_checked`] or [`ProcessRunner::run_checked`].
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ProcessError>;

    /// Run a command and fail on non-zero exit
    async fn run_checked(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, ProcessError> {
        self.run(program, args).await?.into_checked()
    }

    /// Whether `program` can be found on `PATH`
    fn is_available(&self, program: &str) -> bool {
        find_executable(program).is_some()
    }
}

/// [`ProcessRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    /// Create a new runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ProcessError> {
        let command = render_command(program, args);
        tracing::debug!(command = %command, "Running command");

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProcessError::Spawn {
                command: command.clone(),
                source,
            })?;

        let result = CommandOutput {
            command,
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(command = %result.command, status = ?result.status, "Command finished");
        Ok(result)
    }
}

/// Locate an executable on `PATH`
pub fn find_executable(bin: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for directory in std::env::split_paths(&path_var) {
        let candidate = directory.join(bin);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let exe_candidate = directory.join(format!("{bin}.exe"));
            if exe_candidate.is_file() {
                return Some(exe_candidate);
            }
        }
    }
    None
}
