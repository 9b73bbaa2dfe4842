//! Error types for the orchestration harness.
//!
//! Every phase is fail-fast: errors propagate to the driver, which always
//! runs teardown before mapping the error to an exit status.

use std::path::PathBuf;

use thiserror::Error;

/// Exit status used when a termination signal interrupted the run.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Errors raised while orchestrating scenarios.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("command `{command}` failed with {}: {stderr}", describe_status(.status))]
    ProcessExecution {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("session error: {0}")]
    Session(String),

    #[error("transfer of {path} failed: {reason}")]
    Transfer { path: PathBuf, reason: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("interrupted by termination signal")]
    Interrupted,
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "no exit status (killed by signal)".to_string(),
    }
}

impl HarnessError {
    /// Returns true if a command ran and reported a non-zero status.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::ProcessExecution { .. })
    }

    /// Process exit code the binary should report for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Interrupted => EXIT_INTERRUPTED,
            _ => 1,
        }
    }

    pub(crate) fn transfer(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Transfer {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<ssh2::Error> for HarnessError {
    fn from(err: ssh2::Error) -> Self {
        Self::Session(err.to_string())
    }
}

impl From<reqwest::Error> for HarnessError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HarnessError>;
