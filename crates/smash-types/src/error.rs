//! The closed set of failures a shell command can report.

use thiserror::Error;

use crate::job::JobId;

/// Result type for job-control and built-in operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-control and built-in command errors.
///
/// OS error details are carried as rendered strings so this crate stays free
/// of platform bindings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Wrong arity or malformed argument.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Job id does not resolve to a tracked job.
    #[error("job {0} does not exist")]
    NoSuchJob(JobId),

    /// Signal delivery failed (or the signal number is not a signal).
    #[error("cannot send signal {signal} to pid {pid}: {reason}")]
    SignalFailed {
        pid: i32,
        signal: String,
        reason: String,
    },

    /// The child process could not be created.
    #[error("failed to launch {command}: {reason}")]
    LaunchFailed { command: String, reason: String },

    /// A status query on a child failed.
    #[error("waitpid on pid {pid} failed: {reason}")]
    WaitFailed { pid: i32, reason: String },

    /// Filesystem rename failed.
    #[error("cannot rename {from} to {to}: {reason}")]
    RenameFailed {
        from: String,
        to: String,
        reason: String,
    },

    /// `cd` target does not exist or is not enterable.
    #[error("{0} - path not found")]
    PathNotFound(String),
}

impl JobError {
    /// Exit status reported for a command that failed with this error.
    pub fn exit_code(&self) -> i64 {
        match self {
            JobError::LaunchFailed { .. } => 126,
            _ => 1,
        }
    }
}
