//! ExecResult: the result of every command the shell runs.

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// The result of executing one command line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecResult {
    /// Exit code. 0 means success.
    pub code: i64,
    /// Text destined for stdout.
    pub out: String,
    /// Text destined for stderr.
    pub err: String,
}

impl ExecResult {
    /// Create a successful result with output.
    pub fn success(out: impl Into<String>) -> Self {
        Self {
            code: 0,
            out: out.into(),
            err: String::new(),
        }
    }

    /// Create a failed result with an error message.
    pub fn failure(code: i64, err: impl Into<String>) -> Self {
        Self {
            code,
            out: String::new(),
            err: err.into(),
        }
    }

    /// Create a result carrying only an exit code, for commands whose output
    /// already went straight to the terminal.
    pub fn from_code(code: i64) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    /// True if the exit code is 0.
    pub fn ok(&self) -> bool {
        self.code == 0
    }
}

impl From<JobError> for ExecResult {
    fn from(err: JobError) -> Self {
        ExecResult::failure(err.exit_code(), err.to_string())
    }
}
