//! Job identification and status types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Shell-local job number.
///
/// Allocated from 1 upwards and never reused within a session, even after
/// the job it named has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(JobId)
    }
}

/// Status of a live job.
///
/// Exited jobs are removed from the table rather than kept with a terminal
/// status, so only the two live states exist here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job is executing (in the foreground or the background).
    Running,
    /// Job was suspended by a stop signal (e.g., Ctrl-Z / SIGTSTP).
    Stopped,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Snapshot of a job for listing and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job ID.
    pub id: JobId,
    /// Command line the job was launched with.
    pub command: String,
    /// OS process ID of the job leader.
    pub pid: i32,
    /// Whole seconds since the job was started.
    pub elapsed_secs: u64,
    /// Current status.
    pub status: JobStatus,
}

impl JobInfo {
    pub fn is_stopped(&self) -> bool {
        self.status == JobStatus::Stopped
    }
}

/// Renders the `jobs` line: `[<id>] <name> : <pid> <elapsed>s`, with a
/// trailing `Stopped` marker for suspended jobs.
impl fmt::Display for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} : {} {}s",
            self.id, self.command, self.pid, self.elapsed_secs
        )?;
        if self.is_stopped() {
            write!(f, " Stopped")?;
        }
        Ok(())
    }
}
