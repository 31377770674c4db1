//! Process launcher: spawn a child and install it as a job.

use nix::unistd::Pid;
use smash_types::{JobError, JobId, JobResult};

use super::control::{JobControl, WaitOutcome};

/// Whether the caller waits for the new job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Foreground,
    Background,
}

/// A job that was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launched {
    pub id: JobId,
    pub pid: Pid,
    /// How a foreground job handed control back; `None` for background.
    pub outcome: Option<WaitOutcome>,
}

impl JobControl {
    /// Start `argv` as a new job named `command`.
    ///
    /// Spawn, table insertion and claiming the foreground slot happen in one
    /// critical section, so a child that dies instantly is still found by
    /// the bridge (or by our own wait) rather than slipping through.
    pub async fn launch(
        &self,
        argv: &[String],
        command: &str,
        mode: LaunchMode,
    ) -> JobResult<Launched> {
        if argv.is_empty() {
            return Err(JobError::InvalidArguments("empty command".to_string()));
        }

        let (id, pid) = {
            let mut state = self.lock();
            let pid = self.host().spawn(argv)?;
            let id = state.jobs.insert(pid, command);
            if mode == LaunchMode::Foreground {
                state.foreground = Some(pid);
            }
            (id, pid)
        };
        tracing::debug!(job = %id, pid = pid.as_raw(), ?mode, command, "launched");

        let outcome = match mode {
            LaunchMode::Foreground => Some(self.wait_for_job(pid).await?),
            LaunchMode::Background => None,
        };

        Ok(Launched { id, pid, outcome })
    }
}
