//! Job controller: the `jobs`, `fg`, `bg`, `kill` and `quit kill` logic.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use smash_types::{JobError, JobId, JobInfo, JobResult};

use super::control::{JobControl, WaitOutcome};
use super::host::ChildChange;

/// Default wait between SIGTERM and SIGKILL in [`JobController::terminate_all`].
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// How often a terminating job is polled for exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for a SIGKILLed job to become reapable.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// Which job an `fg`/`bg` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTarget {
    /// No id given: `fg` takes the oldest job, `bg` the most recently stopped.
    Latest,
    Id(JobId),
}

impl From<Option<JobId>> for JobTarget {
    fn from(id: Option<JobId>) -> Self {
        id.map(JobTarget::Id).unwrap_or(JobTarget::Latest)
    }
}

/// Result of `fg` once the job hands control back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundReturn {
    pub job: JobInfo,
    pub outcome: WaitOutcome,
}

/// What `terminate_all` did, job by job.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Jobs that exited within the grace period.
    pub terminated: Vec<JobId>,
    /// Jobs that needed SIGKILL.
    pub killed: Vec<JobId>,
    /// Signal failures; processing went on regardless.
    pub failures: Vec<(JobId, JobError)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Command-level job operations over the shared job state.
#[derive(Debug, Clone)]
pub struct JobController {
    control: Arc<JobControl>,
}

impl JobController {
    pub fn new(control: Arc<JobControl>) -> Self {
        Self { control }
    }

    pub fn control(&self) -> &Arc<JobControl> {
        &self.control
    }

    /// Jobs in table order.
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        self.control.jobs()
    }

    /// Resume a job in the foreground and wait for it.
    ///
    /// With [`JobTarget::Latest`] this picks the job with the *earliest*
    /// start time. An empty table is a successful no-op (`Ok(None)`).
    pub async fn bring_to_foreground<W: Write + Send>(
        &self,
        target: JobTarget,
        out: &mut W,
    ) -> JobResult<Option<ForegroundReturn>> {
        let (job, pid) = {
            let mut state = self.control.lock();
            if state.jobs.is_empty() {
                return Ok(None);
            }

            let found = match target {
                JobTarget::Latest => state.jobs.oldest(),
                JobTarget::Id(id) => state.jobs.find_by_id(id),
            };
            let (info, pid, stopped) = match (found, target) {
                (Some(j), _) => (j.info(Instant::now()), j.pid(), j.is_stopped()),
                (None, JobTarget::Id(id)) => return Err(JobError::NoSuchJob(id)),
                (None, JobTarget::Latest) => return Ok(None),
            };

            let _ = writeln!(out, "{}", info.command);
            state.foreground = Some(pid);
            if stopped {
                if let Err(e) = self.control.send_signal(pid, Signal::SIGCONT, &mut *out) {
                    state.foreground = None;
                    return Err(e);
                }
                state.jobs.mark_running(pid);
            }
            (info, pid)
        };

        let outcome = self.control.wait_for_job(pid).await?;
        Ok(Some(ForegroundReturn { job, outcome }))
    }

    /// Resume a job in the background without waiting.
    ///
    /// With [`JobTarget::Latest`] this picks the most recently stopped job;
    /// if none is stopped it is a successful no-op (`Ok(None)`).
    pub fn send_to_background<W: Write>(
        &self,
        target: JobTarget,
        out: &mut W,
    ) -> JobResult<Option<JobInfo>> {
        let mut state = self.control.lock();
        let found = match target {
            JobTarget::Latest => match state.jobs.newest_stopped() {
                Some(job) => job,
                None => return Ok(None),
            },
            JobTarget::Id(id) => state.jobs.find_by_id(id).ok_or(JobError::NoSuchJob(id))?,
        };
        let info = found.info(Instant::now());
        let pid = found.pid();

        let _ = writeln!(out, "{}", info.command);
        self.control.send_signal(pid, Signal::SIGCONT, &mut *out)?;
        state.jobs.mark_running(pid);
        Ok(Some(info))
    }

    /// `kill -<signum> <id>`: deliver a numeric signal to a job.
    ///
    /// The number goes to kill(2) as typed, so `0` and realtime signals work.
    /// The table is not touched; if the signal is fatal, the bridge removes
    /// the job once the exit is observed.
    pub fn send_signal<W: Write>(
        &self,
        id: JobId,
        signum: i32,
        out: &mut W,
    ) -> JobResult<JobInfo> {
        let info = self.control.job(id).ok_or(JobError::NoSuchJob(id))?;
        self.control
            .send_signal_number(Pid::from_raw(info.pid), signum, &mut *out)?;
        Ok(info)
    }

    /// Terminate every job: SIGTERM, wait up to `grace`, then SIGKILL.
    ///
    /// Best effort: a signal that cannot be delivered is recorded in the
    /// report and the next job is handled anyway. Every job is removed from
    /// the table. Progress lines go to `out`. This does not exit the process;
    /// `quit kill` does that after it returns.
    pub async fn terminate_all<W: Write + Send>(
        &self,
        grace: Duration,
        out: &mut W,
    ) -> ShutdownReport {
        let targets: Vec<(JobId, Pid, bool)> = {
            let mut state = self.control.lock();
            state.draining = true;
            state
                .jobs
                .iter()
                .map(|j| (j.id(), j.pid(), j.is_stopped()))
                .collect()
        };

        let mut report = ShutdownReport::default();
        for (id, pid, stopped) in targets {
            tracing::info!(job = %id, pid = pid.as_raw(), "terminating job");
            let _ = write!(out, "[{}] Sending SIGTERM... ", id);
            let _ = out.flush();

            match self.control.send_signal(pid, Signal::SIGTERM, &mut *out) {
                // A stopped job only acts on SIGTERM once continued.
                Ok(()) if stopped => {
                    if let Err(e) = self.control.send_signal(pid, Signal::SIGCONT, &mut *out) {
                        report.failures.push((id, e));
                    }
                }
                Ok(()) => {}
                Err(e) => report.failures.push((id, e)),
            }

            if self.await_exit(pid, grace).await {
                report.terminated.push(id);
            } else {
                let _ = write!(out, "({} seconds passed) Sending SIGKILL... ", grace.as_secs());
                let _ = out.flush();
                match self.control.send_signal(pid, Signal::SIGKILL, &mut *out) {
                    Ok(()) => {
                        self.await_exit(pid, KILL_REAP_TIMEOUT).await;
                        report.killed.push(id);
                    }
                    Err(e) => report.failures.push((id, e)),
                }
            }
            let _ = writeln!(out, "Done.");

            self.control.lock().jobs.remove(id);
        }

        let mut state = self.control.lock();
        state.draining = false;
        state.foreground = None;
        drop(state);

        report
    }

    /// Poll `pid` until it exits or `timeout` elapses. Returns true if it is
    /// gone.
    async fn await_exit(&self, pid: Pid, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.control.host().poll(pid) {
                Ok(status) if ChildChange::from_status(status).is_terminal() => return true,
                Ok(_) => {}
                Err(Errno::ECHILD) => return true,
                Err(e) => {
                    tracing::warn!(pid = pid.as_raw(), "waitpid failed: {}", e);
                    return false;
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
