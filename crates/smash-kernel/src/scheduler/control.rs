//! Shared job-control state.
//!
//! The job table and the foreground pid are the only state touched by both
//! the command path and the signal bridge. They live behind one mutex, and
//! every multi-step change (spawn + insert + claim foreground, poll + remove)
//! happens inside a single critical section. The lock is never held across an
//! `.await` or a blocking wait.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use smash_types::{JobError, JobId, JobInfo, JobResult};

use super::host::ProcessHost;
use super::table::JobTable;

/// How a waited-on job handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Exited with a status code.
    Exited(i32),
    /// Terminated by a signal.
    Killed(Signal),
    /// Suspended; still in the table.
    Stopped(Signal),
    /// Already reaped by someone else; the status is unknown.
    Reaped,
}

impl WaitOutcome {
    /// Shell-style status: the exit code, or 128 + signal number.
    pub fn exit_code(&self) -> i64 {
        match self {
            WaitOutcome::Exited(code) => *code as i64,
            WaitOutcome::Killed(sig) | WaitOutcome::Stopped(sig) => 128 + *sig as i64,
            WaitOutcome::Reaped => 0,
        }
    }
}

/// Everything guarded by the job-control mutex.
#[derive(Debug, Default)]
pub struct ControlState {
    pub jobs: JobTable,
    /// The job currently holding the shell's attention, if any.
    pub foreground: Option<Pid>,
    /// Set while `terminate_all` owns reaping; the bridge stands down.
    pub draining: bool,
}

/// Handle to the session's job state and the OS host that backs it.
pub struct JobControl {
    host: Arc<dyn ProcessHost>,
    state: Mutex<ControlState>,
    echo_signals: bool,
}

impl JobControl {
    pub fn new(host: Arc<dyn ProcessHost>) -> Self {
        Self {
            host,
            state: Mutex::new(ControlState::default()),
            echo_signals: false,
        }
    }

    /// Print `signal <NAME> was sent to pid <pid>` for every delivered signal.
    pub fn with_echo_signals(mut self, echo: bool) -> Self {
        self.echo_signals = echo;
        self
    }

    pub fn host(&self) -> &Arc<dyn ProcessHost> {
        &self.host
    }

    /// Enter the critical section.
    ///
    /// A panic while holding the lock leaves the table in a consistent state
    /// (every mutation is a single call), so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn foreground_pid(&self) -> Option<Pid> {
        self.lock().foreground
    }

    /// Listing snapshot in insertion order.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.lock().jobs.infos()
    }

    pub fn job(&self, id: JobId) -> Option<JobInfo> {
        self.lock()
            .jobs
            .find_by_id(id)
            .map(|j| j.info(std::time::Instant::now()))
    }

    /// Deliver `sig` to `pid` through the host and, with echo on, write
    /// `signal <NAME> was sent to pid <pid>` to `out`.
    ///
    /// Does not take the lock, so it may be called from inside a critical
    /// section.
    pub fn send_signal(&self, pid: Pid, sig: Signal, out: &mut dyn Write) -> JobResult<()> {
        self.send_signal_number(pid, sig as i32, out)
    }

    /// Like [`send_signal`](Self::send_signal) for a raw signal number, as
    /// typed after `kill -`.
    pub fn send_signal_number(
        &self,
        pid: Pid,
        signum: i32,
        out: &mut dyn Write,
    ) -> JobResult<()> {
        let name = signal_name(signum);
        if pid.as_raw() <= 0 {
            return Err(JobError::SignalFailed {
                pid: pid.as_raw(),
                signal: name,
                reason: "refusing to signal a process group".to_string(),
            });
        }

        match self.host.signal(pid, signum) {
            Ok(()) => {
                tracing::debug!(pid = pid.as_raw(), signal = %name, "signal delivered");
                if self.echo_signals {
                    let _ = writeln!(out, "signal {} was sent to pid {}", name, pid);
                }
                Ok(())
            }
            Err(errno) => {
                tracing::warn!(pid = pid.as_raw(), signal = %name, "kill failed: {}", errno);
                Err(JobError::SignalFailed {
                    pid: pid.as_raw(),
                    signal: name,
                    reason: errno.to_string(),
                })
            }
        }
    }
}

/// `SIGTERM` for named signals, the bare number otherwise.
fn signal_name(signum: i32) -> String {
    Signal::try_from(signum)
        .map(|sig| sig.as_str().to_string())
        .unwrap_or_else(|_| signum.to_string())
}

impl std::fmt::Debug for JobControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobControl")
            .field("state", &*self.lock())
            .field("echo_signals", &self.echo_signals)
            .finish()
    }
}
