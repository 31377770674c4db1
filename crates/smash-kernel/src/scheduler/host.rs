//! The OS seam: process creation, signal delivery, status queries.
//!
//! Everything above this module talks to `ProcessHost`, so the job-control
//! state machine can be driven by a scripted host in tests.

use std::ffi::CString;
use std::ptr;

use nix::errno::Errno;
use nix::libc::{self, c_char};
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use smash_types::{JobError, JobResult};

/// Exit status of a child whose program image could not be loaded.
pub const EXEC_FAILED_STATUS: i32 = 127;

/// Process operations the job-control core needs from the OS.
pub trait ProcessHost: Send + Sync + 'static {
    /// Start `argv[0]` with `argv` in a new process group.
    ///
    /// Only failure to create the process is an error here. A program that
    /// cannot be executed shows up later as an exit with
    /// [`EXEC_FAILED_STATUS`].
    fn spawn(&self, argv: &[String]) -> JobResult<Pid>;

    /// Deliver signal number `signum` to `pid`.
    ///
    /// Any number kill(2) takes is passed through, including 0 and the
    /// realtime range; the OS decides what is valid.
    fn signal(&self, pid: Pid, signum: i32) -> nix::Result<()>;

    /// Non-blocking status query, reporting stops and continues as well as
    /// exits. Returns `WaitStatus::StillAlive` when nothing changed.
    fn poll(&self, pid: Pid) -> nix::Result<WaitStatus>;

    /// Block until `pid` exits, is killed, or stops.
    fn wait(&self, pid: Pid) -> nix::Result<WaitStatus>;
}

/// What a wait status means for the job table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildChange {
    /// Exited normally with a status code.
    Exited(i32),
    /// Terminated by a signal.
    Killed(Signal),
    /// Suspended by a signal.
    Stopped(Signal),
    /// Resumed after a stop.
    Continued,
    /// No change to report.
    Unchanged,
}

impl ChildChange {
    pub fn from_status(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Exited(_, code) => ChildChange::Exited(code),
            WaitStatus::Signaled(_, sig, _) => ChildChange::Killed(sig),
            WaitStatus::Stopped(_, sig) => ChildChange::Stopped(sig),
            WaitStatus::Continued(_) => ChildChange::Continued,
            _ => ChildChange::Unchanged,
        }
    }

    /// True if the process is gone and its job must be removed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChildChange::Exited(_) | ChildChange::Killed(_))
    }
}

/// The real host: fork/exec, kill(2), waitpid(2).
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixHost;

impl UnixHost {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessHost for UnixHost {
    fn spawn(&self, argv: &[String]) -> JobResult<Pid> {
        let command = argv
            .first()
            .ok_or_else(|| JobError::InvalidArguments("empty command".to_string()))?;

        // Everything the child touches is prepared before fork, including
        // the null-terminated pointer array execvp(3) reads.
        let args = argv
            .iter()
            .map(|a| CString::new(a.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| JobError::InvalidArguments(format!("{command}: argument contains NUL")))?;
        let arg_ptrs: Vec<*const c_char> = args
            .iter()
            .map(|a| a.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        let prefix = format!("smash: {command}: ");

        // SAFETY: after fork the child only calls setpgid, execvp, write and
        // _exit through libc, and touches only memory allocated above.
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Parent { child }) => {
                // Also set from the parent so the group exists before any
                // signal is forwarded, whichever side runs first.
                if let Err(e) = unistd::setpgid(child, child) {
                    // EACCES: the child already exec'd after joining its group.
                    if e != Errno::EACCES {
                        tracing::debug!(pid = child.as_raw(), "setpgid from parent: {}", e);
                    }
                }
                Ok(child)
            }
            Ok(ForkResult::Child) => {
                // SAFETY: arg_ptrs is null-terminated and points into `args`,
                // both alive until exec or _exit.
                unsafe {
                    libc::setpgid(0, 0);
                    libc::execvp(arg_ptrs[0], arg_ptrs.as_ptr());
                }
                let err = Errno::last();
                let stderr = std::io::stderr();
                let _ = unistd::write(&stderr, prefix.as_bytes());
                let _ = unistd::write(&stderr, err.desc().as_bytes());
                let _ = unistd::write(&stderr, b"\n");
                // SAFETY: _exit skips atexit handlers and stdio teardown that
                // belong to the parent.
                unsafe { libc::_exit(EXEC_FAILED_STATUS) }
            }
            Err(e) => Err(JobError::LaunchFailed {
                command: command.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn signal(&self, pid: Pid, signum: i32) -> nix::Result<()> {
        // nix::sys::signal::kill only takes named signals.
        // SAFETY: kill(2) has no memory preconditions.
        let rc = unsafe { libc::kill(pid.as_raw(), signum) };
        Errno::result(rc).map(drop)
    }

    fn poll(&self, pid: Pid) -> nix::Result<WaitStatus> {
        waitpid(
            pid,
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED),
        )
    }

    fn wait(&self, pid: Pid) -> nix::Result<WaitStatus> {
        loop {
            match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
                Err(Errno::EINTR) => continue,
                // A continue report is not a reason to hand control back.
                Ok(WaitStatus::Continued(_)) => continue,
                other => return other,
            }
        }
    }
}
