//! Test utilities for smash.
//!
//! [`FakeHost`] stands in for the OS: it hands out predictable pids, records
//! every signal, and reports whatever wait statuses a test scripts for it.
//! [`eventually`] polls a condition from an async test.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use smash_kernel::ProcessHost;
use smash_types::{JobError, JobResult};

/// First pid handed out by a new [`FakeHost`].
pub const FIRST_PID: i32 = 100;

#[derive(Debug, Default)]
struct FakeState {
    next_pid: i32,
    spawned: Vec<(Pid, Vec<String>)>,
    pending: HashMap<Pid, VecDeque<WaitStatus>>,
    reaped: HashSet<Pid>,
    signals: Vec<(Pid, i32)>,
    reactions: HashMap<(Pid, i32), WaitStatus>,
    wait_errors: HashMap<Pid, Errno>,
    refuse_signals: HashSet<Pid>,
    fail_spawn: bool,
}

/// Scripted process host.
///
/// - `spawn` returns pids `100, 101, …` (or fails if [`fail_spawns`](Self::fail_spawns) was set).
/// - `deliver` queues a status change for a pid; `poll` and `wait` consume
///   the queue in order. `wait` blocks until something is queued.
/// - `SIGKILL` always queues a kill; other signals queue whatever
///   [`react`](Self::react) registered. Numbers outside `0..=64` fail with
///   `EINVAL`, like kill(2) on Linux.
#[derive(Debug)]
pub struct FakeHost {
    state: Mutex<FakeState>,
    changed: Condvar,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_pid: FIRST_PID,
                ..FakeState::default()
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a status change for `pid`.
    pub fn deliver(&self, pid: Pid, status: WaitStatus) {
        self.lock().pending.entry(pid).or_default().push_back(status);
        self.changed.notify_all();
    }

    pub fn deliver_exit(&self, pid: Pid, code: i32) {
        self.deliver(pid, WaitStatus::Exited(pid, code));
    }

    pub fn deliver_stop(&self, pid: Pid) {
        self.deliver(pid, WaitStatus::Stopped(pid, Signal::SIGTSTP));
    }

    pub fn deliver_continue(&self, pid: Pid) {
        self.deliver(pid, WaitStatus::Continued(pid));
    }

    /// When `signal` reaches `pid`, queue `status` for it.
    pub fn react(&self, pid: Pid, signal: Signal, status: WaitStatus) {
        self.lock().reactions.insert((pid, signal as i32), status);
    }

    /// Make the next `wait` on `pid` fail with `errno`.
    pub fn fail_next_wait(&self, pid: Pid, errno: Errno) {
        self.lock().wait_errors.insert(pid, errno);
        self.changed.notify_all();
    }

    /// Make every signal to `pid` fail with `ESRCH`.
    pub fn refuse_signals_to(&self, pid: Pid) {
        self.lock().refuse_signals.insert(pid);
    }

    /// Make every later `spawn` fail as if fork returned `EAGAIN`.
    pub fn fail_spawns(&self) {
        self.lock().fail_spawn = true;
    }

    /// Named signals delivered so far, in order.
    pub fn signals(&self) -> Vec<(Pid, Signal)> {
        self.lock()
            .signals
            .iter()
            .filter_map(|(p, n)| Signal::try_from(*n).ok().map(|s| (*p, s)))
            .collect()
    }

    /// Named signals delivered to `pid`, in order.
    pub fn signals_to(&self, pid: Pid) -> Vec<Signal> {
        self.signals()
            .into_iter()
            .filter(|(p, _)| *p == pid)
            .map(|(_, s)| s)
            .collect()
    }

    /// Every signal number delivered to `pid`, named or not.
    pub fn signal_numbers_to(&self, pid: Pid) -> Vec<i32> {
        self.lock()
            .signals
            .iter()
            .filter(|(p, _)| *p == pid)
            .map(|(_, n)| *n)
            .collect()
    }

    /// Argument vectors passed to `spawn`, with the pid each got.
    pub fn spawned(&self) -> Vec<(Pid, Vec<String>)> {
        self.lock().spawned.clone()
    }

    fn take(state: &mut FakeState, pid: Pid) -> Option<WaitStatus> {
        let status = state.pending.get_mut(&pid)?.pop_front()?;
        if matches!(status, WaitStatus::Exited(..) | WaitStatus::Signaled(..)) {
            state.reaped.insert(pid);
        }
        Some(status)
    }

    fn known(state: &FakeState, pid: Pid) -> bool {
        state.spawned.iter().any(|(p, _)| *p == pid) && !state.reaped.contains(&pid)
    }
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessHost for FakeHost {
    fn spawn(&self, argv: &[String]) -> JobResult<Pid> {
        let mut state = self.lock();
        if state.fail_spawn {
            return Err(JobError::LaunchFailed {
                command: argv.first().cloned().unwrap_or_default(),
                reason: Errno::EAGAIN.to_string(),
            });
        }
        let pid = Pid::from_raw(state.next_pid);
        state.next_pid += 1;
        state.spawned.push((pid, argv.to_vec()));
        Ok(pid)
    }

    fn signal(&self, pid: Pid, signum: i32) -> nix::Result<()> {
        let mut state = self.lock();
        if !(0..=64).contains(&signum) {
            return Err(Errno::EINVAL);
        }
        if state.refuse_signals.contains(&pid) || !Self::known(&state, pid) {
            return Err(Errno::ESRCH);
        }
        state.signals.push((pid, signum));

        let reaction = if signum == Signal::SIGKILL as i32 {
            Some(WaitStatus::Signaled(pid, Signal::SIGKILL, false))
        } else {
            state.reactions.get(&(pid, signum)).copied()
        };
        if let Some(status) = reaction {
            state.pending.entry(pid).or_default().push_back(status);
            drop(state);
            self.changed.notify_all();
        }
        Ok(())
    }

    fn poll(&self, pid: Pid) -> nix::Result<WaitStatus> {
        let mut state = self.lock();
        if !Self::known(&state, pid) {
            return Err(Errno::ECHILD);
        }
        Ok(Self::take(&mut state, pid).unwrap_or(WaitStatus::StillAlive))
    }

    fn wait(&self, pid: Pid) -> nix::Result<WaitStatus> {
        let mut state = self.lock();
        loop {
            if let Some(errno) = state.wait_errors.remove(&pid) {
                return Err(errno);
            }
            if !Self::known(&state, pid) {
                return Err(Errno::ECHILD);
            }
            match Self::take(&mut state, pid) {
                // Like waitpid without WCONTINUED: continues are not reported.
                Some(WaitStatus::Continued(_)) => continue,
                Some(status) => return Ok(status),
                None => {
                    state = self
                        .changed
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// passes. Returns whether it held.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
