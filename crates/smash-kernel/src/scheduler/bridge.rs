//! Signal bridge. Turns OS notifications into job-table changes.
//!
//! `SIGCHLD`, `SIGINT` and `SIGTSTP` aimed at the shell are received as
//! async streams and converted into [`SignalEvent`]s, which one task applies
//! in arrival order under the job-control lock. Jobs live in their own
//! process groups, so terminal keystrokes reach only the shell; the bridge
//! forwards them to whichever job is in the foreground.
//!
//! ```text
//!   SIGCHLD ─┐                         ┌─ poll every background job
//!   SIGINT  ─┼─▶ SignalEvent ─▶ handle ┼─ SIGINT  → foreground job
//!   SIGTSTP ─┘                         └─ SIGTSTP → foreground job, mark Stopped
//! ```

use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use smash_types::{JobError, JobId, JobResult};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use super::control::{ControlState, JobControl, WaitOutcome};
use super::host::ChildChange;

/// One asynchronous notification, already decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// Some child changed state (`SIGCHLD`).
    ChildChanged,
    /// User interrupt (Ctrl-C).
    Interrupt,
    /// User stop request (Ctrl-Z).
    Stop,
}

/// Applies signal events to the shared job state.
#[derive(Debug, Clone)]
pub struct SignalBridge {
    control: Arc<JobControl>,
}

impl SignalBridge {
    pub fn new(control: Arc<JobControl>) -> Self {
        Self { control }
    }

    /// Start listening for OS signals on the current tokio runtime.
    ///
    /// Installing the listeners also replaces the default dispositions, so
    /// from here on Ctrl-C and Ctrl-Z no longer terminate or suspend the
    /// shell itself.
    pub fn install(self) -> std::io::Result<JoinHandle<()>> {
        let mut child = signal(SignalKind::child())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut stop = signal(SignalKind::from_raw(Signal::SIGTSTP as i32))?;

        Ok(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(()) = child.recv() => SignalEvent::ChildChanged,
                    Some(()) = interrupt.recv() => SignalEvent::Interrupt,
                    Some(()) = stop.recv() => SignalEvent::Stop,
                    else => break,
                };
                self.handle(event);
            }
            tracing::debug!("signal streams closed; bridge exiting");
        }))
    }

    pub fn handle(&self, event: SignalEvent) {
        tracing::trace!(?event, "signal event");
        match event {
            SignalEvent::ChildChanged => self.reap_children(),
            SignalEvent::Interrupt => self.forward_interrupt(),
            SignalEvent::Stop => self.forward_stop(),
        }
    }

    /// Poll every job except the foreground one and apply what changed.
    ///
    /// Exited jobs are collected during the pass and removed after it.
    pub fn reap_children(&self) {
        let mut state = self.control.lock();
        if state.draining {
            return;
        }

        let foreground = state.foreground;
        let candidates: Vec<(JobId, Pid)> = state
            .jobs
            .iter()
            .filter(|j| Some(j.pid()) != foreground)
            .map(|j| (j.id(), j.pid()))
            .collect();

        let mut finished = Vec::new();
        for (id, pid) in candidates {
            loop {
                match self.control.host().poll(pid) {
                    Ok(status) => match ChildChange::from_status(status) {
                        ChildChange::Unchanged => break,
                        change if change.is_terminal() => {
                            tracing::debug!(job = %id, pid = pid.as_raw(), ?change, "job finished");
                            finished.push(id);
                            break;
                        }
                        change => apply_live_change(&mut state, pid, change),
                    },
                    // Not our child any more: nothing left to track.
                    Err(Errno::ECHILD) => {
                        tracing::debug!(job = %id, pid = pid.as_raw(), "job already reaped");
                        finished.push(id);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(job = %id, pid = pid.as_raw(), "waitpid failed: {}", e);
                        break;
                    }
                }
            }
        }

        for id in finished {
            state.jobs.remove(id);
        }
    }

    /// Ctrl-C: pass `SIGINT` to the foreground job. The resulting exit is
    /// applied by whoever is waiting on that job.
    pub fn forward_interrupt(&self) {
        if let Some(pid) = self.control.foreground_pid() {
            // Failure is already logged by send_signal.
            let _ = self
                .control
                .send_signal(pid, Signal::SIGINT, &mut std::io::stdout());
        }
    }

    /// Ctrl-Z: pass `SIGTSTP` to the foreground job and mark it stopped.
    pub fn forward_stop(&self) {
        let mut state = self.control.lock();
        let Some(pid) = state.foreground else {
            return;
        };
        if self
            .control
            .send_signal(pid, Signal::SIGTSTP, &mut std::io::stdout())
            .is_ok()
        {
            state.jobs.mark_stopped(pid);
        }
    }
}

fn apply_live_change(state: &mut ControlState, pid: Pid, change: ChildChange) {
    match change {
        ChildChange::Stopped(sig) => {
            tracing::debug!(pid = pid.as_raw(), signal = sig.as_str(), "job stopped");
            state.jobs.mark_stopped(pid);
        }
        ChildChange::Continued => {
            tracing::debug!(pid = pid.as_raw(), "job continued");
            state.jobs.mark_running(pid);
        }
        _ => {}
    }
}

impl JobControl {
    /// Block until the job with `pid` exits, is killed, or stops.
    ///
    /// The wait runs on the blocking pool without the lock, so the bridge
    /// keeps servicing other jobs (and can forward Ctrl-Z to this one) in
    /// the meantime. Exited jobs are removed; stopped ones stay, marked
    /// Stopped. The foreground slot is cleared whatever happened.
    pub async fn wait_for_job(&self, pid: Pid) -> JobResult<WaitOutcome> {
        let host = Arc::clone(self.host());
        let joined = tokio::task::spawn_blocking(move || host.wait(pid)).await;

        let mut state = self.lock();
        state.foreground = None;

        let status = match joined {
            Ok(status) => status,
            Err(e) => {
                return Err(JobError::WaitFailed {
                    pid: pid.as_raw(),
                    reason: e.to_string(),
                })
            }
        };

        match status {
            Ok(status) => match ChildChange::from_status(status) {
                ChildChange::Exited(code) => {
                    state.jobs.remove_by_pid(pid);
                    Ok(WaitOutcome::Exited(code))
                }
                ChildChange::Killed(sig) => {
                    state.jobs.remove_by_pid(pid);
                    Ok(WaitOutcome::Killed(sig))
                }
                ChildChange::Stopped(sig) => {
                    // Ctrl-Z already stamped the job; keep that time.
                    let already = state
                        .jobs
                        .find_by_pid(pid)
                        .map(|j| j.is_stopped())
                        .unwrap_or(false);
                    if !already {
                        state.jobs.mark_stopped(pid);
                    }
                    Ok(WaitOutcome::Stopped(sig))
                }
                other => Err(JobError::WaitFailed {
                    pid: pid.as_raw(),
                    reason: format!("unexpected status {other:?}"),
                }),
            },
            Err(Errno::ECHILD) => {
                state.jobs.remove_by_pid(pid);
                Ok(WaitOutcome::Reaped)
            }
            Err(e) => Err(JobError::WaitFailed {
                pid: pid.as_raw(),
                reason: e.to_string(),
            }),
        }
    }
}
