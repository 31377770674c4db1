//! Scheduler module for smash: child processes as jobs.
//!
//! This module provides:
//! - **Job table**: ordered records of every supervised child.
//! - **Launcher**: fork/exec a command as a job, optionally waiting on it.
//! - **Signal bridge**: `SIGCHLD`/`SIGINT`/`SIGTSTP` → table updates and
//!   forwarding to the foreground job.
//! - **Controller**: `jobs`, `fg`, `bg`, `kill`, and terminate-everything.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  launch / fg / bg / kill   ┌──────────────────────────┐
//! │  Dispatcher  │ ─────────────────────────▶ │ JobController            │
//! └──────────────┘                            │   Arc<JobControl>        │
//!                                             │   ┌────────────────────┐ │
//! ┌──────────────┐  SignalEvent               │   │ Mutex<ControlState>│ │
//! │ SignalBridge │ ─────────────────────────▶ │   │  jobs: JobTable    │ │
//! │ (tokio task) │                            │   │  foreground: Pid?  │ │
//! └──────────────┘                            │   └────────────────────┘ │
//!                                             │   host: dyn ProcessHost  │
//!                                             └──────────────────────────┘
//! ```
//!
//! Per job: `Running ─stop→ Stopped ─continue→ Running ─exit/kill→ removed`.

mod bridge;
mod control;
mod controller;
mod host;
mod launcher;
mod table;

pub use bridge::{SignalBridge, SignalEvent};
pub use control::{ControlState, JobControl, WaitOutcome};
pub use controller::{ForegroundReturn, JobController, JobTarget, ShutdownReport, DEFAULT_KILL_GRACE};
pub use host::{ChildChange, ProcessHost, UnixHost, EXEC_FAILED_STATUS};
pub use launcher::{LaunchMode, Launched};
pub use table::{Job, JobIdAllocator, JobTable};
