//! smash-kernel: the job-control core of the smash shell.
//!
//! This crate provides:
//!
//! - **Scheduler**: job table, process launcher, signal bridge and job
//!   controller (`jobs`, `fg`, `bg`, `kill`, `quit kill`)
//! - **Session**: per-run state (jobs, working directories and history)
//! - **Dispatch**: line tokenizing and the built-in command table
//! - **Config**: `ShellConfig` and its environment overrides

pub mod config;
pub mod dispatch;
pub mod scheduler;
pub mod session;

pub use config::ShellConfig;
pub use dispatch::{CommandLine, Dispatcher, Flow};
pub use scheduler::{
    JobControl, JobController, JobTarget, LaunchMode, ProcessHost, SignalBridge, SignalEvent,
    UnixHost, WaitOutcome,
};
pub use session::{History, Session, WorkingDirs};

pub use smash_types::{ExecResult, JobError, JobId, JobInfo, JobResult, JobStatus};
