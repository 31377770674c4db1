//! Per-run shell state: jobs, working directories, history.
//!
//! One `Session` exists for the life of the shell and is handed to whatever
//! needs it; nothing here is global.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::unistd::Pid;
use smash_types::{JobError, JobResult};

use crate::config::ShellConfig;
use crate::scheduler::{JobControl, JobController, ProcessHost, SignalBridge, UnixHost};

/// Bounded command history with FIFO eviction.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.into());
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Current and previous working directory, for `pwd` and `cd -`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirs {
    current: PathBuf,
    previous: PathBuf,
}

impl WorkingDirs {
    /// Both entries start at `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            previous: dir.clone(),
            current: dir,
        }
    }

    /// Seeded from the process's working directory.
    pub fn from_process() -> Self {
        let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::new(dir)
    }

    pub fn current(&self) -> &Path {
        &self.current
    }

    pub fn previous(&self) -> &Path {
        &self.previous
    }

    /// Change the process directory to `target` and shift the pair.
    pub fn change_to(&mut self, target: &Path) -> JobResult<&Path> {
        std::env::set_current_dir(target)
            .map_err(|_| JobError::PathNotFound(target.display().to_string()))?;
        let now = std::env::current_dir().unwrap_or_else(|_| target.to_path_buf());
        self.previous = std::mem::replace(&mut self.current, now);
        Ok(&self.current)
    }
}

/// Everything one shell run owns.
#[derive(Debug)]
pub struct Session {
    config: ShellConfig,
    jobs: JobController,
    history: History,
    dirs: WorkingDirs,
    shell_pid: Pid,
}

impl Session {
    /// Session over an arbitrary process host.
    pub fn new(config: ShellConfig, host: Arc<dyn ProcessHost>) -> Self {
        let control = JobControl::new(host).with_echo_signals(config.echo_signals);
        Self {
            jobs: JobController::new(Arc::new(control)),
            history: History::new(config.history_capacity),
            dirs: WorkingDirs::from_process(),
            shell_pid: nix::unistd::getpid(),
            config,
        }
    }

    /// Session driving real processes.
    pub fn unix(config: ShellConfig) -> Self {
        Self::new(config, Arc::new(UnixHost::new()))
    }

    /// Start the signal bridge for this session on the current runtime.
    pub fn install_signal_bridge(&self) -> std::io::Result<tokio::task::JoinHandle<()>> {
        SignalBridge::new(Arc::clone(self.jobs.control())).install()
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn jobs(&self) -> &JobController {
        &self.jobs
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn dirs(&self) -> &WorkingDirs {
        &self.dirs
    }

    pub fn dirs_mut(&mut self) -> &mut WorkingDirs {
        &mut self.dirs
    }

    pub fn shell_pid(&self) -> Pid {
        self.shell_pid
    }
}
