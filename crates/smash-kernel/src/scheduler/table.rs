//! The job table: ordered record of every child under supervision.
//!
//! Lookups are linear scans: a shell tracks tens of jobs at most, and
//! insertion order is what `jobs` prints.

use std::time::Instant;

use nix::unistd::Pid;
use smash_types::{JobId, JobInfo, JobStatus};

/// Hands out job ids. Monotonic for the life of the session; removals never
/// rewind it.
#[derive(Debug)]
pub struct JobIdAllocator {
    next: u64,
}

impl JobIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> JobId {
        let id = JobId(self.next);
        self.next += 1;
        id
    }
}

impl Default for JobIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A child process tracked by the shell.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    pid: Pid,
    command: String,
    start_time: Instant,
    /// Set iff `status == Stopped`.
    suspension_time: Option<Instant>,
    status: JobStatus,
}

impl Job {
    fn new(id: JobId, pid: Pid, command: String, now: Instant) -> Self {
        Self {
            id,
            pid,
            command,
            start_time: now,
            suspension_time: None,
            status: JobStatus::Running,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn suspension_time(&self) -> Option<Instant> {
        self.suspension_time
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn is_stopped(&self) -> bool {
        self.status == JobStatus::Stopped
    }

    /// Mark the job suspended as of `now`.
    pub fn stop(&mut self, now: Instant) {
        self.status = JobStatus::Stopped;
        self.suspension_time = Some(now);
    }

    /// Mark the job running again; the suspension stamp no longer applies.
    pub fn resume(&mut self) {
        self.status = JobStatus::Running;
        self.suspension_time = None;
    }

    /// Snapshot for display, with elapsed time measured against `now`.
    pub fn info(&self, now: Instant) -> JobInfo {
        JobInfo {
            id: self.id,
            command: self.command.clone(),
            pid: self.pid.as_raw(),
            elapsed_secs: now.saturating_duration_since(self.start_time).as_secs(),
            status: self.status,
        }
    }
}

/// Ordered collection of jobs.
#[derive(Debug, Default)]
pub struct JobTable {
    ids: JobIdAllocator,
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly spawned, running job and return its new id.
    pub fn insert(&mut self, pid: Pid, command: impl Into<String>) -> JobId {
        self.insert_at(pid, command, Instant::now())
    }

    /// Like [`insert`](Self::insert) with an explicit start time.
    pub fn insert_at(&mut self, pid: Pid, command: impl Into<String>, now: Instant) -> JobId {
        let id = self.ids.allocate();
        self.jobs.push(Job::new(id, pid, command.into(), now));
        id
    }

    pub fn find_by_id(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn find_by_id_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        self.jobs.iter().find(|j| j.pid == pid)
    }

    pub fn find_by_pid_mut(&mut self, pid: Pid) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.pid == pid)
    }

    /// Remove a job, returning it if it was present. Order of the remaining
    /// jobs is preserved.
    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        let pos = self.jobs.iter().position(|j| j.id == id)?;
        Some(self.jobs.remove(pos))
    }

    pub fn remove_by_pid(&mut self, pid: Pid) -> Option<Job> {
        let pos = self.jobs.iter().position(|j| j.pid == pid)?;
        Some(self.jobs.remove(pos))
    }

    /// Jobs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job with the earliest start time. Ties go to the earlier insertion.
    pub fn oldest(&self) -> Option<&Job> {
        self.jobs.iter().min_by_key(|j| j.start_time)
    }

    /// Stopped job with the latest suspension time, or `None` when nothing
    /// is stopped.
    pub fn newest_stopped(&self) -> Option<&Job> {
        self.jobs
            .iter()
            .filter_map(|j| j.suspension_time.map(|t| (t, j)))
            .max_by_key(|(t, _)| *t)
            .map(|(_, j)| j)
    }

    /// Mark the job with `pid` stopped. Returns false if no such job.
    pub fn mark_stopped(&mut self, pid: Pid) -> bool {
        match self.find_by_pid_mut(pid) {
            Some(job) => {
                job.stop(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Mark the job with `pid` running. Returns false if no such job.
    pub fn mark_running(&mut self, pid: Pid) -> bool {
        match self.find_by_pid_mut(pid) {
            Some(job) => {
                job.resume();
                true
            }
            None => false,
        }
    }

    /// Listing snapshot in insertion order.
    pub fn infos(&self) -> Vec<JobInfo> {
        let now = Instant::now();
        self.jobs.iter().map(|j| j.info(now)).collect()
    }
}
