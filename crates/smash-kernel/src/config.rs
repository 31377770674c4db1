//! Shell configuration.

use std::time::Duration;

use crate::scheduler::DEFAULT_KILL_GRACE;

/// Maximum number of commands remembered by `history`.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Environment variable overriding the `quit kill` grace period, in seconds.
pub const KILL_GRACE_ENV: &str = "SMASH_KILL_GRACE_SECS";

/// Configuration for a shell session.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Prompt printed before each line.
    pub prompt: String,

    /// Commands kept by `history`; oldest entries are evicted first.
    pub history_capacity: usize,

    /// Time a job gets to exit after SIGTERM before `quit kill` sends SIGKILL.
    pub kill_grace: Duration,

    /// Announce each signal the shell sends (`signal SIGCONT was sent to pid N`).
    ///
    /// On for the interactive shell, off for embedders and tests that
    /// capture output.
    pub echo_signals: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "smash > ".to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            kill_grace: DEFAULT_KILL_GRACE,
            echo_signals: false,
        }
    }
}

impl ShellConfig {
    /// Config for a human at a terminal.
    pub fn interactive() -> Self {
        Self {
            echo_signals: true,
            ..Self::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_echo_signals(mut self, echo: bool) -> Self {
        self.echo_signals = echo;
        self
    }

    /// Apply overrides from the environment. Unparsable values are ignored
    /// with a warning.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(KILL_GRACE_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.kill_grace = Duration::from_secs(secs),
                Err(e) => tracing::warn!("ignoring {}={:?}: {}", KILL_GRACE_ENV, raw, e),
            }
        }
        self
    }
}
