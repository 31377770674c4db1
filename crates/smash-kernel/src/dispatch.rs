//! Command dispatch: one parsed line in, one result out.
//!
//! Built-ins are matched by name; anything else is launched as an external
//! program through the job controller. A trailing `&` runs it in the
//! background.
//!
//! ```text
//! line ──▶ CommandLine::parse ──┬─▶ pwd / cd / history / showpid / mv
//!                               ├─▶ jobs / fg / bg / kill / quit ──▶ JobController
//!                               └─▶ external ──▶ JobControl::launch
//! ```

use std::io::Write;
use std::path::PathBuf;

use smash_types::{ExecResult, JobError, JobId, JobResult};

use crate::scheduler::{JobTarget, LaunchMode};
use crate::session::Session;

/// Parsed form of one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Command name (first word).
    pub name: String,
    /// Remaining words.
    pub args: Vec<String>,
    /// The line as typed, minus surrounding whitespace and any `&`.
    pub raw: String,
    /// Ends with `&`.
    pub background: bool,
}

impl CommandLine {
    /// Split on spaces and tabs. Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut raw = line.trim();
        let background = raw.ends_with('&');
        if background {
            raw = raw[..raw.len() - 1].trim_end();
        }

        let mut words = raw.split([' ', '\t']).filter(|w| !w.is_empty());
        let name = words.next()?.to_string();
        let args = words.map(str::to_string).collect();
        Some(Self {
            name,
            args,
            raw: raw.to_string(),
            background,
        })
    }

    /// `name` followed by `args`.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// What the read loop should do after a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Show the result and read the next line.
    Continue(ExecResult),
    /// Leave the shell with this status.
    Exit(i32),
}

/// Runs command lines against a session.
#[derive(Debug)]
pub struct Dispatcher {
    session: Session,
}

impl Dispatcher {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Execute one input line. Job announcements (`fg`/`bg` names,
    /// `quit kill` progress, signal echo) are written straight to stdout.
    pub async fn execute(&mut self, line: &str) -> Flow {
        let mut stdout = std::io::stdout();
        self.execute_with(line, &mut stdout).await
    }

    /// Like [`execute`](Self::execute) with announcements sent to `out`.
    pub async fn execute_with<W: Write + Send>(&mut self, line: &str, out: &mut W) -> Flow {
        let Some(cmd) = CommandLine::parse(line) else {
            return Flow::Continue(ExecResult::success(""));
        };

        if cmd.name != "history" {
            self.session.history_mut().record(line.trim());
        }

        if cmd.background {
            let result = self.launch(&cmd, LaunchMode::Background).await;
            return Flow::Continue(self.finish(&cmd, result));
        }

        let result = match cmd.name.as_str() {
            "pwd" => self.pwd(&cmd),
            "cd" => self.cd(&cmd),
            "history" => self.history(&cmd),
            "jobs" => self.jobs(&cmd),
            "kill" => self.kill(&cmd, out),
            "showpid" => self.showpid(&cmd),
            "fg" => self.fg(&cmd, out).await,
            "bg" => self.bg(&cmd, out),
            "mv" => self.mv(&cmd),
            "quit" => return self.quit(&cmd, out).await,
            _ => self.launch(&cmd, LaunchMode::Foreground).await,
        };
        Flow::Continue(self.finish(&cmd, result))
    }

    fn finish(&self, cmd: &CommandLine, result: JobResult<ExecResult>) -> ExecResult {
        match result {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(command = %cmd.name, "command failed: {}", err);
                ExecResult::failure(err.exit_code(), error_message(cmd, &err))
            }
        }
    }

    fn pwd(&self, cmd: &CommandLine) -> JobResult<ExecResult> {
        expect_arity(cmd, 0..=0)?;
        Ok(ExecResult::success(format!(
            "{}\n",
            self.session.dirs().current().display()
        )))
    }

    fn cd(&mut self, cmd: &CommandLine) -> JobResult<ExecResult> {
        expect_arity(cmd, 1..=1)?;
        let dirs = self.session.dirs_mut();
        if cmd.args[0] == "-" {
            let target = dirs.previous().to_path_buf();
            dirs.change_to(&target)?;
            Ok(ExecResult::success(format!("{}\n", target.display())))
        } else {
            dirs.change_to(&PathBuf::from(&cmd.args[0]))?;
            Ok(ExecResult::success(""))
        }
    }

    fn history(&self, cmd: &CommandLine) -> JobResult<ExecResult> {
        expect_arity(cmd, 0..=0)?;
        let mut out = String::new();
        for line in self.session.history().iter() {
            out.push_str(line);
            out.push('\n');
        }
        Ok(ExecResult::success(out))
    }

    fn jobs(&self, cmd: &CommandLine) -> JobResult<ExecResult> {
        expect_arity(cmd, 0..=0)?;
        let mut out = String::new();
        for job in self.session.jobs().list_jobs() {
            out.push_str(&job.to_string());
            out.push('\n');
        }
        Ok(ExecResult::success(out))
    }

    fn kill<W: Write>(&self, cmd: &CommandLine, out: &mut W) -> JobResult<ExecResult> {
        expect_arity(cmd, 2..=2)?;
        let signum = cmd.args[0]
            .strip_prefix('-')
            .and_then(|n| n.parse::<i32>().ok())
            .ok_or_else(|| invalid(cmd))?;
        let id = parse_job_id(cmd, &cmd.args[1])?;
        self.session.jobs().send_signal(id, signum, out)?;
        Ok(ExecResult::success(""))
    }

    fn showpid(&self, cmd: &CommandLine) -> JobResult<ExecResult> {
        expect_arity(cmd, 0..=0)?;
        Ok(ExecResult::success(format!(
            "smash pid is {}\n",
            self.session.shell_pid()
        )))
    }

    async fn fg<W: Write + Send>(&self, cmd: &CommandLine, out: &mut W) -> JobResult<ExecResult> {
        let target = job_target(cmd)?;
        match self.session.jobs().bring_to_foreground(target, out).await? {
            Some(ret) => Ok(ExecResult::from_code(ret.outcome.exit_code())),
            None => Ok(ExecResult::success("")),
        }
    }

    fn bg<W: Write>(&self, cmd: &CommandLine, out: &mut W) -> JobResult<ExecResult> {
        let target = job_target(cmd)?;
        self.session.jobs().send_to_background(target, out)?;
        Ok(ExecResult::success(""))
    }

    fn mv(&self, cmd: &CommandLine) -> JobResult<ExecResult> {
        expect_arity(cmd, 2..=2)?;
        let (from, to) = (&cmd.args[0], &cmd.args[1]);
        std::fs::rename(from, to).map_err(|e| JobError::RenameFailed {
            from: from.clone(),
            to: to.clone(),
            reason: e.to_string(),
        })?;
        Ok(ExecResult::success(format!("{from} has been renamed to {to}\n")))
    }

    async fn quit<W: Write + Send>(&self, cmd: &CommandLine, out: &mut W) -> Flow {
        match cmd.args.as_slice() {
            [] => Flow::Exit(0),
            [arg] if arg == "kill" => {
                let grace = self.session.config().kill_grace;
                let report = self.session.jobs().terminate_all(grace, out).await;
                for (id, err) in &report.failures {
                    tracing::warn!(job = %id, "quit kill: {}", err);
                }
                Flow::Exit(0)
            }
            _ => Flow::Continue(self.finish(cmd, Err(invalid(cmd)))),
        }
    }

    async fn launch(&self, cmd: &CommandLine, mode: LaunchMode) -> JobResult<ExecResult> {
        let launched = self
            .session
            .jobs()
            .control()
            .launch(&cmd.argv(), &cmd.raw, mode)
            .await?;
        match launched.outcome {
            Some(outcome) => Ok(ExecResult::from_code(outcome.exit_code())),
            None => Ok(ExecResult::success("")),
        }
    }
}

fn invalid(cmd: &CommandLine) -> JobError {
    JobError::InvalidArguments(cmd.raw.clone())
}

fn expect_arity(cmd: &CommandLine, range: std::ops::RangeInclusive<usize>) -> JobResult<()> {
    if range.contains(&cmd.args.len()) {
        Ok(())
    } else {
        Err(invalid(cmd))
    }
}

fn parse_job_id(cmd: &CommandLine, word: &str) -> JobResult<JobId> {
    if word.is_empty() || !word.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(cmd));
    }
    word.parse().map_err(|_| invalid(cmd))
}

/// `fg`/`bg` take zero arguments or one numeric job id.
fn job_target(cmd: &CommandLine) -> JobResult<JobTarget> {
    expect_arity(cmd, 0..=1)?;
    let id = cmd
        .args
        .first()
        .map(|word| parse_job_id(cmd, word))
        .transpose()?;
    Ok(JobTarget::from(id))
}

/// User-facing text for a failed command.
pub fn error_message(cmd: &CommandLine, err: &JobError) -> String {
    match (cmd.name.as_str(), err) {
        (_, JobError::InvalidArguments(_)) => format!("smash error: > \"{}\"", cmd.raw),
        ("kill", JobError::NoSuchJob(id)) => format!("kill {id} - job does not exist"),
        ("kill", JobError::SignalFailed { .. }) => {
            format!("kill {} - cannot send signal", cmd.args[1])
        }
        ("fg" | "bg", JobError::NoSuchJob(_)) => "Job not found".to_string(),
        (_, JobError::NoSuchJob(_)) => format!("smash error: > \"{}\" - job does not exist", cmd.raw),
        (_, JobError::PathNotFound(path)) => format!("smash error: > \"{path}\" - path not found"),
        (_, err) => format!("smash error: > \"{}\" - {}", cmd.raw, err),
    }
}
