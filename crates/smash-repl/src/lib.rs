//! smash REPL: the interactive front end.
//!
//! Reads lines with rustyline, hands them to the kernel's [`Dispatcher`] and
//! prints what comes back. The tokio runtime owned here also hosts the
//! signal bridge, so job state keeps moving while the prompt is idle.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use smash_kernel::{Dispatcher, ExecResult, Flow, Session, ShellConfig};

/// REPL state: one session and the runtime it runs on.
pub struct Repl {
    dispatcher: Dispatcher,
    runtime: Runtime,
    bridge: JoinHandle<()>,
}

impl Repl {
    /// Interactive configuration with `SMASH_*` environment overrides.
    pub fn new() -> Result<Self> {
        Self::with_config(ShellConfig::interactive().with_env_overrides())
    }

    /// Create a REPL over real processes with a custom configuration.
    pub fn with_config(config: ShellConfig) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        let session = Session::unix(config);

        // Signal streams register with the runtime's driver.
        let bridge = {
            let _guard = runtime.enter();
            session
                .install_signal_bridge()
                .context("Failed to install signal handlers")?
        };

        Ok(Self {
            dispatcher: Dispatcher::new(session),
            runtime,
            bridge,
        })
    }

    pub fn config(&self) -> &ShellConfig {
        self.dispatcher.session().config()
    }

    /// Process a single line of input.
    pub fn process_line(&mut self, line: &str) -> Flow {
        self.runtime.block_on(self.dispatcher.execute(line))
    }
}

impl Drop for Repl {
    fn drop(&mut self) {
        self.bridge.abort();
    }
}

/// Print a command's output and error text.
pub fn print_result(result: &ExecResult) {
    if !result.out.is_empty() {
        print!("{}", result.out);
    }
    if !result.err.is_empty() {
        eprintln!("{}", result.err);
    }
}

/// Save REPL history to disk.
fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Option<PathBuf>) {
    if let Some(path) = history_path {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create history directory: {}", e);
            }
        }
        if let Err(e) = rl.save_history(path) {
            tracing::warn!("Failed to save history: {}", e);
        }
    }
}

/// Run the REPL. Returns the status the shell should exit with.
pub fn run() -> Result<i32> {
    let mut rl: Editor<(), DefaultHistory> =
        Editor::new().context("Failed to create editor")?;

    // Line-editing history, separate from the in-shell `history` built-in.
    let history_path = directories::BaseDirs::new()
        .map(|b| b.data_dir().join("smash").join("history.txt"));
    if let Some(ref path) = history_path {
        if let Err(e) = rl.load_history(path) {
            let is_not_found = matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
            if !is_not_found {
                tracing::warn!("Failed to load history: {}", e);
            }
        }
    }

    let mut repl = Repl::new()?;
    let prompt = repl.config().prompt.clone();

    let status = loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = rl.add_history_entry(line.as_str()) {
                        tracing::warn!("Failed to add history entry: {}", e);
                    }
                }

                match repl.process_line(&line) {
                    Flow::Continue(result) => print_result(&result),
                    Flow::Exit(code) => break code,
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break 0;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break 1;
            }
        }
    };

    save_history(&mut rl, &history_path);
    Ok(status)
}
