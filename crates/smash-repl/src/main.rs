//! smash CLI entry point.
//!
//! Usage:
//!   smash                      # Interactive shell
//!   smash -c <command>         # Execute one line and exit

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use smash_kernel::Flow;
use smash_repl::{print_result, Repl};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            let status = smash_repl::run()?;
            Ok(exit_code(status.into()))
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("smash {} ({} {})",
                     env!("CARGO_PKG_VERSION"),
                     env!("SMASH_GIT_HASH"),
                     env!("SMASH_BUILD_DATE"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let cmd = args.get(2)
                .context("-c requires a command argument")?;
            run_command(cmd)
        }

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'smash --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(r#"smash v{}

Usage:
  smash                        Interactive shell
  smash -c <command>           Execute one command line and exit

Options:
  -c <command>                 Execute command line and exit
  -h, --help                   Show this help
  -V, --version                Show version

Built-ins:
  pwd  cd <dir|->  history  jobs  kill -<signum> <id>  showpid
  fg [id]  bg [id]  mv <from> <to>  quit [kill]

Environment:
  SMASH_KILL_GRACE_SECS        Seconds between SIGTERM and SIGKILL on 'quit kill'
  RUST_LOG                     Log filter (e.g. smash_kernel=debug)
"#, env!("CARGO_PKG_VERSION"));
}

/// Execute a command line and exit.
fn run_command(cmd: &str) -> Result<ExitCode> {
    let mut repl = Repl::new()?;
    match repl.process_line(cmd) {
        Flow::Continue(result) => {
            print_result(&result);
            Ok(exit_code(result.code))
        }
        Flow::Exit(code) => Ok(exit_code(code.into())),
    }
}

fn exit_code(code: i64) -> ExitCode {
    if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(u8::try_from(code).unwrap_or(1))
    }
}
