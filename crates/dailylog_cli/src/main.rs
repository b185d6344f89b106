//! Command-line boundary for dailylog.
//!
//! # Responsibility
//! - Parse arguments, resolve configuration and open storage.
//! - Print exactly one JSON envelope per invocation on stdout.
//!
//! # Invariants
//! - Exit code is 0 when `ok` is true, 1 otherwise.
//! - User input never causes a panic; every failure becomes an envelope.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dailylog_core::{init_logging, open_db, AppConfig, Priority, SynthesisMode};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::{App, CliError, Envelope, Reply};

/// Timestamped logs turned into a daily diary and a task list.
#[derive(Parser, Debug)]
#[command(name = "dailylog", version, about)]
pub(crate) struct Cli {
    /// SQLite database file (overrides DAILYLOG_DB_PATH).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// trace|debug|info|warn|error (overrides DAILYLOG_LOG_LEVEL).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Append, edit, delete and list logs.
    Log {
        #[command(subcommand)]
        cmd: LogCommand,
    },
    /// Synthesize, show and export diary entries.
    Diary {
        #[command(subcommand)]
        cmd: DiaryCommand,
    },
    /// Extract and manage tasks.
    Tasks {
        #[command(subcommand)]
        cmd: TasksCommand,
    },
    /// Show configuration and stored counts.
    Status,
    /// Import or export the legacy JSON files.
    Snapshot {
        #[command(subcommand)]
        cmd: SnapshotCommand,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum LogCommand {
    /// Append a log stamped with the current time.
    Add { content: String },
    /// Replace the content of a log.
    Edit { id: i64, content: String },
    /// Delete a log.
    Rm { id: i64 },
    /// List logs of one date (today by default), newest first.
    Ls {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// List every log instead of one date.
        #[arg(long, conflicts_with = "date")]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum DiaryCommand {
    /// Create or update the diary entry of a date.
    Synth {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// create|regenerate|incremental (`update` is accepted for incremental).
        #[arg(long, default_value = "incremental", value_parser = parse_mode)]
        mode: SynthesisMode,
    },
    /// List diary entries, newest first.
    Ls,
    /// Show the diary entry of a date.
    Show {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Render the diary entry of a date as markdown.
    Export {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Write the markdown to this file instead of the envelope.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum TasksCommand {
    /// Extract tasks from a date's logs.
    Extract {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Skip logs already analyzed for this date.
        #[arg(long)]
        only_new: bool,
    },
    /// List tasks in display order.
    Ls {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Include completed tasks.
        #[arg(long)]
        all: bool,
    },
    /// Add a task by hand.
    Add {
        description: String,
        /// high|medium|low
        #[arg(long, default_value = "medium", value_parser = parse_priority)]
        priority: Priority,
    },
    /// Flip the completion state of a task.
    Toggle { id: i64 },
    /// Delete a task.
    Rm { id: i64 },
}

#[derive(Subcommand, Debug)]
pub(crate) enum SnapshotCommand {
    /// Replace all stored state with the files in DIR.
    Import { dir: PathBuf },
    /// Write all stored state as files into DIR.
    Export { dir: PathBuf },
}

fn parse_mode(value: &str) -> Result<SynthesisMode, String> {
    SynthesisMode::parse(value)
        .ok_or_else(|| format!("unknown mode `{value}`; expected create|regenerate|incremental"))
}

fn parse_priority(value: &str) -> Result<Priority, String> {
    Priority::parse(value)
        .ok_or_else(|| format!("unknown priority `{value}`; expected high|medium|low"))
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => return emit(&Envelope::failure(CliError::usage(err.to_string()))),
    };
    let envelope = match run(cli) {
        Ok(reply) => Envelope::success(reply),
        Err(err) => Envelope::failure(err),
    };
    emit(&envelope)
}

fn emit(envelope: &Envelope) -> ExitCode {
    println!("{}", envelope.to_json());
    if envelope.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: Cli) -> Result<Reply, CliError> {
    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    if let Err(err) = init_logging(&config.log_level, &config.log_dir) {
        eprintln!("dailylog: file logging disabled: {err}");
    }

    let conn = open_db(&config.db_path)?;
    let app = App::new(&conn, &config);
    app.execute(cli.cmd)
}
