//! Subcommand dispatch onto core services.
//!
//! # Responsibility
//! - Build services over one connection and run the requested operation.
//! - Map typed core errors to user-facing messages.
//!
//! # Invariants
//! - Oracle failures are reported with a retry hint and never change state.

use crate::{Command, DiaryCommand, LogCommand, SnapshotCommand, TasksCommand};
use chrono::NaiveDate;
use dailylog_core::{
    build_oracle, core_version, load_snapshot, oracle_status, read_snapshot_dir,
    replace_with_snapshot, write_snapshot_dir, AppConfig, Clock, ConfigError, DateLocks, DbError,
    DiaryService, DiaryServiceError, ErrorKind, LogService, LogServiceError, Oracle, RepoError,
    SnapshotError, SqliteDiaryRepository, SqliteLogRepository, SqliteTaskRepository,
    SynthesisAction, SystemClock, TaskFilter, TaskService, TaskServiceError,
};
use log::info;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

/// Successful command output.
#[derive(Debug)]
pub(crate) struct Reply {
    message: String,
    data: Value,
}

impl Reply {
    fn new(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// Failed command output.
#[derive(Debug)]
pub(crate) struct CliError {
    kind: Option<ErrorKind>,
    message: String,
}

impl CliError {
    pub(crate) fn usage(message: String) -> Self {
        Self {
            kind: Some(ErrorKind::Validation),
            message,
        }
    }

    fn from_kind(kind: ErrorKind, detail: &dyn Display) -> Self {
        let message = match kind {
            ErrorKind::Validation | ErrorKind::NotFound => detail.to_string(),
            ErrorKind::NoLogs => format!("{detail}; write a log first"),
            ErrorKind::OracleUnavailable => format!(
                "the AI service is unavailable, nothing was changed; please retry later ({detail})"
            ),
            ErrorKind::OracleFormat => {
                format!("the AI service returned an unusable answer, nothing was changed ({detail})")
            }
            ErrorKind::Storage => format!("storage error: {detail}"),
        };
        Self {
            kind: Some(kind),
            message,
        }
    }
}

impl From<LogServiceError> for CliError {
    fn from(value: LogServiceError) -> Self {
        Self::from_kind(value.kind(), &value)
    }
}

impl From<DiaryServiceError> for CliError {
    fn from(value: DiaryServiceError) -> Self {
        Self::from_kind(value.kind(), &value)
    }
}

impl From<TaskServiceError> for CliError {
    fn from(value: TaskServiceError) -> Self {
        Self::from_kind(value.kind(), &value)
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::from_kind(ErrorKind::Storage, &value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::from_kind(ErrorKind::Storage, &value)
    }
}

impl From<SnapshotError> for CliError {
    fn from(value: SnapshotError) -> Self {
        Self::from_kind(ErrorKind::Storage, &value)
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::from_kind(ErrorKind::Validation, &value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self {
            kind: None,
            message: format!("cannot encode output: {value}"),
        }
    }
}

/// Stdout envelope: `{ok, message, data}` plus `errorKind` on failure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Envelope {
    pub(crate) ok: bool,
    message: String,
    data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
}

impl Envelope {
    pub(crate) fn success(reply: Reply) -> Self {
        Self {
            ok: true,
            message: reply.message,
            data: reply.data,
            error_kind: None,
        }
    }

    pub(crate) fn failure(err: CliError) -> Self {
        Self {
            ok: false,
            message: err.message,
            data: Value::Null,
            error_kind: err.kind,
        }
    }

    pub(crate) fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|err| {
            format!(r#"{{"ok":false,"message":"cannot encode output: {err}","data":null}}"#)
        })
    }
}

/// Services and settings for one invocation.
pub(crate) struct App<'conn> {
    conn: &'conn Connection,
    config: AppConfig,
    clock: Arc<dyn Clock>,
    oracle: Arc<dyn Oracle>,
    diary_locks: Arc<DateLocks>,
    task_locks: Arc<DateLocks>,
}

impl<'conn> App<'conn> {
    pub(crate) fn new(conn: &'conn Connection, config: &AppConfig) -> Self {
        Self::with_parts(
            conn,
            config.clone(),
            Arc::new(SystemClock),
            build_oracle(&config.oracle),
        )
    }

    pub(crate) fn with_parts(
        conn: &'conn Connection,
        config: AppConfig,
        clock: Arc<dyn Clock>,
        oracle: Arc<dyn Oracle>,
    ) -> Self {
        Self {
            conn,
            config,
            clock,
            oracle,
            diary_locks: Arc::new(DateLocks::new()),
            task_locks: Arc::new(DateLocks::new()),
        }
    }

    fn log_service(&self) -> LogService<SqliteLogRepository<'conn>, SqliteDiaryRepository<'conn>> {
        LogService::new(
            SqliteLogRepository::new(self.conn),
            SqliteDiaryRepository::new(self.conn),
            self.clock.clone(),
        )
    }

    fn diary_service(
        &self,
    ) -> DiaryService<SqliteLogRepository<'conn>, SqliteDiaryRepository<'conn>> {
        DiaryService::new(
            SqliteLogRepository::new(self.conn),
            SqliteDiaryRepository::new(self.conn),
            self.oracle.clone(),
            self.clock.clone(),
            self.diary_locks.clone(),
        )
    }

    fn task_service(&self) -> TaskService<SqliteLogRepository<'conn>, SqliteTaskRepository<'conn>> {
        TaskService::new(
            SqliteLogRepository::new(self.conn),
            SqliteTaskRepository::new(self.conn),
            self.oracle.clone(),
            self.clock.clone(),
            self.task_locks.clone(),
        )
    }

    fn day(&self, date: Option<NaiveDate>) -> NaiveDate {
        date.unwrap_or_else(|| self.clock.today())
    }

    pub(crate) fn execute(&self, command: Command) -> Result<Reply, CliError> {
        match command {
            Command::Log { cmd } => self.log(cmd),
            Command::Diary { cmd } => self.diary(cmd),
            Command::Tasks { cmd } => self.tasks(cmd),
            Command::Status => self.status(),
            Command::Snapshot { cmd } => self.snapshot(cmd),
        }
    }

    fn log(&self, command: LogCommand) -> Result<Reply, CliError> {
        let service = self.log_service();
        match command {
            LogCommand::Add { content } => {
                let entry = service.append(&content)?;
                Ok(Reply::new(
                    format!("log {} saved", entry.id),
                    serde_json::to_value(&entry)?,
                ))
            }
            LogCommand::Edit { id, content } => {
                let edited = service.edit(id, &content)?;
                Ok(Reply::new(
                    change_message("updated", id, edited.change.diary_update_available),
                    serde_json::to_value(&edited)?,
                ))
            }
            LogCommand::Rm { id } => {
                let change = service.delete(id)?;
                Ok(Reply::new(
                    change_message("deleted", id, change.diary_update_available),
                    serde_json::to_value(change)?,
                ))
            }
            LogCommand::Ls { date, all } => {
                let logs = if all {
                    service.list_all()?
                } else {
                    service.list_for_date(self.day(date))?
                };
                Ok(Reply::new(
                    format!("{} log(s)", logs.len()),
                    serde_json::to_value(&logs)?,
                ))
            }
        }
    }

    fn diary(&self, command: DiaryCommand) -> Result<Reply, CliError> {
        let service = self.diary_service();
        match command {
            DiaryCommand::Synth { date, mode } => {
                let date = self.day(date);
                let outcome = service.synthesize(date, mode)?;
                let message = match &outcome.action {
                    SynthesisAction::Created => format!("diary for {date} created"),
                    SynthesisAction::Regenerated => format!("diary for {date} regenerated"),
                    SynthesisAction::Merged { new_log_ids } => format!(
                        "diary for {date} merged with {} new log(s)",
                        new_log_ids.len()
                    ),
                    SynthesisAction::Unchanged => {
                        format!("diary for {date} already includes every log")
                    }
                };
                Ok(Reply::new(message, serde_json::to_value(&outcome)?))
            }
            DiaryCommand::Ls => {
                let entries = service.list()?;
                Ok(Reply::new(
                    format!("{} diary entr(y/ies)", entries.len()),
                    serde_json::to_value(&entries)?,
                ))
            }
            DiaryCommand::Show { date } => {
                let date = self.day(date);
                let entry = service
                    .get(date)?
                    .ok_or(DiaryServiceError::DiaryNotFound(date))?;
                Ok(Reply::new(
                    format!("diary for {date}"),
                    serde_json::to_value(&entry)?,
                ))
            }
            DiaryCommand::Export { date, out } => {
                let date = self.day(date);
                let markdown = service.export_markdown(date)?;
                match out {
                    Some(path) => {
                        write_file(&path, &markdown)?;
                        Ok(Reply::new(
                            format!("diary for {date} exported"),
                            json!({ "path": path }),
                        ))
                    }
                    None => Ok(Reply::new(
                        format!("diary for {date} exported"),
                        json!({ "markdown": markdown }),
                    )),
                }
            }
        }
    }

    fn tasks(&self, command: TasksCommand) -> Result<Reply, CliError> {
        let service = self.task_service();
        match command {
            TasksCommand::Extract { date, only_new } => {
                let outcome = service.extract(self.day(date), only_new)?;
                let mut data = serde_json::to_value(&outcome)?;
                if let Value::Object(map) = &mut data {
                    map.insert("count".to_string(), json!(outcome.count()));
                }
                Ok(Reply::new(
                    format!("{} new task(s) for {}", outcome.count(), outcome.date),
                    data,
                ))
            }
            TasksCommand::Ls { date, all } => {
                let tasks = service.list(&TaskFilter {
                    date,
                    include_completed: all,
                })?;
                Ok(Reply::new(
                    format!("{} task(s)", tasks.len()),
                    serde_json::to_value(&tasks)?,
                ))
            }
            TasksCommand::Add {
                description,
                priority,
            } => {
                let task = service.add_manual(&description, priority)?;
                Ok(Reply::new(
                    format!("task {} added", task.id),
                    serde_json::to_value(&task)?,
                ))
            }
            TasksCommand::Toggle { id } => {
                let task = service.toggle(id)?;
                let state = if task.completed { "completed" } else { "reopened" };
                Ok(Reply::new(
                    format!("task {id} {state}"),
                    serde_json::to_value(&task)?,
                ))
            }
            TasksCommand::Rm { id } => {
                service.delete(id)?;
                Ok(Reply::new(format!("task {id} deleted"), json!({ "id": id })))
            }
        }
    }

    fn status(&self) -> Result<Reply, CliError> {
        let snapshot = load_snapshot(self.conn)?;
        Ok(Reply::new(
            "ok",
            json!({
                "version": core_version(),
                "dbPath": self.config.db_path,
                "logDir": self.config.log_dir,
                "oracle": oracle_status(&self.config.oracle),
                "counts": {
                    "logs": snapshot.logs.len(),
                    "diaryEntries": snapshot.diary_entries.len(),
                    "tasks": snapshot.tasks.len(),
                },
            }),
        ))
    }

    fn snapshot(&self, command: SnapshotCommand) -> Result<Reply, CliError> {
        match command {
            SnapshotCommand::Import { dir } => {
                let (snapshot, unreadable) = read_snapshot_dir(&dir)?;
                let mut summary = replace_with_snapshot(self.conn, &snapshot)?;
                summary.skipped_records += unreadable;
                info!(
                    "event=cli_snapshot_import module=cli status=ok skipped={}",
                    summary.skipped_records
                );
                Ok(Reply::new(
                    format!("imported state from {}", dir.display()),
                    serde_json::to_value(summary)?,
                ))
            }
            SnapshotCommand::Export { dir } => {
                let snapshot = load_snapshot(self.conn)?;
                write_snapshot_dir(&dir, &snapshot)?;
                Ok(Reply::new(
                    format!("exported state to {}", dir.display()),
                    json!({
                        "dir": dir,
                        "logs": snapshot.logs.len(),
                        "diaryEntries": snapshot.diary_entries.len(),
                        "tasks": snapshot.tasks.len(),
                    }),
                ))
            }
        }
    }
}

fn change_message(verb: &str, id: i64, diary_update_available: bool) -> String {
    if diary_update_available {
        format!("log {id} {verb}; the diary for its date can be updated")
    } else {
        format!("log {id} {verb}")
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents).map_err(|err| CliError {
        kind: Some(ErrorKind::Storage),
        message: format!("cannot write `{}`: {err}", path.display()),
    })
}
