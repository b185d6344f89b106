//! Whole-state snapshots and the legacy JSON document format.
//!
//! # Responsibility
//! - Load and atomically replace every collection plus next-id counters.
//! - Read/write the three-file layout (`logs.json`, `diary.json`,
//!   `tasks.json`) used by earlier versions of the app.
//!
//! # Invariants
//! - `replace_with_snapshot` is all-or-nothing.
//! - Restored counters never hand out an id already present in the data.
//! - Missing files and missing/ill-typed top-level keys read as empty
//!   collections with `nextId = 1`; malformed JSON is an error.

use crate::model::diary::DiaryEntry;
use crate::model::log_entry::{count_words, LogEntry};
use crate::model::task::{Priority, Task};
use crate::model::timestamp::LogTimestamp;
use crate::model::LogId;
use crate::oracle::parse::parse_log_ref;
use crate::repo::diary_repo::{DiaryRepository, SqliteDiaryRepository};
use crate::repo::log_repo::{LogRepository, RepoError, RepoResult, SqliteLogRepository};
use crate::repo::task_repo::{priority_to_db, SqliteTaskRepository, TaskFilter, TaskRepository};
use crate::repo::{bool_to_int, date_to_db, parse_db_date};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const LOGS_FILE: &str = "logs.json";
pub const DIARY_FILE: &str = "diary.json";
pub const TASKS_FILE: &str = "tasks.json";

/// Complete persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub logs: Vec<LogEntry>,
    pub next_log_id: i64,
    pub diary_entries: Vec<DiaryEntry>,
    pub next_diary_id: i64,
    pub tasks: Vec<Task>,
    pub next_task_id: i64,
    /// Per-date logs already sent for task extraction.
    pub analyzed_logs: BTreeMap<NaiveDate, BTreeSet<LogId>>,
}

/// Row counts written by [`replace_with_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub logs: usize,
    pub diary_entries: usize,
    pub tasks: usize,
    /// Records dropped because they were unreadable or duplicated.
    pub skipped_records: usize,
}

/// Snapshot file I/O failure.
#[derive(Debug)]
pub enum SnapshotError {
    Io { path: PathBuf, message: String },
    Json { path: PathBuf, message: String },
    Repo(RepoError),
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "cannot access `{}`: {message}", path.display()),
            Self::Json { path, message } => {
                write!(f, "invalid JSON in `{}`: {message}", path.display())
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Io { .. } | Self::Json { .. } => None,
        }
    }
}

impl From<RepoError> for SnapshotError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Reads every collection and counter from storage.
pub fn load_snapshot(conn: &Connection) -> RepoResult<StateSnapshot> {
    let mut logs = SqliteLogRepository::new(conn).list_logs()?;
    logs.sort_by_key(|log| log.id);
    let mut diary_entries = SqliteDiaryRepository::new(conn).list_diaries()?;
    diary_entries.sort_by_key(|entry| entry.id);
    let mut tasks = SqliteTaskRepository::new(conn).list_tasks(&TaskFilter::default())?;
    tasks.sort_by_key(|task| task.id);

    let mut analyzed_logs: BTreeMap<NaiveDate, BTreeSet<LogId>> = BTreeMap::new();
    let mut stmt = conn.prepare("SELECT task_date, log_id FROM task_extraction_logs;")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, LogId>(1)?))
    })?;
    for row in rows {
        let (date_text, log_id) = row?;
        let date = parse_db_date(&date_text, "task_extraction_logs.task_date")?;
        analyzed_logs.entry(date).or_default().insert(log_id);
    }

    Ok(StateSnapshot {
        logs,
        next_log_id: next_id(conn, "logs")?,
        diary_entries,
        next_diary_id: next_id(conn, "diary_entries")?,
        tasks,
        next_task_id: next_id(conn, "tasks")?,
        analyzed_logs,
    })
}

/// Replaces all stored state with `snapshot` in one transaction.
///
/// Duplicate diary dates and duplicate `(sourceLogId, description)` task pairs
/// keep the first record and count the rest as skipped.
pub fn replace_with_snapshot(
    conn: &Connection,
    snapshot: &StateSnapshot,
) -> RepoResult<ImportSummary> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "DELETE FROM diary_entry_logs;
         DELETE FROM diary_entries;
         DELETE FROM task_extraction_logs;
         DELETE FROM tasks;
         DELETE FROM logs;",
    )?;

    let mut summary = ImportSummary::default();
    for log in &snapshot.logs {
        let changed = tx.execute(
            "INSERT OR IGNORE INTO logs (id, content, timestamp, log_date, word_count)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                log.id,
                log.content,
                log.timestamp.as_str(),
                date_to_db(log.date()),
                log.word_count
            ],
        )?;
        tally(&mut summary.logs, &mut summary.skipped_records, changed);
    }

    for entry in &snapshot.diary_entries {
        let changed = tx.execute(
            "INSERT OR IGNORE INTO diary_entries (id, entry_date, content, created_at, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                entry.id,
                date_to_db(entry.date),
                entry.content,
                entry.created_at,
                entry.last_updated.max(entry.created_at)
            ],
        )?;
        if changed == 1 {
            crate::repo::diary_repo::insert_log_ids(&tx, entry.id, &entry.log_ids)?;
        }
        tally(&mut summary.diary_entries, &mut summary.skipped_records, changed);
    }

    for task in &snapshot.tasks {
        let changed = tx.execute(
            "INSERT OR IGNORE INTO tasks (
                id, description, priority, completed, completed_at,
                source_log_id, task_date, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                task.id,
                task.description,
                priority_to_db(task.priority),
                bool_to_int(task.completed),
                if task.completed { task.completed_at } else { None },
                task.source_log_id,
                date_to_db(task.date),
                task.created_at
            ],
        )?;
        tally(&mut summary.tasks, &mut summary.skipped_records, changed);
    }

    for (date, log_ids) in &snapshot.analyzed_logs {
        for log_id in log_ids {
            tx.execute(
                "INSERT OR IGNORE INTO task_extraction_logs (task_date, log_id) VALUES (?1, ?2);",
                params![date_to_db(*date), log_id],
            )?;
        }
    }

    restore_counter(&tx, "logs", snapshot.next_log_id)?;
    restore_counter(&tx, "diary_entries", snapshot.next_diary_id)?;
    restore_counter(&tx, "tasks", snapshot.next_task_id)?;
    tx.commit()?;

    info!(
        "event=snapshot_import module=repo status=ok logs={} diary_entries={} tasks={} skipped={}",
        summary.logs, summary.diary_entries, summary.tasks, summary.skipped_records
    );
    Ok(summary)
}

fn tally(imported: &mut usize, skipped: &mut usize, changed: usize) {
    if changed == 1 {
        *imported += 1;
    } else {
        *skipped += 1;
    }
}

fn next_id(conn: &Connection, table: &str) -> RepoResult<i64> {
    let seq: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1;",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(seq.map_or(1, |seq| seq + 1))
}

fn restore_counter(conn: &Connection, table: &'static str, next_id: i64) -> RepoResult<()> {
    let max_id: i64 = conn.query_row(
        &format!("SELECT COALESCE(MAX(id), 0) FROM {table};"),
        [],
        |row| row.get(0),
    )?;
    let seq = (next_id - 1).max(max_id).max(0);
    conn.execute("DELETE FROM sqlite_sequence WHERE name = ?1;", [table])?;
    conn.execute(
        "INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2);",
        params![table, seq],
    )?;
    Ok(())
}

/// Reads the three legacy JSON files from `dir`.
///
/// Unreadable records are skipped and counted in the returned total.
pub fn read_snapshot_dir(dir: &Path) -> Result<(StateSnapshot, usize), SnapshotError> {
    let logs_doc = read_document(&dir.join(LOGS_FILE))?;
    let diary_doc = read_document(&dir.join(DIARY_FILE))?;
    let tasks_doc = read_document(&dir.join(TASKS_FILE))?;
    let mut skipped = 0;

    let logs = records(&logs_doc, "logs", &mut skipped, log_from_record);
    let diary_entries = records(&diary_doc, "entries", &mut skipped, diary_from_record);
    let tasks = records(&tasks_doc, "tasks", &mut skipped, task_from_record);

    let mut analyzed_logs: BTreeMap<NaiveDate, BTreeSet<LogId>> = BTreeMap::new();
    if let Some(map) = tasks_doc.get("analyzedLogIds").and_then(Value::as_object) {
        for (date_text, ids) in map {
            let Ok(date) = parse_db_date(date_text, "tasks.json analyzedLogIds") else {
                skipped += 1;
                continue;
            };
            let ids = ids.as_array().into_iter().flatten().filter_map(Value::as_i64);
            analyzed_logs.entry(date).or_default().extend(ids);
        }
    }

    let snapshot = StateSnapshot {
        logs,
        next_log_id: counter(&logs_doc),
        diary_entries,
        next_diary_id: counter(&diary_doc),
        tasks,
        next_task_id: counter(&tasks_doc),
        analyzed_logs,
    };
    if skipped > 0 {
        warn!(
            "event=snapshot_read module=repo status=partial skipped_records={}",
            skipped
        );
    }
    Ok((snapshot, skipped))
}

/// Writes `snapshot` as the three legacy JSON files into `dir`.
///
/// Each file is written to a temporary sibling first and then renamed.
pub fn write_snapshot_dir(dir: &Path, snapshot: &StateSnapshot) -> Result<(), SnapshotError> {
    std::fs::create_dir_all(dir).map_err(|err| io_error(dir, err))?;

    let logs: Vec<Value> = snapshot
        .logs
        .iter()
        .map(|log| {
            json!({
                "id": log.id,
                "content": log.content,
                "timestamp": log.timestamp.as_str(),
                "wordCount": log.word_count,
            })
        })
        .collect();
    let entries: Vec<Value> = snapshot
        .diary_entries
        .iter()
        .map(|entry| {
            json!({
                "id": entry.id,
                "date": date_to_db(entry.date),
                "content": entry.content,
                "createdAt": iso_from_ms(entry.created_at),
                "lastUpdated": iso_from_ms(entry.last_updated),
                "logIds": entry.log_ids,
            })
        })
        .collect();
    let tasks: Vec<Value> = snapshot
        .tasks
        .iter()
        .map(|task| {
            json!({
                "id": task.id,
                "description": task.description,
                "priority": task.priority.label(),
                "completed": task.completed,
                "completedAt": task.completed_at.map(iso_from_ms),
                "createdAt": iso_from_ms(task.created_at),
                "sourceLogId": task.source_log_id,
                "date": date_to_db(task.date),
            })
        })
        .collect();
    let analyzed: Map<String, Value> = snapshot
        .analyzed_logs
        .iter()
        .map(|(date, ids)| (date_to_db(*date), json!(ids)))
        .collect();

    write_document(
        &dir.join(LOGS_FILE),
        &json!({ "logs": logs, "nextId": snapshot.next_log_id }),
    )?;
    write_document(
        &dir.join(DIARY_FILE),
        &json!({ "entries": entries, "nextId": snapshot.next_diary_id }),
    )?;
    write_document(
        &dir.join(TASKS_FILE),
        &json!({
            "tasks": tasks,
            "nextId": snapshot.next_task_id,
            "analyzedLogIds": analyzed,
        }),
    )?;

    info!(
        "event=snapshot_export module=repo status=ok logs={} diary_entries={} tasks={}",
        snapshot.logs.len(),
        snapshot.diary_entries.len(),
        snapshot.tasks.len()
    );
    Ok(())
}

fn read_document(path: &Path) -> Result<Value, SnapshotError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Value::Null),
        Err(err) => return Err(io_error(path, err)),
    };
    serde_json::from_str(&text).map_err(|err| SnapshotError::Json {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn write_document(path: &Path, value: &Value) -> Result<(), SnapshotError> {
    let temp_path = path.with_extension("json.tmp");
    let text = serde_json::to_string_pretty(value).map_err(|err| SnapshotError::Json {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    std::fs::write(&temp_path, text).map_err(|err| io_error(&temp_path, err))?;
    std::fs::rename(&temp_path, path).map_err(|err| io_error(path, err))
}

fn io_error(path: &Path, err: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn counter(doc: &Value) -> i64 {
    doc.get("nextId")
        .and_then(Value::as_i64)
        .filter(|id| *id >= 1)
        .unwrap_or(1)
}

fn records<T>(
    doc: &Value,
    key: &str,
    skipped: &mut usize,
    convert: impl Fn(&Value) -> Option<T>,
) -> Vec<T> {
    let Some(items) = doc.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let converted = convert(item);
            if converted.is_none() {
                *skipped += 1;
            }
            converted
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRecord {
    id: i64,
    content: String,
    timestamp: String,
}

fn log_from_record(value: &Value) -> Option<LogEntry> {
    let record = LogRecord::deserialize(value).ok()?;
    let content = record.content.trim();
    if record.id < 1 || content.is_empty() {
        return None;
    }
    Some(LogEntry {
        id: record.id,
        content: content.to_string(),
        timestamp: LogTimestamp::parse_legacy(&record.timestamp).ok()?,
        word_count: count_words(content),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiaryRecord {
    id: i64,
    date: String,
    content: String,
    #[serde(default)]
    created_at: Value,
    #[serde(default)]
    last_updated: Value,
    #[serde(default)]
    log_ids: Vec<Value>,
}

fn diary_from_record(value: &Value) -> Option<DiaryEntry> {
    let record = DiaryRecord::deserialize(value).ok()?;
    let created_at = ms_from_value(&record.created_at).unwrap_or(0);
    let last_updated = ms_from_value(&record.last_updated).unwrap_or(created_at);
    Some(DiaryEntry {
        id: record.id,
        date: parse_db_date(&record.date, "diary.json date").ok()?,
        content: record.content,
        created_at,
        last_updated: last_updated.max(created_at),
        log_ids: record.log_ids.iter().filter_map(parse_log_ref).collect(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    id: i64,
    description: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    completed_at: Value,
    #[serde(default)]
    source_log_id: Value,
    date: String,
    #[serde(default)]
    created_at: Value,
}

fn task_from_record(value: &Value) -> Option<Task> {
    let record = TaskRecord::deserialize(value).ok()?;
    let description = record.description.trim();
    if description.is_empty() {
        return None;
    }
    let created_at = ms_from_value(&record.created_at).unwrap_or(0);
    let completed_at = record
        .completed
        .then(|| ms_from_value(&record.completed_at).unwrap_or(created_at));
    Some(Task {
        id: record.id,
        description: description.to_string(),
        priority: Priority::coerce(record.priority.as_deref()).0,
        completed: record.completed,
        completed_at,
        source_log_id: parse_log_ref(&record.source_log_id),
        date: parse_db_date(&record.date, "tasks.json date").ok()?,
        created_at,
    })
}

/// Reads a time stored as epoch milliseconds or an ISO-8601 string.
///
/// Offset-less ISO strings are read as UTC.
fn ms_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => {
            if let Ok(at) = DateTime::parse_from_rfc3339(text) {
                return Some(at.timestamp_millis());
            }
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|at| at.and_utc().timestamp_millis())
        }
        _ => None,
    }
}

fn iso_from_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::ms_from_value;
    use serde_json::json;

    #[test]
    fn times_accept_epoch_ms_and_iso_strings() {
        assert_eq!(ms_from_value(&json!(1_000)), Some(1_000));
        assert_eq!(
            ms_from_value(&json!("1970-01-01T00:00:01.500")),
            Some(1_500)
        );
        assert_eq!(
            ms_from_value(&json!("1970-01-01T01:00:02+01:00")),
            Some(2_000)
        );
        assert_eq!(ms_from_value(&json!(true)), None);
    }
}
