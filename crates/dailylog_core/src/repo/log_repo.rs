//! Log repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide append/edit/delete/list APIs over the `logs` table.
//! - Define the repository error shared by every aggregate.
//!
//! # Invariants
//! - Per-date listings are newest first by timestamp, ties broken by id.
//! - `log_date` always equals the calendar date encoded in `timestamp`.

use crate::db::DbError;
use crate::model::log_entry::LogEntry;
use crate::model::timestamp::LogTimestamp;
use crate::model::LogId;
use crate::repo::{date_to_db, parse_db_date};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const LOG_SELECT_SQL: &str = "SELECT id, content, timestamp, log_date, word_count FROM logs";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: &'static str, id: i64 },
    /// The row changed after it was read; the write was not applied.
    Conflict { entity: &'static str, id: i64 },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict { entity, id } => {
                write!(f, "{entity} {id} was changed by another writer")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } | Self::Conflict { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for log entries.
pub trait LogRepository {
    fn insert_log(
        &self,
        content: &str,
        timestamp: &LogTimestamp,
        word_count: u32,
    ) -> RepoResult<LogEntry>;
    /// Replaces content and word count; `id` and `timestamp` are untouched.
    fn update_log_content(&self, id: LogId, content: &str, word_count: u32)
        -> RepoResult<LogEntry>;
    /// Deletes one log and returns the removed row.
    fn delete_log(&self, id: LogId) -> RepoResult<LogEntry>;
    fn get_log(&self, id: LogId) -> RepoResult<Option<LogEntry>>;
    fn list_logs_for_date(&self, date: NaiveDate) -> RepoResult<Vec<LogEntry>>;
    fn list_logs(&self) -> RepoResult<Vec<LogEntry>>;
}

/// SQLite-backed log repository.
pub struct SqliteLogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLogRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LogRepository for SqliteLogRepository<'_> {
    fn insert_log(
        &self,
        content: &str,
        timestamp: &LogTimestamp,
        word_count: u32,
    ) -> RepoResult<LogEntry> {
        self.conn.execute(
            "INSERT INTO logs (content, timestamp, log_date, word_count)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                content,
                timestamp.as_str(),
                date_to_db(timestamp.date()),
                word_count
            ],
        )?;

        Ok(LogEntry {
            id: self.conn.last_insert_rowid(),
            content: content.to_string(),
            timestamp: timestamp.clone(),
            word_count,
        })
    }

    fn update_log_content(
        &self,
        id: LogId,
        content: &str,
        word_count: u32,
    ) -> RepoResult<LogEntry> {
        let changed = self.conn.execute(
            "UPDATE logs SET content = ?2, word_count = ?3 WHERE id = ?1;",
            params![id, content, word_count],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }

        self.get_log(id)?.ok_or_else(|| not_found(id))
    }

    fn delete_log(&self, id: LogId) -> RepoResult<LogEntry> {
        let existing = self.get_log(id)?.ok_or_else(|| not_found(id))?;
        self.conn.execute("DELETE FROM logs WHERE id = ?1;", [id])?;
        Ok(existing)
    }

    fn get_log(&self, id: LogId) -> RepoResult<Option<LogEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LOG_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt.query_row([id], read_log_columns).optional()?;
        row.map(LogColumns::into_entry).transpose()
    }

    fn list_logs_for_date(&self, date: NaiveDate) -> RepoResult<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LOG_SELECT_SQL}
             WHERE log_date = ?1
             ORDER BY timestamp DESC, id DESC;"
        ))?;
        let rows = stmt.query_map([date_to_db(date)], read_log_columns)?;
        collect_entries(rows)
    }

    fn list_logs(&self) -> RepoResult<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LOG_SELECT_SQL} ORDER BY log_date DESC, timestamp DESC, id DESC;"
        ))?;
        let rows = stmt.query_map([], read_log_columns)?;
        collect_entries(rows)
    }
}

struct LogColumns {
    id: LogId,
    content: String,
    timestamp: String,
    log_date: String,
    word_count: u32,
}

impl LogColumns {
    fn into_entry(self) -> RepoResult<LogEntry> {
        let timestamp = LogTimestamp::parse(&self.timestamp).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid timestamp `{}` in logs.timestamp (id {})",
                self.timestamp, self.id
            ))
        })?;
        let log_date = parse_db_date(&self.log_date, "logs.log_date")?;
        if log_date != timestamp.date() {
            return Err(RepoError::InvalidData(format!(
                "logs.log_date `{}` disagrees with timestamp `{}` (id {})",
                self.log_date, self.timestamp, self.id
            )));
        }

        Ok(LogEntry {
            id: self.id,
            content: self.content,
            timestamp,
            word_count: self.word_count,
        })
    }
}

fn read_log_columns(row: &Row<'_>) -> rusqlite::Result<LogColumns> {
    Ok(LogColumns {
        id: row.get("id")?,
        content: row.get("content")?,
        timestamp: row.get("timestamp")?,
        log_date: row.get("log_date")?,
        word_count: row.get("word_count")?,
    })
}

fn collect_entries(
    rows: impl Iterator<Item = rusqlite::Result<LogColumns>>,
) -> RepoResult<Vec<LogEntry>> {
    rows.map(|row| row.map_err(RepoError::from)?.into_entry())
        .collect()
}

fn not_found(id: LogId) -> RepoError {
    RepoError::NotFound { entity: "log", id }
}
