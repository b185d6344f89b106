//! Log store use-case service.
//!
//! # Responsibility
//! - Append, edit, delete and list user logs.
//! - Report "log changed" eligibility to the caller after edit/delete.
//!
//! # Invariants
//! - Content is trimmed; blank content is rejected before any write.
//! - Edit/delete never touch diary or task state. They only report whether
//!   the date's diary could now be updated.

use crate::clock::Clock;
use crate::model::log_entry::{count_words, normalize_log_content, LogEntry, LogValidationError};
use crate::model::timestamp::LogTimestamp;
use crate::model::LogId;
use crate::repo::diary_repo::DiaryRepository;
use crate::repo::log_repo::{LogRepository, RepoError};
use crate::service::ErrorKind;
use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Service error for log use-cases.
#[derive(Debug)]
pub enum LogServiceError {
    Validation(LogValidationError),
    LogNotFound(LogId),
    Repo(RepoError),
}

impl LogServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::LogNotFound(_) => ErrorKind::NotFound,
            Self::Repo(_) => ErrorKind::Storage,
        }
    }
}

impl Display for LogServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::LogNotFound(id) => write!(f, "log not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LogServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::LogNotFound(_) => None,
        }
    }
}

impl From<LogValidationError> for LogServiceError {
    fn from(value: LogValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for LogServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity: "log", id } => Self::LogNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Outcome of the "log changed" hook after an edit or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogChange {
    pub log_id: LogId,
    pub date: NaiveDate,
    /// A diary exists for `date`, so a manual update/regenerate is offered.
    pub diary_update_available: bool,
    /// The changed log had already been merged into that diary.
    pub incorporated_in_diary: bool,
}

/// Result of a log edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEdited {
    pub entry: LogEntry,
    pub change: LogChange,
}

/// Log store facade over repository implementations.
pub struct LogService<L: LogRepository, D: DiaryRepository> {
    logs: L,
    diaries: D,
    clock: Arc<dyn Clock>,
}

impl<L: LogRepository, D: DiaryRepository> LogService<L, D> {
    pub fn new(logs: L, diaries: D, clock: Arc<dyn Clock>) -> Self {
        Self {
            logs,
            diaries,
            clock,
        }
    }

    /// Appends one log stamped with the current local time.
    pub fn append(&self, content: &str) -> Result<LogEntry, LogServiceError> {
        let content = normalize_log_content(content)?;
        let timestamp = LogTimestamp::from_datetime(self.clock.local_now());
        let entry = self
            .logs
            .insert_log(&content, &timestamp, count_words(&content))?;

        info!(
            "event=log_append module=service status=ok log_id={} date={} words={}",
            entry.id,
            entry.date(),
            entry.word_count
        );
        Ok(entry)
    }

    /// Replaces the content of one log; id and timestamp are kept.
    pub fn edit(&self, id: LogId, content: &str) -> Result<LogEdited, LogServiceError> {
        let content = normalize_log_content(content)?;
        let entry = self
            .logs
            .update_log_content(id, &content, count_words(&content))?;
        let change = self.log_changed(entry.id, entry.date())?;

        info!(
            "event=log_edit module=service status=ok log_id={} date={} diary_update_available={}",
            entry.id, change.date, change.diary_update_available
        );
        Ok(LogEdited { entry, change })
    }

    /// Deletes one log. Diary content and tasks derived from it are kept.
    pub fn delete(&self, id: LogId) -> Result<LogChange, LogServiceError> {
        let removed = self.logs.delete_log(id)?;
        let change = self.log_changed(removed.id, removed.date())?;

        info!(
            "event=log_delete module=service status=ok log_id={} date={} incorporated={}",
            removed.id, change.date, change.incorporated_in_diary
        );
        Ok(change)
    }

    pub fn get(&self, id: LogId) -> Result<LogEntry, LogServiceError> {
        self.logs
            .get_log(id)?
            .ok_or(LogServiceError::LogNotFound(id))
    }

    /// Logs captured on `date`, newest first.
    pub fn list_for_date(&self, date: NaiveDate) -> Result<Vec<LogEntry>, LogServiceError> {
        Ok(self.logs.list_logs_for_date(date)?)
    }

    /// Every log, newest first.
    pub fn list_all(&self) -> Result<Vec<LogEntry>, LogServiceError> {
        Ok(self.logs.list_logs()?)
    }

    fn log_changed(&self, log_id: LogId, date: NaiveDate) -> Result<LogChange, LogServiceError> {
        let diary = self.diaries.get_diary_for_date(date)?;
        Ok(LogChange {
            log_id,
            date,
            diary_update_available: diary.is_some(),
            incorporated_in_diary: diary.is_some_and(|entry| entry.has_incorporated(log_id)),
        })
    }
}
