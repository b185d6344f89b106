//! Log entry domain model.
//!
//! # Invariants
//! - `content` is never blank after trimming.
//! - `word_count` is derived from `content` and recomputed on every edit.
//! - Editing changes neither `id` nor `timestamp`.

use crate::model::timestamp::LogTimestamp;
use crate::model::LogId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Input validation failure for log content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogValidationError {
    EmptyContent,
}

impl Display for LogValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContent => write!(f, "log content must not be empty"),
        }
    }
}

impl Error for LogValidationError {}

/// One timestamped user note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: LogId,
    pub content: String,
    pub timestamp: LogTimestamp,
    pub word_count: u32,
}

impl LogEntry {
    /// Calendar date this log belongs to.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Trims log content and rejects blank input.
pub fn normalize_log_content(content: &str) -> Result<String, LogValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(LogValidationError::EmptyContent);
    }
    Ok(trimmed.to_string())
}

/// Whitespace-delimited word count, saturating at `u32::MAX`.
pub fn count_words(content: &str) -> u32 {
    u32::try_from(content.split_whitespace().count()).unwrap_or(u32::MAX)
}
