//! Task domain model.
//!
//! # Invariants
//! - `description` is never blank.
//! - `source_log_id` is a provenance lookup only; the log may no longer exist.
//! - Among tasks with a non-null `source_log_id`, the pair
//!   `(source_log_id, description)` is unique.
//! - `completed_at` is set exactly when `completed` is true.

use crate::model::{LogId, TaskId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Task urgency bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Parses a priority label case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Parses a label, falling back to `Medium`.
    ///
    /// The boolean is `true` when the fallback was used.
    pub fn coerce(value: Option<&str>) -> (Self, bool) {
        match value.and_then(Self::parse) {
            Some(priority) => (priority, false),
            None => (Self::Medium, true),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

/// Input validation failure for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskValidationError {
    EmptyDescription,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDescription => write!(f, "task description must not be empty"),
        }
    }
}

impl Error for TaskValidationError {}

/// One actionable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub priority: Priority,
    pub completed: bool,
    /// Unix epoch milliseconds; present only while `completed` is true.
    pub completed_at: Option<i64>,
    pub source_log_id: Option<LogId>,
    pub date: NaiveDate,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Task {
    /// Dedup key shared by extraction passes.
    pub fn dedup_key(&self) -> (Option<LogId>, &str) {
        (self.source_log_id, self.description.as_str())
    }
}

/// Insert model for a task that has no id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub description: String,
    pub priority: Priority,
    pub source_log_id: Option<LogId>,
    pub date: NaiveDate,
    pub created_at: i64,
}

/// Trims a task description and rejects blank input.
pub fn normalize_description(description: &str) -> Result<String, TaskValidationError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(TaskValidationError::EmptyDescription);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{normalize_description, Priority, TaskValidationError};

    #[test]
    fn priority_parse_is_case_insensitive_and_coerces_unknown() {
        assert_eq!(Priority::parse(" HIGH "), Some(Priority::High));
        assert_eq!(Priority::coerce(Some("urgent")), (Priority::Medium, true));
        assert_eq!(Priority::coerce(None), (Priority::Medium, true));
        assert_eq!(Priority::coerce(Some("low")), (Priority::Low, false));
    }

    #[test]
    fn descriptions_are_trimmed_and_blank_ones_rejected() {
        assert_eq!(normalize_description("  buy milk \n").unwrap(), "buy milk");
        assert_eq!(
            normalize_description(" \t "),
            Err(TaskValidationError::EmptyDescription)
        );
    }
}
