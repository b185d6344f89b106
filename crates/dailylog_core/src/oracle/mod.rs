//! External natural-language oracle contract.
//!
//! # Responsibility
//! - Define the single `invoke(kind, payload)` seam the services call.
//! - Convert raw oracle text into typed results right at the boundary.
//!
//! # Invariants
//! - Unvalidated oracle output never reaches persistence: services only see
//!   `DiaryText` or `Vec<TaskCandidate>`.
//! - Availability failures and format failures stay distinct.

pub mod chat;
pub mod parse;

use crate::model::log_entry::LogEntry;
use crate::model::LogId;
use chrono::NaiveDate;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use parse::{parse_diary_text, parse_task_candidates, TaskCandidate};

pub type OracleResult<T> = Result<T, OracleError>;

/// Oracle call failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// No oracle endpoint/credential is configured.
    NotConfigured,
    /// Network, timeout, rate-limit or non-success status. Safe to retry.
    Unavailable(String),
    /// The oracle answered but the output could not be parsed.
    Format(String),
}

impl Display for OracleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "oracle is not configured"),
            Self::Unavailable(message) => {
                write!(f, "oracle unavailable, please retry later: {message}")
            }
            Self::Format(message) => write!(f, "oracle returned malformed output: {message}"),
        }
    }
}

impl Error for OracleError {}

/// Kind of generation requested from the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OracleKind {
    DiaryCreate,
    DiaryUpdate,
    TaskExtract,
}

impl OracleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiaryCreate => "diary-create",
            Self::DiaryUpdate => "diary-update",
            Self::TaskExtract => "task-extract",
        }
    }
}

/// One log as presented to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleLog {
    pub id: LogId,
    pub content: String,
}

impl From<&LogEntry> for OracleLog {
    fn from(value: &LogEntry) -> Self {
        Self {
            id: value.id,
            content: value.content.clone(),
        }
    }
}

/// Structured input for one oracle call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OraclePayload {
    pub date: NaiveDate,
    /// Current diary content; set only for `DiaryUpdate`.
    pub existing_diary: Option<String>,
    /// Logs in chronological order.
    pub logs: Vec<OracleLog>,
}

impl OraclePayload {
    pub fn new(date: NaiveDate, logs: &[LogEntry]) -> Self {
        Self {
            date,
            existing_diary: None,
            logs: logs.iter().map(OracleLog::from).collect(),
        }
    }

    pub fn with_existing_diary(mut self, content: impl Into<String>) -> Self {
        self.existing_diary = Some(content.into());
        self
    }

    pub fn log_ids(&self) -> impl Iterator<Item = LogId> + '_ {
        self.logs.iter().map(|log| log.id)
    }
}

/// Stateless generation service.
///
/// Implementations return the raw text produced for `kind`; callers parse it
/// through [`parse_diary_text`] or [`parse_task_candidates`].
pub trait Oracle: Send + Sync {
    fn invoke(&self, kind: OracleKind, payload: &OraclePayload) -> OracleResult<String>;
}

/// Oracle used when nothing is configured; every call fails cleanly.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredOracle;

impl Oracle for UnconfiguredOracle {
    fn invoke(&self, _kind: OracleKind, _payload: &OraclePayload) -> OracleResult<String> {
        Err(OracleError::NotConfigured)
    }
}
