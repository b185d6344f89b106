//! Diary entry domain model.
//!
//! # Invariants
//! - At most one entry exists per calendar date (enforced by storage).
//! - `created_at` is set once; `last_updated` never decreases.
//! - `log_ids` only grows, except that an explicit regeneration resets it to
//!   exactly the logs present for the date at that moment.

use crate::model::{DiaryId, LogId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Synthesized narrative for one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiaryEntry {
    pub id: DiaryId,
    pub date: NaiveDate,
    pub content: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub last_updated: i64,
    /// Logs already incorporated into `content`.
    pub log_ids: BTreeSet<LogId>,
}

impl DiaryEntry {
    pub fn has_incorporated(&self, log_id: LogId) -> bool {
        self.log_ids.contains(&log_id)
    }
}

/// Caller-selected synthesis mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Create when absent; behaves as `Incremental` when an entry exists.
    Create,
    /// Rebuild content from every current log, keeping id and `created_at`.
    Regenerate,
    /// Merge only logs not yet incorporated.
    Incremental,
}

impl SynthesisMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Regenerate => "regenerate",
            Self::Incremental => "incremental",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "regenerate" => Some(Self::Regenerate),
            "incremental" | "update" => Some(Self::Incremental),
            _ => None,
        }
    }
}
