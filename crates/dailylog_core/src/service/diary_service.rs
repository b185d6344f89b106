//! Diary synthesis use-case service.
//!
//! # Responsibility
//! - Keep at most one diary entry per date in sync with that date's logs.
//! - Send the oracle only the material it has not seen yet.
//!
//! # Invariants
//! - Absent + any mode → full create from every log of the date.
//! - Present + `Regenerate` → full rebuild; id and `created_at` are kept and
//!   the incorporated set becomes exactly the current logs.
//! - Present + `Create`/`Incremental` → merge of unseen logs only; with no
//!   unseen logs nothing is called and nothing changes.
//! - A date with no logs never gets an (empty) entry.
//! - Any oracle or storage failure leaves the entry exactly as it was.
//! - A commit that finds the entry changed by another writer is discarded
//!   and the pass starts over from the stored state.

use crate::clock::Clock;
use crate::model::diary::{DiaryEntry, SynthesisMode};
use crate::model::log_entry::LogEntry;
use crate::model::LogId;
use crate::oracle::{parse_diary_text, Oracle, OracleError, OracleKind, OraclePayload};
use crate::repo::diary_repo::DiaryRepository;
use crate::repo::log_repo::{LogRepository, RepoError};
use crate::service::date_lock::DateLocks;
use crate::service::ErrorKind;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Passes attempted before a storage conflict is reported to the caller.
const MAX_SYNTHESIS_ATTEMPTS: usize = 3;

/// Service error for diary use-cases.
#[derive(Debug)]
pub enum DiaryServiceError {
    /// The date has no logs to synthesize from.
    NoLogs(NaiveDate),
    /// No diary entry exists for the date.
    DiaryNotFound(NaiveDate),
    Oracle(OracleError),
    Repo(RepoError),
}

impl DiaryServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoLogs(_) => ErrorKind::NoLogs,
            Self::DiaryNotFound(_) => ErrorKind::NotFound,
            Self::Oracle(err) => ErrorKind::from_oracle(err),
            Self::Repo(_) => ErrorKind::Storage,
        }
    }
}

impl Display for DiaryServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoLogs(date) => write!(f, "no logs found for {date}"),
            Self::DiaryNotFound(date) => write!(f, "no diary entry for {date}"),
            Self::Oracle(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DiaryServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Oracle(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::NoLogs(_) | Self::DiaryNotFound(_) => None,
        }
    }
}

impl From<OracleError> for DiaryServiceError {
    fn from(value: OracleError) -> Self {
        Self::Oracle(value)
    }
}

impl From<RepoError> for DiaryServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// What a synthesis call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SynthesisAction {
    Created,
    Regenerated,
    Merged {
        #[serde(rename = "newLogIds")]
        new_log_ids: BTreeSet<LogId>,
    },
    /// Every log was already incorporated; the oracle was not called.
    Unchanged,
}

/// Result of [`DiaryService::synthesize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesisOutcome {
    pub entry: DiaryEntry,
    #[serde(flatten)]
    pub action: SynthesisAction,
}

/// Diary synthesizer facade.
pub struct DiaryService<L: LogRepository, D: DiaryRepository> {
    logs: L,
    diaries: D,
    oracle: Arc<dyn Oracle>,
    clock: Arc<dyn Clock>,
    locks: Arc<DateLocks>,
}

impl<L: LogRepository, D: DiaryRepository> DiaryService<L, D> {
    /// Creates a service. `locks` must be shared by every diary service in
    /// the process for per-date serialization to hold.
    pub fn new(
        logs: L,
        diaries: D,
        oracle: Arc<dyn Oracle>,
        clock: Arc<dyn Clock>,
        locks: Arc<DateLocks>,
    ) -> Self {
        Self {
            logs,
            diaries,
            oracle,
            clock,
            locks,
        }
    }

    /// Synthesizes the diary for `date` according to `mode`.
    pub fn synthesize(
        &self,
        date: NaiveDate,
        mode: SynthesisMode,
    ) -> Result<SynthesisOutcome, DiaryServiceError> {
        let started_at = Instant::now();
        let result = self
            .locks
            .with_date(date, || self.synthesize_locked(date, mode));

        match &result {
            Ok(outcome) => info!(
                "event=diary_synthesize module=service status=ok date={} mode={} action={} log_ids={} duration_ms={}",
                date,
                mode.as_str(),
                action_label(&outcome.action),
                outcome.entry.log_ids.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=diary_synthesize module=service status=error date={} mode={} error_kind={:?} duration_ms={} error={}",
                date,
                mode.as_str(),
                err.kind(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Whether a manual update action should be offered for `date`.
    pub fn update_available(&self, date: NaiveDate) -> Result<bool, DiaryServiceError> {
        Ok(self.diaries.diary_exists_for_date(date)?)
    }

    pub fn get(&self, date: NaiveDate) -> Result<Option<DiaryEntry>, DiaryServiceError> {
        Ok(self.diaries.get_diary_for_date(date)?)
    }

    /// All diary entries, newest date first.
    pub fn list(&self) -> Result<Vec<DiaryEntry>, DiaryServiceError> {
        Ok(self.diaries.list_diaries()?)
    }

    /// Renders one entry as a standalone markdown document.
    pub fn export_markdown(&self, date: NaiveDate) -> Result<String, DiaryServiceError> {
        let entry = self
            .diaries
            .get_diary_for_date(date)?
            .ok_or(DiaryServiceError::DiaryNotFound(date))?;
        Ok(render_markdown(&entry))
    }

    fn synthesize_locked(
        &self,
        date: NaiveDate,
        mode: SynthesisMode,
    ) -> Result<SynthesisOutcome, DiaryServiceError> {
        let mut attempt = 1;
        loop {
            match self.synthesize_once(date, mode) {
                Err(DiaryServiceError::Repo(RepoError::Conflict { .. }))
                    if attempt < MAX_SYNTHESIS_ATTEMPTS =>
                {
                    warn!(
                        "event=diary_synthesize module=service status=retry date={} mode={} attempt={} error_code=concurrent_write",
                        date,
                        mode.as_str(),
                        attempt
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn synthesize_once(
        &self,
        date: NaiveDate,
        mode: SynthesisMode,
    ) -> Result<SynthesisOutcome, DiaryServiceError> {
        let logs = self.logs.list_logs_for_date(date)?;
        match (self.diaries.get_diary_for_date(date)?, mode) {
            (None, _) => self.create(date, &logs),
            (Some(entry), SynthesisMode::Regenerate) => self.regenerate(entry, &logs),
            (Some(entry), SynthesisMode::Create | SynthesisMode::Incremental) => {
                self.merge(entry, &logs)
            }
        }
    }

    fn create(
        &self,
        date: NaiveDate,
        logs: &[LogEntry],
    ) -> Result<SynthesisOutcome, DiaryServiceError> {
        let content = self.generate_full(date, logs)?;
        let log_ids = logs.iter().map(|log| log.id).collect();
        let entry = self
            .diaries
            .create_diary(date, &content, self.clock.epoch_ms(), &log_ids)?;
        Ok(SynthesisOutcome {
            entry,
            action: SynthesisAction::Created,
        })
    }

    fn regenerate(
        &self,
        entry: DiaryEntry,
        logs: &[LogEntry],
    ) -> Result<SynthesisOutcome, DiaryServiceError> {
        let content = self.generate_full(entry.date, logs)?;
        let log_ids = logs.iter().map(|log| log.id).collect();
        let entry = self.diaries.regenerate_diary(
            &entry,
            &content,
            self.next_update_time(&entry),
            &log_ids,
        )?;
        Ok(SynthesisOutcome {
            entry,
            action: SynthesisAction::Regenerated,
        })
    }

    fn merge(
        &self,
        entry: DiaryEntry,
        logs: &[LogEntry],
    ) -> Result<SynthesisOutcome, DiaryServiceError> {
        let new_logs: Vec<LogEntry> = logs
            .iter()
            .filter(|log| !entry.has_incorporated(log.id))
            .cloned()
            .collect();
        if new_logs.is_empty() {
            return Ok(SynthesisOutcome {
                entry,
                action: SynthesisAction::Unchanged,
            });
        }

        let payload = OraclePayload::new(entry.date, &chronological(&new_logs))
            .with_existing_diary(entry.content.as_str());
        let raw = self.oracle.invoke(OracleKind::DiaryUpdate, &payload)?;
        let content = parse_diary_text(&raw)?;

        let new_log_ids: BTreeSet<LogId> = payload.log_ids().collect();
        let updated = self.diaries.merge_into_diary(
            &entry,
            &content,
            self.next_update_time(&entry),
            &new_log_ids,
        )?;
        Ok(SynthesisOutcome {
            entry: updated,
            action: SynthesisAction::Merged { new_log_ids },
        })
    }

    fn generate_full(
        &self,
        date: NaiveDate,
        logs: &[LogEntry],
    ) -> Result<String, DiaryServiceError> {
        if logs.is_empty() {
            return Err(DiaryServiceError::NoLogs(date));
        }
        let payload = OraclePayload::new(date, &chronological(logs));
        let raw = self.oracle.invoke(OracleKind::DiaryCreate, &payload)?;
        Ok(parse_diary_text(&raw)?)
    }

    fn next_update_time(&self, entry: &DiaryEntry) -> i64 {
        self.clock.epoch_ms().max(entry.last_updated)
    }
}

/// Oldest first, the order a narrative is written in.
fn chronological(logs: &[LogEntry]) -> Vec<LogEntry> {
    let mut ordered = logs.to_vec();
    ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    ordered
}

fn action_label(action: &SynthesisAction) -> &'static str {
    match action {
        SynthesisAction::Created => "created",
        SynthesisAction::Regenerated => "regenerated",
        SynthesisAction::Merged { .. } => "merged",
        SynthesisAction::Unchanged => "unchanged",
    }
}

/// Markdown export of one diary entry.
pub fn render_markdown(entry: &DiaryEntry) -> String {
    let updated = DateTime::<Utc>::from_timestamp_millis(entry.last_updated)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| entry.last_updated.to_string());
    format!(
        "# {}\n\n{}\n\n---\n_Based on {} log(s). Last updated {}._\n",
        entry.date.format("%A, %B %-d, %Y"),
        entry.content.trim_end(),
        entry.log_ids.len(),
        updated
    )
}
