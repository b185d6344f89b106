//! Task extraction and task management use-case service.
//!
//! # Responsibility
//! - Send a date's logs to the oracle and turn its answer into tasks.
//! - Manual add, completion toggle, delete and ordered listing.
//!
//! # Invariants
//! - `only_new` extraction never resends a log already analyzed for its date,
//!   whether or not that log produced a task.
//! - An unknown priority is coerced to Medium; the task is kept.
//! - A `sourceLogId` outside the analyzed batch is dropped to `None`.
//! - A candidate matching an existing `(sourceLogId, description)` pair for
//!   the date is discarded.
//! - New tasks and the analyzed set are committed together or not at all.
//! - Candidates from logs that a concurrent pass analyzed first are dropped
//!   at commit time.

use crate::clock::Clock;
use crate::model::log_entry::LogEntry;
use crate::model::task::{normalize_description, NewTask, Priority, Task, TaskValidationError};
use crate::model::{LogId, TaskId};
use crate::oracle::{
    parse_task_candidates, Oracle, OracleError, OracleKind, OraclePayload, TaskCandidate,
};
use crate::repo::log_repo::{LogRepository, RepoError};
use crate::repo::task_repo::{TaskFilter, TaskRepository};
use crate::service::date_lock::DateLocks;
use crate::service::ErrorKind;
use chrono::NaiveDate;
use log::{error, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Service error for task use-cases.
#[derive(Debug)]
pub enum TaskServiceError {
    Validation(TaskValidationError),
    TaskNotFound(TaskId),
    Oracle(OracleError),
    Repo(RepoError),
}

impl TaskServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::TaskNotFound(_) => ErrorKind::NotFound,
            Self::Oracle(err) => ErrorKind::from_oracle(err),
            Self::Repo(_) => ErrorKind::Storage,
        }
    }
}

impl Display for TaskServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::Oracle(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaskServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Oracle(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::TaskNotFound(_) => None,
        }
    }
}

impl From<TaskValidationError> for TaskServiceError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<OracleError> for TaskServiceError {
    fn from(value: OracleError) -> Self {
        Self::Oracle(value)
    }
}

impl From<RepoError> for TaskServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity: "task", id } => Self::TaskNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Result of one extraction pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub date: NaiveDate,
    pub created: Vec<Task>,
    /// Logs sent to the oracle in this pass; empty when nothing was sent.
    pub analyzed_log_ids: BTreeSet<LogId>,
    pub skipped_duplicates: usize,
    pub coerced_priorities: usize,
}

impl ExtractionOutcome {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            created: Vec::new(),
            analyzed_log_ids: BTreeSet::new(),
            skipped_duplicates: 0,
            coerced_priorities: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.created.len()
    }
}

/// Task extractor and task management facade.
pub struct TaskService<L: LogRepository, T: TaskRepository> {
    logs: L,
    tasks: T,
    oracle: Arc<dyn Oracle>,
    clock: Arc<dyn Clock>,
    locks: Arc<DateLocks>,
}

impl<L: LogRepository, T: TaskRepository> TaskService<L, T> {
    /// Creates a service. `locks` must be shared by every task service in the
    /// process and must not be the diary services' registry.
    pub fn new(
        logs: L,
        tasks: T,
        oracle: Arc<dyn Oracle>,
        clock: Arc<dyn Clock>,
        locks: Arc<DateLocks>,
    ) -> Self {
        Self {
            logs,
            tasks,
            oracle,
            clock,
            locks,
        }
    }

    /// Extracts tasks from the logs of `date`.
    ///
    /// With `only_new`, logs already analyzed for this date are skipped. An
    /// empty candidate set returns an empty outcome without an oracle call.
    pub fn extract(
        &self,
        date: NaiveDate,
        only_new: bool,
    ) -> Result<ExtractionOutcome, TaskServiceError> {
        let started_at = Instant::now();
        let result = self
            .locks
            .with_date(date, || self.extract_locked(date, only_new));

        match &result {
            Ok(outcome) => info!(
                "event=task_extract module=service status=ok date={} only_new={} analyzed={} created={} skipped_duplicates={} duration_ms={}",
                date,
                only_new,
                outcome.analyzed_log_ids.len(),
                outcome.count(),
                outcome.skipped_duplicates,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=task_extract module=service status=error date={} only_new={} error_kind={:?} duration_ms={} error={}",
                date,
                only_new,
                err.kind(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Adds a task without consulting the oracle.
    pub fn add_manual(
        &self,
        description: &str,
        priority: Priority,
    ) -> Result<Task, TaskServiceError> {
        let description = normalize_description(description)?;
        let task = self.tasks.insert_task(&NewTask {
            description,
            priority,
            source_log_id: None,
            date: self.clock.today(),
            created_at: self.clock.epoch_ms(),
        })?;

        info!(
            "event=task_add module=service status=ok task_id={} priority={}",
            task.id,
            task.priority.label()
        );
        Ok(task)
    }

    /// Flips completion; completing stamps `completed_at`, reopening clears it.
    pub fn toggle(&self, id: TaskId) -> Result<Task, TaskServiceError> {
        let task = self
            .tasks
            .get_task(id)?
            .ok_or(TaskServiceError::TaskNotFound(id))?;
        let completed_at = if task.completed {
            None
        } else {
            Some(self.clock.epoch_ms())
        };
        let updated = self.tasks.set_task_completion(id, completed_at)?;

        info!(
            "event=task_toggle module=service status=ok task_id={} completed={}",
            updated.id, updated.completed
        );
        Ok(updated)
    }

    /// Deletes one task; a missing id is reported as `TaskNotFound`.
    pub fn delete(&self, id: TaskId) -> Result<(), TaskServiceError> {
        self.tasks.delete_task(id)?;
        info!("event=task_delete module=service status=ok task_id={}", id);
        Ok(())
    }

    pub fn get(&self, id: TaskId) -> Result<Task, TaskServiceError> {
        self.tasks
            .get_task(id)?
            .ok_or(TaskServiceError::TaskNotFound(id))
    }

    /// Tasks in display order: incomplete first, then High > Medium > Low.
    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskServiceError> {
        Ok(self.tasks.list_tasks(filter)?)
    }

    fn extract_locked(
        &self,
        date: NaiveDate,
        only_new: bool,
    ) -> Result<ExtractionOutcome, TaskServiceError> {
        let mut logs = self.logs.list_logs_for_date(date)?;
        let baseline = self.tasks.analyzed_log_ids(date)?;
        if only_new {
            logs.retain(|log| !baseline.contains(&log.id));
        }
        if logs.is_empty() {
            return Ok(ExtractionOutcome::empty(date));
        }
        logs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        let payload = OraclePayload::new(date, &logs);
        let raw = self.oracle.invoke(OracleKind::TaskExtract, &payload)?;
        let candidates = parse_task_candidates(&raw)?;

        let sent: BTreeSet<LogId> = payload.log_ids().collect();
        let existing = self.tasks.list_tasks(&TaskFilter {
            date: Some(date),
            include_completed: true,
        })?;
        let mut outcome = ExtractionOutcome::empty(date);
        let new_tasks = self.screen_candidates(date, &logs, candidates, &existing, &mut outcome);

        let committed = self
            .tasks
            .commit_extraction(date, &baseline, &sent, &new_tasks)?;
        if !committed.superseded.is_empty() {
            warn!(
                "event=task_extract module=service status=soft_error date={} error_code=concurrent_extraction superseded_logs={}",
                date,
                committed.superseded.len()
            );
        }
        outcome.skipped_duplicates += new_tasks.len() - committed.inserted.len();
        outcome.created = committed.inserted;
        outcome.analyzed_log_ids = sent;
        Ok(outcome)
    }

    fn screen_candidates(
        &self,
        date: NaiveDate,
        sent_logs: &[LogEntry],
        candidates: Vec<TaskCandidate>,
        existing: &[Task],
        outcome: &mut ExtractionOutcome,
    ) -> Vec<NewTask> {
        let sent_ids: HashSet<LogId> = sent_logs.iter().map(|log| log.id).collect();
        let mut seen: HashSet<(Option<LogId>, String)> = existing
            .iter()
            .map(|task| {
                let (source, description) = task.dedup_key();
                (source, description.to_string())
            })
            .collect();
        let created_at = self.clock.epoch_ms();

        let mut accepted = Vec::new();
        for candidate in candidates {
            let (priority, coerced) = Priority::coerce(candidate.priority.as_deref());
            if coerced {
                outcome.coerced_priorities += 1;
                warn!(
                    "event=task_extract module=service status=soft_error date={} error_code=unknown_priority fallback=Medium",
                    date
                );
            }

            let source_log_id = match candidate.source_log_id {
                Some(id) if sent_ids.contains(&id) => Some(id),
                Some(id) => {
                    warn!(
                        "event=task_extract module=service status=soft_error date={} error_code=foreign_source_log source_log_id={}",
                        date, id
                    );
                    None
                }
                None => None,
            };

            if !seen.insert((source_log_id, candidate.description.clone())) {
                outcome.skipped_duplicates += 1;
                continue;
            }
            accepted.push(NewTask {
                description: candidate.description,
                priority,
                source_log_id,
                date,
                created_at,
            });
        }
        accepted
    }
}
