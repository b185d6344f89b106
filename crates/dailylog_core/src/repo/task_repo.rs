//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist tasks and the per-date set of logs already sent for extraction.
//! - Commit one extraction pass (new tasks + analyzed logs) atomically.
//!
//! # Invariants
//! - The analyzed-log set is insert-only and independent of task yield.
//! - `(source_log_id, description)` is unique when `source_log_id` is set;
//!   a conflicting insert is skipped, never overwrites.
//! - Listings follow display order: incomplete first, High > Medium > Low, id.
//! - A commit drops candidates from logs that another pass analyzed after the
//!   caller read its baseline, so a log is never extracted twice by racing
//!   processes.

use crate::model::task::{NewTask, Priority, Task};
use crate::model::{LogId, TaskId};
use crate::repo::log_repo::{RepoError, RepoResult};
use crate::repo::{bool_to_int, date_to_db, parse_db_date, write_transaction};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    description,
    priority,
    completed,
    completed_at,
    source_log_id,
    task_date,
    created_at
FROM tasks";

const TASK_ORDER_SQL: &str = " ORDER BY
    completed ASC,
    CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END ASC,
    id ASC";

/// Query options for listing tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskFilter {
    pub date: Option<NaiveDate>,
    pub include_completed: bool,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            date: None,
            include_completed: true,
        }
    }
}

/// What one extraction commit applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedExtraction {
    pub inserted: Vec<Task>,
    /// Batch logs analyzed by another pass after the baseline was read.
    pub superseded: BTreeSet<LogId>,
}

/// Repository interface for tasks.
pub trait TaskRepository {
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    fn list_tasks(&self, filter: &TaskFilter) -> RepoResult<Vec<Task>>;
    fn insert_task(&self, task: &NewTask) -> RepoResult<Task>;
    /// Sets completion state; `completed_at = None` marks the task incomplete.
    fn set_task_completion(&self, id: TaskId, completed_at: Option<i64>) -> RepoResult<Task>;
    fn delete_task(&self, id: TaskId) -> RepoResult<()>;
    /// Logs of `date` already analyzed, including legacy provenance links.
    fn analyzed_log_ids(&self, date: NaiveDate) -> RepoResult<BTreeSet<LogId>>;
    /// Records `analyzed` for `date` and inserts `tasks` in one transaction.
    ///
    /// `baseline` is the analyzed set the caller read before consulting the
    /// oracle. Candidates sourced from a log that entered the set since then
    /// are discarded; if the whole batch did, nothing is inserted.
    fn commit_extraction(
        &self,
        date: NaiveDate,
        baseline: &BTreeSet<LogId>,
        analyzed: &BTreeSet<LogId>,
        tasks: &[NewTask],
    ) -> RepoResult<CommittedExtraction>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        get_task_on(self.conn, id)
    }

    fn list_tasks(&self, filter: &TaskFilter) -> RepoResult<Vec<Task>> {
        let mut sql = format!("{TASK_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(date) = filter.date {
            sql.push_str(" AND task_date = ?");
            bind_values.push(Value::Text(date_to_db(date)));
        }
        if !filter.include_completed {
            sql.push_str(" AND completed = 0");
        }
        sql.push_str(TASK_ORDER_SQL);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind_values), read_task_columns)?;
        rows.map(|row| row.map_err(RepoError::from)?.into_task())
            .collect()
    }

    fn insert_task(&self, task: &NewTask) -> RepoResult<Task> {
        match insert_task_on(self.conn, task)? {
            Some(id) => get_task_on(self.conn, id)?.ok_or_else(|| not_found(id)),
            None => Err(RepoError::InvalidData(format!(
                "task `{}` already recorded for source log {:?}",
                task.description, task.source_log_id
            ))),
        }
    }

    fn set_task_completion(&self, id: TaskId, completed_at: Option<i64>) -> RepoResult<Task> {
        let changed = self.conn.execute(
            "UPDATE tasks SET completed = ?2, completed_at = ?3 WHERE id = ?1;",
            params![id, bool_to_int(completed_at.is_some()), completed_at],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        get_task_on(self.conn, id)?.ok_or_else(|| not_found(id))
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<()> {
        let changed = self.conn.execute("DELETE FROM tasks WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn analyzed_log_ids(&self, date: NaiveDate) -> RepoResult<BTreeSet<LogId>> {
        analyzed_on(self.conn, date)
    }

    fn commit_extraction(
        &self,
        date: NaiveDate,
        baseline: &BTreeSet<LogId>,
        analyzed: &BTreeSet<LogId>,
        tasks: &[NewTask],
    ) -> RepoResult<CommittedExtraction> {
        let tx = write_transaction(self.conn)?;
        let current = analyzed_on(&tx, date)?;
        let superseded: BTreeSet<LogId> = analyzed
            .iter()
            .filter(|id| current.contains(*id) && !baseline.contains(*id))
            .copied()
            .collect();
        let batch_superseded = !analyzed.is_empty() && superseded.len() == analyzed.len();

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO task_extraction_logs (task_date, log_id) VALUES (?1, ?2);",
            )?;
            let date_text = date_to_db(date);
            for log_id in analyzed {
                stmt.execute(params![date_text, log_id])?;
            }
        }

        let mut inserted_ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            let skip = match task.source_log_id {
                Some(source) => superseded.contains(&source),
                None => batch_superseded || unsourced_task_exists(&tx, task)?,
            };
            if skip {
                continue;
            }
            if let Some(id) = insert_task_on(&tx, task)? {
                inserted_ids.push(id);
            }
        }
        tx.commit()?;

        let inserted = inserted_ids
            .into_iter()
            .map(|id| get_task_on(self.conn, id)?.ok_or_else(|| not_found(id)))
            .collect::<RepoResult<Vec<_>>>()?;
        Ok(CommittedExtraction {
            inserted,
            superseded,
        })
    }
}

fn analyzed_on(conn: &Connection, date: NaiveDate) -> RepoResult<BTreeSet<LogId>> {
    let mut stmt = conn.prepare(
        "SELECT log_id FROM task_extraction_logs WHERE task_date = ?1
         UNION
         SELECT source_log_id FROM tasks
         WHERE task_date = ?1 AND source_log_id IS NOT NULL;",
    )?;
    let ids = stmt
        .query_map([date_to_db(date)], |row| row.get::<_, LogId>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(ids)
}

fn unsourced_task_exists(conn: &Connection, task: &NewTask) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM tasks
            WHERE task_date = ?1 AND source_log_id IS NULL AND description = ?2
        );",
        params![date_to_db(task.date), task.description.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Inserts one task, returning `None` when the dedup index rejected it.
fn insert_task_on(conn: &Connection, task: &NewTask) -> RepoResult<Option<TaskId>> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO tasks (
            description,
            priority,
            completed,
            completed_at,
            source_log_id,
            task_date,
            created_at
        ) VALUES (?1, ?2, 0, NULL, ?3, ?4, ?5);",
        params![
            task.description.as_str(),
            priority_to_db(task.priority),
            task.source_log_id,
            date_to_db(task.date),
            task.created_at,
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(conn.last_insert_rowid()))
}

fn get_task_on(conn: &Connection, id: TaskId) -> RepoResult<Option<Task>> {
    let mut stmt = conn.prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
    let row = stmt.query_row([id], read_task_columns).optional()?;
    row.map(TaskColumns::into_task).transpose()
}

struct TaskColumns {
    id: TaskId,
    description: String,
    priority: String,
    completed: i64,
    completed_at: Option<i64>,
    source_log_id: Option<LogId>,
    task_date: String,
    created_at: i64,
}

impl TaskColumns {
    fn into_task(self) -> RepoResult<Task> {
        let priority = parse_priority(&self.priority).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid priority `{}` in tasks.priority (id {})",
                self.priority, self.id
            ))
        })?;
        let completed = match self.completed {
            0 => false,
            1 => true,
            other => {
                return Err(RepoError::InvalidData(format!(
                    "invalid completed value `{other}` in tasks.completed (id {})",
                    self.id
                )));
            }
        };

        Ok(Task {
            id: self.id,
            description: self.description,
            priority,
            completed,
            completed_at: if completed { self.completed_at } else { None },
            source_log_id: self.source_log_id,
            date: parse_db_date(&self.task_date, "tasks.task_date")?,
            created_at: self.created_at,
        })
    }
}

fn read_task_columns(row: &Row<'_>) -> rusqlite::Result<TaskColumns> {
    Ok(TaskColumns {
        id: row.get("id")?,
        description: row.get("description")?,
        priority: row.get("priority")?,
        completed: row.get("completed")?,
        completed_at: row.get("completed_at")?,
        source_log_id: row.get("source_log_id")?,
        task_date: row.get("task_date")?,
        created_at: row.get("created_at")?,
    })
}

pub(crate) fn priority_to_db(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "high",
        Priority::Medium => "medium",
        Priority::Low => "low",
    }
}

fn parse_priority(value: &str) -> Option<Priority> {
    match value {
        "high" => Some(Priority::High),
        "medium" => Some(Priority::Medium),
        "low" => Some(Priority::Low),
        _ => None,
    }
}

fn not_found(id: TaskId) -> RepoError {
    RepoError::NotFound { entity: "task", id }
}
