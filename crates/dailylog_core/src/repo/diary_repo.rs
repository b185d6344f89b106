//! Diary repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist one diary entry per date together with its incorporated-log set.
//! - Apply content and log-set changes atomically.
//!
//! # Invariants
//! - `entry_date` is unique; a second create for the same date fails with
//!   `RepoError::Conflict`.
//! - `merge_into_diary` only inserts into the incorporated-log set.
//! - `regenerate_diary` is the only path that replaces the set.
//! - Merge and regenerate apply only if the stored entry still equals the
//!   one the caller read; otherwise they fail with `RepoError::Conflict`.

use crate::model::diary::DiaryEntry;
use crate::model::{DiaryId, LogId};
use crate::repo::log_repo::{RepoError, RepoResult};
use crate::repo::{date_to_db, parse_db_date, write_transaction};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

const DIARY_SELECT_SQL: &str =
    "SELECT id, entry_date, content, created_at, last_updated FROM diary_entries";

/// Repository interface for diary entries.
pub trait DiaryRepository {
    fn get_diary_for_date(&self, date: NaiveDate) -> RepoResult<Option<DiaryEntry>>;
    fn diary_exists_for_date(&self, date: NaiveDate) -> RepoResult<bool>;
    /// Lists all entries, newest date first.
    fn list_diaries(&self) -> RepoResult<Vec<DiaryEntry>>;
    fn create_diary(
        &self,
        date: NaiveDate,
        content: &str,
        now_ms: i64,
        log_ids: &BTreeSet<LogId>,
    ) -> RepoResult<DiaryEntry>;
    /// Replaces content and adds `new_log_ids` to the incorporated set of
    /// `expected`, provided the stored entry still matches it.
    fn merge_into_diary(
        &self,
        expected: &DiaryEntry,
        content: &str,
        last_updated: i64,
        new_log_ids: &BTreeSet<LogId>,
    ) -> RepoResult<DiaryEntry>;
    /// Replaces content and the whole incorporated set of `expected`,
    /// provided the stored entry still matches it.
    fn regenerate_diary(
        &self,
        expected: &DiaryEntry,
        content: &str,
        last_updated: i64,
        log_ids: &BTreeSet<LogId>,
    ) -> RepoResult<DiaryEntry>;
}

/// SQLite-backed diary repository.
pub struct SqliteDiaryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDiaryRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn get_by_id(&self, id: DiaryId) -> RepoResult<DiaryEntry> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DIARY_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt.query_row([id], read_diary_columns).optional()?;
        match row {
            Some(columns) => self.hydrate(columns),
            None => Err(not_found(id)),
        }
    }

    fn hydrate(&self, columns: DiaryColumns) -> RepoResult<DiaryEntry> {
        let log_ids = load_log_ids(self.conn, columns.id)?;
        Ok(DiaryEntry {
            id: columns.id,
            date: parse_db_date(&columns.entry_date, "diary_entries.entry_date")?,
            content: columns.content,
            created_at: columns.created_at,
            last_updated: columns.last_updated,
            log_ids,
        })
    }
}

impl DiaryRepository for SqliteDiaryRepository<'_> {
    fn get_diary_for_date(&self, date: NaiveDate) -> RepoResult<Option<DiaryEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DIARY_SELECT_SQL} WHERE entry_date = ?1;"))?;
        let row = stmt
            .query_row([date_to_db(date)], read_diary_columns)
            .optional()?;
        row.map(|columns| self.hydrate(columns)).transpose()
    }

    fn diary_exists_for_date(&self, date: NaiveDate) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM diary_entries WHERE entry_date = ?1);",
            [date_to_db(date)],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list_diaries(&self) -> RepoResult<Vec<DiaryEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DIARY_SELECT_SQL} ORDER BY entry_date DESC;"))?;
        let rows = stmt
            .query_map([], read_diary_columns)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|columns| self.hydrate(columns)).collect()
    }

    fn create_diary(
        &self,
        date: NaiveDate,
        content: &str,
        now_ms: i64,
        log_ids: &BTreeSet<LogId>,
    ) -> RepoResult<DiaryEntry> {
        let tx = write_transaction(self.conn)?;
        let existing: Option<DiaryId> = tx
            .query_row(
                "SELECT id FROM diary_entries WHERE entry_date = ?1;",
                [date_to_db(date)],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Err(conflict(id));
        }
        tx.execute(
            "INSERT INTO diary_entries (entry_date, content, created_at, last_updated)
             VALUES (?1, ?2, ?3, ?3);",
            params![date_to_db(date), content, now_ms],
        )?;
        let id = tx.last_insert_rowid();
        insert_log_ids(&tx, id, log_ids)?;
        tx.commit()?;

        self.get_by_id(id)
    }

    fn merge_into_diary(
        &self,
        expected: &DiaryEntry,
        content: &str,
        last_updated: i64,
        new_log_ids: &BTreeSet<LogId>,
    ) -> RepoResult<DiaryEntry> {
        let id = expected.id;
        let tx = write_transaction(self.conn)?;
        ensure_unchanged(&tx, expected)?;
        update_content(&tx, id, content, last_updated)?;
        insert_log_ids(&tx, id, new_log_ids)?;
        tx.commit()?;

        self.get_by_id(id)
    }

    fn regenerate_diary(
        &self,
        expected: &DiaryEntry,
        content: &str,
        last_updated: i64,
        log_ids: &BTreeSet<LogId>,
    ) -> RepoResult<DiaryEntry> {
        let id = expected.id;
        let tx = write_transaction(self.conn)?;
        ensure_unchanged(&tx, expected)?;
        update_content(&tx, id, content, last_updated)?;
        tx.execute("DELETE FROM diary_entry_logs WHERE diary_id = ?1;", [id])?;
        insert_log_ids(&tx, id, log_ids)?;
        tx.commit()?;

        self.get_by_id(id)
    }
}

struct DiaryColumns {
    id: DiaryId,
    entry_date: String,
    content: String,
    created_at: i64,
    last_updated: i64,
}

fn read_diary_columns(row: &Row<'_>) -> rusqlite::Result<DiaryColumns> {
    Ok(DiaryColumns {
        id: row.get("id")?,
        entry_date: row.get("entry_date")?,
        content: row.get("content")?,
        created_at: row.get("created_at")?,
        last_updated: row.get("last_updated")?,
    })
}

/// Fails with `Conflict` unless the stored entry still equals `expected`.
fn ensure_unchanged(conn: &Connection, expected: &DiaryEntry) -> RepoResult<()> {
    let stored: Option<(String, i64)> = conn
        .query_row(
            "SELECT content, last_updated FROM diary_entries WHERE id = ?1;",
            [expected.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((content, last_updated)) = stored else {
        return Err(not_found(expected.id));
    };
    if content != expected.content
        || last_updated != expected.last_updated
        || load_log_ids(conn, expected.id)? != expected.log_ids
    {
        return Err(conflict(expected.id));
    }
    Ok(())
}

fn update_content(
    conn: &Connection,
    id: DiaryId,
    content: &str,
    last_updated: i64,
) -> RepoResult<()> {
    // MAX() keeps `last_updated` monotonic even if the wall clock stepped back.
    let changed = conn.execute(
        "UPDATE diary_entries
         SET content = ?2, last_updated = MAX(last_updated, ?3)
         WHERE id = ?1;",
        params![id, content, last_updated],
    )?;
    if changed == 0 {
        return Err(not_found(id));
    }
    Ok(())
}

pub(crate) fn insert_log_ids(
    conn: &Connection,
    diary_id: DiaryId,
    log_ids: &BTreeSet<LogId>,
) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO diary_entry_logs (diary_id, log_id) VALUES (?1, ?2);",
    )?;
    for log_id in log_ids {
        stmt.execute(params![diary_id, log_id])?;
    }
    Ok(())
}

fn load_log_ids(conn: &Connection, diary_id: DiaryId) -> RepoResult<BTreeSet<LogId>> {
    let mut stmt =
        conn.prepare("SELECT log_id FROM diary_entry_logs WHERE diary_id = ?1 ORDER BY log_id;")?;
    let ids = stmt
        .query_map([diary_id], |row| row.get::<_, LogId>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(ids)
}

fn conflict(id: DiaryId) -> RepoError {
    RepoError::Conflict {
        entity: "diary entry",
        id,
    }
}

fn not_found(id: DiaryId) -> RepoError {
    RepoError::NotFound {
        entity: "diary entry",
        id,
    }
}
