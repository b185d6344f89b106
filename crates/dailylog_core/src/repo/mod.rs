//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts per aggregate.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Every write that follows an oracle call runs in a single transaction.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Incorporated/analyzed log-id sets are insert-only, except the explicit
//!   diary regeneration path.
//! - Oracle-backed commits take the write lock up front and re-check what
//!   they read, so separate processes cannot both apply the same pass.

pub mod diary_repo;
pub mod log_repo;
pub mod snapshot;
pub mod task_repo;

use crate::repo::log_repo::{RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, TransactionBehavior};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn date_to_db(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_db_date(value: &str, column: &str) -> RepoResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

/// Starts a `BEGIN IMMEDIATE` transaction on a shared connection borrow.
pub(crate) fn write_transaction(conn: &Connection) -> RepoResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(
        conn,
        TransactionBehavior::Immediate,
    )?)
}
