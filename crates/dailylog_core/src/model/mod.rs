//! Domain model for logs, the per-date diary, and extracted tasks.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Own input validation that does not need storage access.
//!
//! # Invariants
//! - Ids are positive integers handed out by storage and never reused.
//! - Diary and task records are historical artifacts: they keep log ids even
//!   after the log itself is deleted.

pub mod diary;
pub mod log_entry;
pub mod task;
pub mod timestamp;

/// Identifier of a [`log_entry::LogEntry`].
pub type LogId = i64;
/// Identifier of a [`diary::DiaryEntry`].
pub type DiaryId = i64;
/// Identifier of a [`task::Task`].
pub type TaskId = i64;
