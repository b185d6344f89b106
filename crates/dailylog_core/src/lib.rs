//! Core domain logic for dailylog.
//!
//! Timestamped logs are the only user-authored input; diary entries and
//! tasks are derived from them through an [`Oracle`]. This crate owns every
//! invariant about that derivation. Transports (the CLI) stay thin.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod oracle;
pub mod repo;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError, OracleConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::diary::{DiaryEntry, SynthesisMode};
pub use model::log_entry::{LogEntry, LogValidationError};
pub use model::task::{NewTask, Priority, Task, TaskValidationError};
pub use model::timestamp::{LogTimestamp, TimestampError};
pub use model::{DiaryId, LogId, TaskId};
pub use oracle::chat::{build_oracle, oracle_status, ChatCompletionsOracle, OracleStatus};
pub use oracle::{
    Oracle, OracleError, OracleKind, OracleLog, OraclePayload, OracleResult, UnconfiguredOracle,
};
pub use repo::diary_repo::{DiaryRepository, SqliteDiaryRepository};
pub use repo::log_repo::{LogRepository, RepoError, RepoResult, SqliteLogRepository};
pub use repo::snapshot::{
    load_snapshot, read_snapshot_dir, replace_with_snapshot, write_snapshot_dir, ImportSummary,
    SnapshotError, StateSnapshot,
};
pub use repo::task_repo::{
    CommittedExtraction, SqliteTaskRepository, TaskFilter, TaskRepository,
};
pub use service::date_lock::DateLocks;
pub use service::diary_service::{
    DiaryService, DiaryServiceError, SynthesisAction, SynthesisOutcome,
};
pub use service::log_service::{LogChange, LogEdited, LogService, LogServiceError};
pub use service::task_service::{ExtractionOutcome, TaskService, TaskServiceError};
pub use service::ErrorKind;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
