use chrono::NaiveDate;
use dailylog_core::db::migrations::latest_version;
use dailylog_core::{
    open_db, open_db_in_memory, DbError, LogService, ManualClock, SqliteDiaryRepository,
    SqliteLogRepository,
};
use rusqlite::Connection;
use std::sync::Arc;

const TABLES: [&str; 5] = [
    "logs",
    "diary_entries",
    "diary_entry_logs",
    "tasks",
    "task_extraction_logs",
];

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in TABLES {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn reopening_a_file_database_keeps_schema_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("dailylog.sqlite3");

    let conn = open_db(&path).unwrap();
    append(&conn, "first entry");
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM logs;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn first_id_is_one_and_deleted_ids_are_not_reused() {
    let conn = open_db_in_memory().unwrap();
    let service = logs(&conn);

    let first = service.append("one").unwrap();
    assert_eq!(first.id, 1);
    service.delete(first.id).unwrap();

    let second = service.append("two").unwrap();
    assert_eq!(second.id, 2);
}

#[test]
fn schema_rejects_blank_log_content() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO logs (content, timestamp, log_date, word_count)
         VALUES ('   ', '09000002062024', '2024-06-02', 0);",
        [],
    );
    assert!(result.is_err());
}

fn logs(conn: &Connection) -> LogService<SqliteLogRepository<'_>, SqliteDiaryRepository<'_>> {
    let clock = ManualClock::at_date(NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(), 9);
    LogService::new(
        SqliteLogRepository::new(conn),
        SqliteDiaryRepository::new(conn),
        Arc::new(clock),
    )
}

fn append(conn: &Connection, content: &str) {
    logs(conn).append(content).unwrap();
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
