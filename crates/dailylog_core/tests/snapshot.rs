mod common;

use chrono::NaiveDate;
use common::{clock, day, diary_service, log_service, task_service, EchoOracle, ScriptedOracle};
use dailylog_core::{
    load_snapshot, open_db_in_memory, read_snapshot_dir, replace_with_snapshot,
    write_snapshot_dir, Priority, SnapshotError, SynthesisMode, TaskFilter,
};
use std::fs;
use std::sync::Arc;

#[test]
fn empty_directory_reads_as_empty_state() {
    let dir = tempfile::tempdir().unwrap();

    let (snapshot, skipped) = read_snapshot_dir(dir.path()).unwrap();

    assert_eq!(skipped, 0);
    assert!(snapshot.logs.is_empty());
    assert!(snapshot.diary_entries.is_empty());
    assert!(snapshot.tasks.is_empty());
    assert_eq!(snapshot.next_log_id, 1);
    assert_eq!(snapshot.next_diary_id, 1);
    assert_eq!(snapshot.next_task_id, 1);
}

#[test]
fn fresh_database_snapshot_starts_counters_at_one() {
    let conn = open_db_in_memory().unwrap();
    let snapshot = load_snapshot(&conn).unwrap();
    assert_eq!(snapshot.next_log_id, 1);
    assert_eq!(snapshot.next_task_id, 1);
}

#[test]
fn export_then_import_restores_identical_state() {
    let source = open_db_in_memory().unwrap();
    let clock = clock();
    let logs = log_service(&source, clock.clone());
    let diaries = diary_service(&source, Arc::new(EchoOracle::default()), clock.clone());
    let oracle = ScriptedOracle::new();
    oracle.answer(r#"[{"description":"Call the dentist","priority":"High","sourceLogId":1}]"#);
    let tasks = task_service(&source, oracle, clock.clone());

    logs.append("Need to call the dentist tomorrow").unwrap();
    logs.append("lunch with Ana").unwrap();
    diaries.synthesize(day(), SynthesisMode::Create).unwrap();
    tasks.extract(day(), true).unwrap();
    let manual = tasks.add_manual("stretch", Priority::Low).unwrap();
    clock.advance_ms(1_000);
    tasks.toggle(manual.id).unwrap();
    logs.delete(2).unwrap();

    let exported = load_snapshot(&source).unwrap();
    let dir = tempfile::tempdir().unwrap();
    write_snapshot_dir(dir.path(), &exported).unwrap();

    let target = open_db_in_memory().unwrap();
    let (read_back, skipped) = read_snapshot_dir(dir.path()).unwrap();
    assert_eq!(skipped, 0);
    let summary = replace_with_snapshot(&target, &read_back).unwrap();

    assert_eq!(summary.logs, 1);
    assert_eq!(summary.diary_entries, 1);
    assert_eq!(summary.tasks, 2);
    assert_eq!(load_snapshot(&target).unwrap(), exported);
    assert_eq!(exported.next_log_id, 3);

    let next = log_service(&target, clock).append("after import").unwrap();
    assert_eq!(next.id, 3);
}

#[test]
fn legacy_files_are_normalized_on_import() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("logs.json"),
        r#"{
          "logs": [
            {"id": 1, "content": "Need to buy milk", "timestamp": "093000020624", "wordCount": 4},
            {"id": 2, "content": "Walked home", "timestamp": "2024-06-02T18:15:00.123456"},
            {"id": 3, "content": "   ", "timestamp": "09300002062024"},
            {"id": 4, "content": "Odd", "timestamp": "yesterday"},
            "garbage"
          ],
          "nextId": 10
        }"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("diary.json"),
        r#"{
          "entries": [
            {"id": 1, "date": "2024-06-02", "content": "Milk and a walk.",
             "createdAt": "2024-06-02T20:00:00", "lastUpdated": "2024-06-02T21:00:00",
             "logIds": [1, "Log2"]}
          ]
        }"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("tasks.json"),
        r#"{
          "tasks": [
            {"id": 5, "description": "Buy milk", "priority": "urgent", "completed": false,
             "createdAt": "2024-06-02T20:00:00", "sourceLogId": "Log1", "date": "2024-06-02"},
            {"id": 6, "description": "Buy milk", "priority": "High", "completed": true,
             "createdAt": "2024-06-02T20:00:00", "sourceLogId": "Log1", "date": "2024-06-02"}
          ],
          "nextId": "seven"
        }"#,
    )
    .unwrap();

    let (snapshot, unreadable) = read_snapshot_dir(dir.path()).unwrap();
    assert_eq!(unreadable, 3);
    assert_eq!(snapshot.logs[0].timestamp.as_str(), "09300002062024");
    assert_eq!(snapshot.logs[0].word_count, 4);
    assert_eq!(snapshot.logs[1].timestamp.as_str(), "18150002062024");
    assert_eq!(snapshot.diary_entries[0].log_ids, [1, 2].into_iter().collect());
    assert_eq!(snapshot.next_diary_id, 1);
    assert_eq!(snapshot.next_task_id, 1);
    assert_eq!(snapshot.tasks[0].priority, Priority::Medium);
    assert_eq!(snapshot.tasks[0].source_log_id, Some(1));
    assert!(snapshot.tasks[1].completed_at.is_some());

    let conn = open_db_in_memory().unwrap();
    let summary = replace_with_snapshot(&conn, &snapshot).unwrap();
    assert_eq!(summary.tasks, 1);
    assert_eq!(summary.skipped_records, 1);

    let clock = clock();
    let logs = log_service(&conn, clock.clone());
    assert_eq!(logs.list_for_date(day()).unwrap().len(), 2);
    assert_eq!(logs.append("fresh").unwrap().id, 10);

    let tasks = task_service(&conn, ScriptedOracle::new(), clock.clone());
    assert_eq!(tasks.add_manual("new task", Priority::Low).unwrap().id, 6);
    assert_eq!(tasks.list(&TaskFilter::default()).unwrap().len(), 2);

    let diaries = diary_service(&conn, Arc::new(EchoOracle::default()), clock);
    let entry = diaries.get(day()).unwrap().unwrap();
    assert!(entry.last_updated > entry.created_at);
}

#[test]
fn analyzed_logs_survive_a_round_trip() {
    let source = open_db_in_memory().unwrap();
    log_service(&source, clock())
        .append("nothing actionable")
        .unwrap();
    let oracle = ScriptedOracle::new();
    oracle.answer("[]");
    task_service(&source, oracle, clock())
        .extract(day(), true)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    write_snapshot_dir(dir.path(), &load_snapshot(&source).unwrap()).unwrap();
    let (snapshot, _) = read_snapshot_dir(dir.path()).unwrap();
    assert_eq!(
        snapshot
            .analyzed_logs
            .get(&NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()),
        Some(&[1].into_iter().collect())
    );

    let target = open_db_in_memory().unwrap();
    replace_with_snapshot(&target, &snapshot).unwrap();
    let oracle = ScriptedOracle::new();
    let outcome = task_service(&target, oracle.clone(), clock())
        .extract(day(), true)
        .unwrap();
    assert_eq!(outcome.count(), 0);
    assert_eq!(oracle.call_count(), 0);
}

#[test]
fn malformed_json_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("tasks.json"), "{ not json").unwrap();

    let err = read_snapshot_dir(dir.path()).unwrap_err();
    assert!(matches!(err, SnapshotError::Json { .. }));
}

#[test]
fn failed_import_keeps_existing_state() {
    let conn = open_db_in_memory().unwrap();
    let logs = log_service(&conn, clock());
    logs.append("keep me").unwrap();

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("logs.json"), r#"{"logs": [}"#).unwrap();
    assert!(read_snapshot_dir(dir.path()).is_err());
    assert_eq!(logs.list_all().unwrap().len(), 1);
}
