mod common;

use common::{
    clock, day, diary_service, log_service, EchoOracle, RendezvousOracle, ScriptedOracle,
};
use dailylog_core::{
    open_db, open_db_in_memory, DateLocks, DiaryService, DiaryServiceError, ErrorKind, Oracle,
    OracleError, OracleKind, OraclePayload, OracleResult, SqliteDiaryRepository,
    SqliteLogRepository, SynthesisAction, SynthesisMode,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn ids(values: &[i64]) -> BTreeSet<i64> {
    values.iter().copied().collect()
}

#[test]
fn date_without_logs_reports_no_logs_and_never_calls_oracle() {
    let conn = open_db_in_memory().unwrap();
    let oracle = ScriptedOracle::new();
    let diaries = diary_service(&conn, oracle.clone(), clock());

    for mode in [
        SynthesisMode::Create,
        SynthesisMode::Incremental,
        SynthesisMode::Regenerate,
    ] {
        let err = diaries.synthesize(day(), mode).unwrap_err();
        assert!(matches!(err, DiaryServiceError::NoLogs(date) if date == day()));
        assert_eq!(err.kind(), ErrorKind::NoLogs);
    }

    assert_eq!(oracle.call_count(), 0);
    assert!(diaries.get(day()).unwrap().is_none());
    assert!(!diaries.update_available(day()).unwrap());
}

#[test]
fn create_sends_all_logs_oldest_first() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock();
    let logs = log_service(&conn, clock.clone());
    let oracle = ScriptedOracle::new();
    oracle.answer("  A calm Sunday with an early walk.  ");
    let diaries = diary_service(&conn, oracle.clone(), clock.clone());

    logs.append("early walk").unwrap();
    clock.advance_ms(60_000);
    logs.append("quiet lunch").unwrap();

    let outcome = diaries.synthesize(day(), SynthesisMode::Create).unwrap();

    assert_eq!(outcome.action, SynthesisAction::Created);
    assert_eq!(outcome.entry.content, "A calm Sunday with an early walk.");
    assert_eq!(outcome.entry.log_ids, ids(&[1, 2]));
    assert_eq!(outcome.entry.created_at, outcome.entry.last_updated);

    let calls = oracle.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, OracleKind::DiaryCreate);
    let sent: Vec<i64> = calls[0].1.log_ids().collect();
    assert_eq!(sent, vec![1, 2]);
    assert!(calls[0].1.existing_diary.is_none());
}

#[test]
fn incremental_merges_only_the_new_log() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock();
    let logs = log_service(&conn, clock.clone());
    let oracle = Arc::new(EchoOracle::default());
    let diaries = diary_service(&conn, oracle.clone(), clock.clone());

    logs.append("met Ana for coffee").unwrap();
    logs.append("finished the report").unwrap();
    let before = diaries.synthesize(day(), SynthesisMode::Create).unwrap().entry;
    assert_eq!(before.log_ids, ids(&[1, 2]));

    clock.advance_ms(30 * 60_000);
    let third = logs.append("evening run by the river").unwrap();
    assert_eq!(third.id, 3);

    let outcome = diaries
        .synthesize(day(), SynthesisMode::Incremental)
        .unwrap();

    assert_eq!(
        outcome.action,
        SynthesisAction::Merged {
            new_log_ids: ids(&[3])
        }
    );
    assert_eq!(outcome.entry.id, before.id);
    assert_eq!(outcome.entry.log_ids, ids(&[1, 2, 3]));
    assert!(outcome.entry.last_updated > before.last_updated);
    assert_eq!(outcome.entry.created_at, before.created_at);
    assert!(outcome.entry.content.starts_with(&before.content));
    assert!(outcome.entry.content.ends_with("evening run by the river"));
    assert_eq!(*oracle.calls.lock().unwrap(), 2);
}

#[test]
fn merge_payload_carries_existing_entry_and_unseen_logs_only() {
    let conn = open_db_in_memory().unwrap();
    let logs = log_service(&conn, clock());
    let oracle = ScriptedOracle::new();
    oracle.answer("Morning notes.");
    oracle.answer("Morning notes. Then the afternoon.");
    let diaries = diary_service(&conn, oracle.clone(), clock());

    logs.append("morning").unwrap();
    diaries.synthesize(day(), SynthesisMode::Create).unwrap();
    logs.append("afternoon").unwrap();
    diaries.synthesize(day(), SynthesisMode::Incremental).unwrap();

    let calls = oracle.calls();
    assert_eq!(calls[1].0, OracleKind::DiaryUpdate);
    assert_eq!(calls[1].1.existing_diary.as_deref(), Some("Morning notes."));
    let sent: Vec<i64> = calls[1].1.log_ids().collect();
    assert_eq!(sent, vec![2]);
}

#[test]
fn repeated_synthesis_without_new_logs_changes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock();
    let logs = log_service(&conn, clock.clone());
    let oracle = Arc::new(EchoOracle::default());
    let diaries = diary_service(&conn, oracle.clone(), clock.clone());

    logs.append("one").unwrap();
    let created = diaries.synthesize(day(), SynthesisMode::Create).unwrap().entry;

    clock.advance_ms(1_000);
    for mode in [SynthesisMode::Create, SynthesisMode::Incremental] {
        let outcome = diaries.synthesize(day(), mode).unwrap();
        assert_eq!(outcome.action, SynthesisAction::Unchanged);
        assert_eq!(outcome.entry, created);
    }

    assert_eq!(*oracle.calls.lock().unwrap(), 1);
    assert_eq!(diaries.list().unwrap().len(), 1);
}

#[test]
fn regenerate_resets_the_incorporated_set_to_current_logs() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock();
    let logs = log_service(&conn, clock.clone());
    let diaries = diary_service(&conn, Arc::new(EchoOracle::default()), clock.clone());

    logs.append("alpha").unwrap();
    logs.append("beta").unwrap();
    logs.append("gamma").unwrap();
    let created = diaries.synthesize(day(), SynthesisMode::Create).unwrap().entry;

    logs.delete(2).unwrap();
    clock.advance_ms(1_000);
    let outcome = diaries
        .synthesize(day(), SynthesisMode::Regenerate)
        .unwrap();

    assert_eq!(outcome.action, SynthesisAction::Regenerated);
    assert_eq!(outcome.entry.id, created.id);
    assert_eq!(outcome.entry.created_at, created.created_at);
    assert_eq!(outcome.entry.log_ids, ids(&[1, 3]));
    assert!(!outcome.entry.content.contains("beta"));
    assert!(outcome.entry.last_updated > created.last_updated);
}

#[test]
fn regenerate_after_every_log_is_deleted_keeps_the_entry() {
    let conn = open_db_in_memory().unwrap();
    let logs = log_service(&conn, clock());
    let diaries = diary_service(&conn, Arc::new(EchoOracle::default()), clock());

    logs.append("only log").unwrap();
    let created = diaries.synthesize(day(), SynthesisMode::Create).unwrap().entry;
    logs.delete(1).unwrap();

    let err = diaries
        .synthesize(day(), SynthesisMode::Regenerate)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoLogs);
    assert_eq!(diaries.get(day()).unwrap(), Some(created));
}

#[test]
fn last_updated_never_moves_backwards() {
    let conn = open_db_in_memory().unwrap();
    let clock = clock();
    let logs = log_service(&conn, clock.clone());
    let diaries = diary_service(&conn, Arc::new(EchoOracle::default()), clock.clone());

    logs.append("first").unwrap();
    let created = diaries.synthesize(day(), SynthesisMode::Create).unwrap().entry;

    clock.advance_ms(-3_600_000);
    logs.append("second").unwrap();
    let merged = diaries
        .synthesize(day(), SynthesisMode::Incremental)
        .unwrap()
        .entry;

    assert!(merged.last_updated >= created.last_updated);
    assert!(merged.log_ids.is_superset(&created.log_ids));
}

#[test]
fn oracle_failures_leave_the_entry_untouched() {
    let conn = open_db_in_memory().unwrap();
    let logs = log_service(&conn, clock());
    let oracle = ScriptedOracle::new();
    oracle.answer("Day one.");
    oracle.fail(OracleError::Unavailable("HTTP status 429".to_string()));
    oracle.answer("   ");
    let diaries = diary_service(&conn, oracle.clone(), clock());

    logs.append("first").unwrap();
    let created = diaries.synthesize(day(), SynthesisMode::Create).unwrap().entry;
    logs.append("second").unwrap();

    let unavailable = diaries
        .synthesize(day(), SynthesisMode::Incremental)
        .unwrap_err();
    assert_eq!(unavailable.kind(), ErrorKind::OracleUnavailable);
    assert_eq!(diaries.get(day()).unwrap(), Some(created.clone()));

    let blank = diaries
        .synthesize(day(), SynthesisMode::Incremental)
        .unwrap_err();
    assert_eq!(blank.kind(), ErrorKind::OracleFormat);
    assert_eq!(diaries.get(day()).unwrap(), Some(created));
}

#[test]
fn failed_create_leaves_no_entry() {
    let conn = open_db_in_memory().unwrap();
    let logs = log_service(&conn, clock());
    let oracle = ScriptedOracle::new();
    oracle.fail(OracleError::NotConfigured);
    let diaries = diary_service(&conn, oracle, clock());

    logs.append("first").unwrap();
    let err = diaries.synthesize(day(), SynthesisMode::Create).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OracleUnavailable);
    assert!(diaries.list().unwrap().is_empty());
}

#[test]
fn markdown_export_requires_an_entry() {
    let conn = open_db_in_memory().unwrap();
    let logs = log_service(&conn, clock());
    let diaries = diary_service(&conn, Arc::new(EchoOracle::default()), clock());

    assert!(matches!(
        diaries.export_markdown(day()).unwrap_err(),
        DiaryServiceError::DiaryNotFound(_)
    ));

    logs.append("sunny afternoon in the park").unwrap();
    diaries.synthesize(day(), SynthesisMode::Create).unwrap();
    let markdown = diaries.export_markdown(day()).unwrap();

    assert!(markdown.starts_with("# Sunday, June 2, 2024"));
    assert!(markdown.contains("sunny afternoon in the park"));
    assert!(markdown.contains("Based on 1 log(s)"));
}

/// Oracle slow enough for a second caller to arrive while the first is in flight.
struct SlowOracle {
    calls: AtomicUsize,
}

impl Oracle for SlowOracle {
    fn invoke(&self, _kind: OracleKind, payload: &OraclePayload) -> OracleResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(150));
        Ok(format!("{} log(s) written up", payload.logs.len()))
    }
}

#[test]
fn concurrent_synthesis_for_one_date_is_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dailylog.sqlite3");
    {
        let conn = open_db(&path).unwrap();
        let logs = log_service(&conn, clock());
        logs.append("first").unwrap();
        logs.append("second").unwrap();
    }

    let oracle = Arc::new(SlowOracle {
        calls: AtomicUsize::new(0),
    });
    let locks = Arc::new(DateLocks::new());

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let path = path.clone();
            let oracle: Arc<dyn Oracle> = oracle.clone();
            let locks = locks.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = DiaryService::new(
                    SqliteLogRepository::new(&conn),
                    SqliteDiaryRepository::new(&conn),
                    oracle,
                    clock(),
                    locks,
                );
                service
                    .synthesize(day(), SynthesisMode::Create)
                    .map(|outcome| outcome.action)
                    .map_err(|err| err.to_string())
            })
        })
        .collect();

    let mut actions: Vec<SynthesisAction> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap().unwrap())
        .collect();
    actions.sort_by_key(|action| matches!(action, SynthesisAction::Unchanged));

    assert_eq!(
        actions,
        vec![SynthesisAction::Created, SynthesisAction::Unchanged]
    );
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

    let conn = open_db(&path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM diary_entries;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

fn race_synthesis(
    path: &std::path::Path,
    oracle: &Arc<RendezvousOracle>,
    mode: SynthesisMode,
) -> Vec<SynthesisAction> {
    // Separate connections and lock registries, as two CLI processes have.
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let path = path.to_path_buf();
            let oracle: Arc<dyn Oracle> = oracle.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                diary_service(&conn, oracle, clock())
                    .synthesize(day(), mode)
                    .map(|outcome| outcome.action)
                    .unwrap()
            })
        })
        .collect();
    let mut actions: Vec<SynthesisAction> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();
    actions.sort_by_key(|action| matches!(action, SynthesisAction::Unchanged));
    actions
}

#[test]
fn racing_processes_create_a_single_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dailylog.sqlite3");
    {
        let conn = open_db(&path).unwrap();
        log_service(&conn, clock()).append("first").unwrap();
    }
    let oracle = RendezvousOracle::new(&["Version A.", "Version B."]);

    let actions = race_synthesis(&path, &oracle, SynthesisMode::Create);

    assert_eq!(
        actions,
        vec![SynthesisAction::Created, SynthesisAction::Unchanged]
    );
    assert_eq!(oracle.call_count(), 2);
    let conn = open_db(&path).unwrap();
    let entries = diary_service(&conn, ScriptedOracle::new(), clock())
        .list()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].log_ids, ids(&[1]));
}

#[test]
fn racing_processes_merge_each_log_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dailylog.sqlite3");
    {
        let conn = open_db(&path).unwrap();
        let logs = log_service(&conn, clock());
        logs.append("first").unwrap();
        diary_service(&conn, Arc::new(EchoOracle::default()), clock())
            .synthesize(day(), SynthesisMode::Create)
            .unwrap();
        logs.append("second").unwrap();
    }
    let oracle = RendezvousOracle::new(&["first\nsecond, told once", "first\nsecond, told twice"]);

    let actions = race_synthesis(&path, &oracle, SynthesisMode::Incremental);

    assert_eq!(
        actions,
        vec![
            SynthesisAction::Merged {
                new_log_ids: ids(&[2])
            },
            SynthesisAction::Unchanged
        ]
    );
    assert_eq!(oracle.call_count(), 2);
    let conn = open_db(&path).unwrap();
    let entry = diary_service(&conn, ScriptedOracle::new(), clock())
        .get(day())
        .unwrap()
        .unwrap();
    assert_eq!(entry.log_ids, ids(&[1, 2]));
    assert!(entry.content.starts_with("first\nsecond, told"));
}
