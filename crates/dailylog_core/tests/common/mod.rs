#![allow(dead_code)]

use chrono::NaiveDate;
use dailylog_core::{
    DateLocks, DiaryService, LogService, ManualClock, Oracle, OracleError, OracleKind,
    OraclePayload, OracleResult, SqliteDiaryRepository, SqliteLogRepository,
    SqliteTaskRepository, TaskService,
};
use rusqlite::Connection;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
}

/// Clock parked at 09:00 on [`day`].
pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at_date(day(), 9))
}

/// Oracle replaying queued answers and recording every call.
#[derive(Default)]
pub struct ScriptedOracle {
    answers: Mutex<VecDeque<OracleResult<String>>>,
    calls: Mutex<Vec<(OracleKind, OraclePayload)>>,
}

impl ScriptedOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, text: &str) {
        self.answers.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn fail(&self, err: OracleError) {
        self.answers.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<(OracleKind, OraclePayload)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Oracle for ScriptedOracle {
    fn invoke(&self, kind: OracleKind, payload: &OraclePayload) -> OracleResult<String> {
        self.calls.lock().unwrap().push((kind, payload.clone()));
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Unavailable("no scripted answer".to_string())))
    }
}

/// Oracle that writes the log contents verbatim, appending to any existing entry.
#[derive(Default)]
pub struct EchoOracle {
    pub calls: Mutex<usize>,
}

impl Oracle for EchoOracle {
    fn invoke(&self, _kind: OracleKind, payload: &OraclePayload) -> OracleResult<String> {
        *self.calls.lock().unwrap() += 1;
        let mut parts: Vec<String> = payload.existing_diary.iter().cloned().collect();
        parts.extend(payload.logs.iter().map(|log| log.content.clone()));
        Ok(parts.join("\n"))
    }
}

/// Oracle whose first calls, one per answer, wait for each other before
/// answering. Every caller has read its state before any of them commits.
pub struct RendezvousOracle {
    barrier: Barrier,
    answers: Vec<String>,
    calls: AtomicUsize,
}

impl RendezvousOracle {
    pub fn new(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            barrier: Barrier::new(answers.len()),
            answers: answers.iter().map(|answer| answer.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Oracle for RendezvousOracle {
    fn invoke(&self, _kind: OracleKind, _payload: &OraclePayload) -> OracleResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.answers.len() {
            self.barrier.wait();
        }
        let answer = self.answers.get(call).or(self.answers.last());
        answer
            .cloned()
            .ok_or_else(|| OracleError::Unavailable("no answers".to_string()))
    }
}

pub type Logs<'c> = LogService<SqliteLogRepository<'c>, SqliteDiaryRepository<'c>>;
pub type Diaries<'c> = DiaryService<SqliteLogRepository<'c>, SqliteDiaryRepository<'c>>;
pub type Tasks<'c> = TaskService<SqliteLogRepository<'c>, SqliteTaskRepository<'c>>;

pub fn log_service(conn: &Connection, clock: Arc<ManualClock>) -> Logs<'_> {
    LogService::new(
        SqliteLogRepository::new(conn),
        SqliteDiaryRepository::new(conn),
        clock,
    )
}

pub fn diary_service(
    conn: &Connection,
    oracle: Arc<dyn Oracle>,
    clock: Arc<ManualClock>,
) -> Diaries<'_> {
    DiaryService::new(
        SqliteLogRepository::new(conn),
        SqliteDiaryRepository::new(conn),
        oracle,
        clock,
        Arc::new(DateLocks::new()),
    )
}

pub fn task_service(
    conn: &Connection,
    oracle: Arc<dyn Oracle>,
    clock: Arc<ManualClock>,
) -> Tasks<'_> {
    TaskService::new(
        SqliteLogRepository::new(conn),
        SqliteTaskRepository::new(conn),
        oracle,
        clock,
        Arc::new(DateLocks::new()),
    )
}
