//! Time source abstraction.
//!
//! Log timestamps use local wall time; diary/task bookkeeping uses Unix epoch
//! milliseconds. Both come from one `Clock` so tests can pin them together.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    /// Current local wall-clock time.
    fn local_now(&self) -> NaiveDateTime;
    /// Current Unix time in milliseconds.
    fn epoch_ms(&self) -> i64;

    fn today(&self) -> NaiveDate {
        self.local_now().date()
    }
}

/// Clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn epoch_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for deterministic tests and replays.
///
/// Local time is derived from the epoch value as if the local zone were UTC.
#[derive(Debug)]
pub struct ManualClock {
    epoch_ms: AtomicI64,
}

impl ManualClock {
    pub fn at_epoch_ms(epoch_ms: i64) -> Self {
        Self {
            epoch_ms: AtomicI64::new(epoch_ms),
        }
    }

    /// Starts at midnight of `date`, plus `hour` hours.
    pub fn at_date(date: NaiveDate, hour: u32) -> Self {
        let start = date
            .and_hms_opt(hour.min(23), 0, 0)
            .unwrap_or_default()
            .and_utc()
            .timestamp_millis();
        Self::at_epoch_ms(start)
    }

    pub fn set_epoch_ms(&self, epoch_ms: i64) {
        self.epoch_ms.store(epoch_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta: i64) {
        self.epoch_ms.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn local_now(&self) -> NaiveDateTime {
        DateTime::<Utc>::from_timestamp_millis(self.epoch_ms())
            .map(|at| at.naive_utc())
            .unwrap_or_default()
    }

    fn epoch_ms(&self) -> i64 {
        self.epoch_ms.load(Ordering::SeqCst)
    }
}
