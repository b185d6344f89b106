//! Per-date mutual exclusion.
//!
//! Synthesis and extraction are read-modify-write cycles bracketing a slow
//! oracle call. Running the whole cycle under the date's lock prevents two
//! callers from observing the same incorporated/analyzed set. Different
//! dates never contend. A date's slot lives only while some caller holds or
//! waits for it.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Registry of per-date locks, shared across service instances and threads.
#[derive(Debug, Default)]
pub struct DateLocks {
    slots: Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
}

impl DateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `date`.
    ///
    /// A poisoned lock is recovered: the protected state lives in SQLite and
    /// is only ever committed by whole transactions.
    pub fn with_date<T>(&self, date: NaiveDate, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(date).or_default())
        };

        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(date, slot);
        result
    }

    fn release(&self, date: NaiveDate, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are taken and dropped only under `slots`, so two owners
        // means the map and this caller.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&date);
        }
        drop(slot);
    }

    /// Number of dates currently held or waited for.
    pub fn tracked_dates(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::DateLocks;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn same_date_sections_never_overlap() {
        let locks = Arc::new(DateLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_date(day(1), || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked_dates(), 0);
    }

    #[test]
    fn different_dates_run_in_parallel() {
        let locks = Arc::new(DateLocks::new());
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [day(1), day(2)]
            .into_iter()
            .map(|date| {
                let locks = Arc::clone(&locks);
                let barrier = Arc::clone(&barrier);
                // Both sections must be inside their lock at once to pass the
                // barrier; a shared lock would deadlock here.
                thread::spawn(move || locks.with_date(date, || barrier.wait()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(locks.tracked_dates(), 0);
    }

    #[test]
    fn slots_are_dropped_once_no_caller_needs_them() {
        let locks = DateLocks::new();
        for d in 1..=20 {
            let held = locks.with_date(day(d), || locks.tracked_dates());
            assert_eq!(held, 1);
        }
        assert_eq!(locks.tracked_dates(), 0);
    }
}
