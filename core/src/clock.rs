//! Wall clock. Owns "now" for every scheduling decision.
//!
//! RULE: Nothing in the dispatch core reads the system time directly.
//! Every component asks its injected Clock, so tests and the runner
//! can drive time by hand.
//!
//! Times are local wall-clock `NaiveDateTime`s truncated to whole
//! seconds; working windows are expressed in the same local time.

use chrono::{Duration, Local, NaiveDateTime, Timelike};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Drop sub-second precision so stored timestamps compare exactly.
pub fn truncate_to_second(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(0).unwrap_or(t)
}

/// Reads the host's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        truncate_to_second(Local::now().naive_local())
    }
}

/// A clock that only moves when told to. Used by tests and the runner.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self { current: Mutex::new(truncate_to_second(start)) }
    }

    pub fn set(&self, t: NaiveDateTime) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = truncate_to_second(t);
    }

    /// Advance by `minutes`. Returns the new time.
    pub fn advance_minutes(&self, minutes: i64) -> NaiveDateTime {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += Duration::minutes(minutes);
        *current
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
