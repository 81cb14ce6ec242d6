//! Earliest feasible start time in a technician's calendar.
//!
//! Candidate starts are the opening times of the working windows, scanned
//! day by day then window by window, weekends skipped. A candidate is
//! feasible when it is not in the past and no other active booking of the
//! technician overlaps `[start, start + duration)`.
//!
//! Urgent work never searches: it starts now. An exhausted search is not
//! an error; it falls back to `now + horizon` and flags the result degraded.

use crate::{
    config::{SlotConfig, WorkingWindow},
    types::{Minutes, Priority},
    work_item::WorkItem,
};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOutcome {
    pub start: NaiveDateTime,
    /// True when no feasible slot existed inside the horizon.
    pub degraded: bool,
}

/// One slot search.
#[derive(Debug, Clone, Copy)]
pub struct SlotRequest<'a> {
    pub priority: Priority,
    pub duration: Minutes,
    /// The item being placed. Its own booking never blocks it.
    pub exclude: Option<&'a str>,
    pub now: NaiveDateTime,
    /// Overrides the configured windows for this search.
    pub windows: Option<&'a [WorkingWindow]>,
}

#[derive(Debug, Clone, Default)]
pub struct SlotFinder {
    config: SlotConfig,
}

pub fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

impl SlotFinder {
    pub fn new(config: SlotConfig) -> Self {
        Self { config }
    }

    pub fn horizon_days(&self) -> i64 {
        self.config.horizon_days
    }

    pub fn find_slot(&self, request: SlotRequest<'_>, bookings: &[WorkItem]) -> SlotOutcome {
        if request.priority == Priority::Urgent {
            return SlotOutcome { start: request.now, degraded: false };
        }

        let windows = match request.windows {
            Some(w) if !w.is_empty() => w,
            _ => self.config.working_windows.as_slice(),
        };
        let blocking: Vec<&WorkItem> = bookings
            .iter()
            .filter(|b| b.status.is_active())
            .filter(|b| request.exclude != Some(b.work_item_id.as_str()))
            .collect();

        let today = request.now.date();
        for offset in 0..self.config.horizon_days {
            let day = today + Duration::days(offset);
            if is_weekend(day) {
                continue;
            }
            for window in windows {
                let start = day.and_time(window.start);
                if start < request.now {
                    continue;
                }
                let end = start + Duration::minutes(request.duration);
                if blocking.iter().all(|b| !b.overlaps(start, end)) {
                    log::debug!("slot found start={start} after {offset} day(s)");
                    return SlotOutcome { start, degraded: false };
                }
            }
        }

        let fallback = request.now + Duration::days(self.config.horizon_days);
        log::debug!("no slot within {} days, falling back to {fallback}", self.config.horizon_days);
        SlotOutcome { start: fallback, degraded: true }
    }
}
