//! Periodic re-optimization passes.
//!
//! Both passes propose with the regular dispatch path and commit only
//! above a confidence threshold. A commit that loses a race is skipped and
//! left for the next trigger; nothing here surfaces an error per item.
//!
//!   overdue sweep  planned/assigned items whose start is in the past
//!   nightly        planned/assigned items on the next working day

use crate::{
    config::OptimizerConfig,
    dispatch::{DispatchService, ScheduleOptions},
    error::DispatchResult,
    event::source,
    notifier::deliver,
    slot_finder::is_weekend,
    store::TimeRange,
    types::Priority,
    work_item::WorkItem,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;

/// Upper bound on nightly rounds before the pass gives up converging.
const MAX_NIGHTLY_ROUNDS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: String,
    pub target: String,
    pub examined: usize,
    pub committed: usize,
    pub below_threshold: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub errors: usize,
    /// Target day fell on a weekend; nothing was examined.
    pub skipped_weekend: bool,
}

impl PassReport {
    fn new(pass: &str, target: impl Into<String>) -> Self {
        Self { pass: pass.to_string(), target: target.into(), ..Self::default() }
    }
}

enum Verdict {
    Committed,
    BelowThreshold,
    Unchanged,
    Conflict,
    Failed,
}

impl PassReport {
    fn count(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Committed => self.committed += 1,
            Verdict::BelowThreshold => self.below_threshold += 1,
            Verdict::Unchanged => self.unchanged += 1,
            Verdict::Conflict => self.conflicts += 1,
            Verdict::Failed => self.errors += 1,
        }
    }
}

pub struct PeriodicOptimizer {
    dispatch: Arc<DispatchService>,
    config: OptimizerConfig,
}

impl PeriodicOptimizer {
    pub fn new(dispatch: Arc<DispatchService>, config: OptimizerConfig) -> Self {
        Self { dispatch, config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Notify and try to re-place every overdue planned/assigned item.
    pub fn overdue_sweep(&self) -> DispatchResult<PassReport> {
        let now = self.dispatch.now();
        let overdue = self.dispatch.store().find_overdue(now)?;
        let mut report = PassReport::new(source::OVERDUE_SWEEP, crate::store::ts(now));

        for item in &overdue {
            report.examined += 1;
            log::info!("work_item={} overdue since {}", item.work_item_id, item.scheduled_date);
            deliver("overdue", &item.reference, self.dispatch.notifier().overdue(item));
            let verdict = self.reconsider(item, self.config.overdue_threshold, false, source::OVERDUE_SWEEP);
            report.count(&verdict);
        }

        log::info!(
            "overdue sweep examined={} committed={} below_threshold={} conflicts={}",
            report.examined, report.committed, report.below_threshold, report.conflicts
        );
        Ok(report)
    }

    /// Re-dispatch the day after `now`.
    pub fn nightly_reoptimize(&self) -> DispatchResult<PassReport> {
        let target = self.dispatch.now().date() + Duration::days(1);
        self.reoptimize_day(target)
    }

    /// Re-dispatch every planned/assigned item on `target`, committing only
    /// confident proposals that actually move something. Rounds repeat until
    /// one commits nothing, so an immediate rerun finds nothing to do.
    pub fn reoptimize_day(&self, target: NaiveDate) -> DispatchResult<PassReport> {
        let mut report = PassReport::new(source::NIGHTLY, target.to_string());
        if is_weekend(target) {
            log::info!("nightly pass skipped: {target} is a weekend day");
            report.skipped_weekend = true;
            return Ok(report);
        }

        let store = self.dispatch.store();
        for round in 1..=MAX_NIGHTLY_ROUNDS {
            // Highest priority picks first; id order keeps rounds comparable.
            let mut items = store.find_reschedulable(TimeRange::day(target), Priority::Urgent)?;
            items.sort_by(|a, b| {
                (Reverse(a.priority), &a.work_item_id).cmp(&(Reverse(b.priority), &b.work_item_id))
            });

            let mut moved = 0;
            for item in &items {
                if round == 1 {
                    report.examined += 1;
                }
                let verdict = self.reconsider(item, self.config.nightly_threshold, true, source::NIGHTLY);
                if matches!(verdict, Verdict::Committed) {
                    moved += 1;
                }
                if round == 1 || matches!(verdict, Verdict::Committed) {
                    report.count(&verdict);
                }
            }
            log::debug!("nightly {target} round={round} moved={moved}");
            if moved == 0 {
                break;
            }
        }

        log::info!(
            "nightly pass target={target} examined={} committed={} unchanged={} below_threshold={}",
            report.examined, report.committed, report.unchanged, report.below_threshold
        );
        Ok(report)
    }

    fn reconsider(&self, item: &WorkItem, threshold: f64, only_if_changed: bool, origin: &'static str) -> Verdict {
        // The item may have moved since the listing was read.
        let current = match self.dispatch.store().get_work_item(&item.work_item_id) {
            Ok(Some(w)) if w.status.is_reschedulable() => w,
            Ok(_) => return Verdict::Unchanged,
            Err(e) => {
                log::warn!("work_item={} reload failed: {e}", item.work_item_id);
                return Verdict::Failed;
            }
        };
        let proposal = match self.dispatch.propose_for(&current, &ScheduleOptions::default()) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("work_item={} no proposal: {e}", current.work_item_id);
                return Verdict::Failed;
            }
        };
        if only_if_changed && !proposal.changes(&current) {
            return Verdict::Unchanged;
        }
        if proposal.confidence <= threshold {
            log::debug!(
                "work_item={} proposal confidence={:.2} not above {threshold:.2}, left in place",
                current.work_item_id, proposal.confidence
            );
            return Verdict::BelowThreshold;
        }
        match self.dispatch.commit(&proposal, origin) {
            Ok(_) => Verdict::Committed,
            Err(e) if e.is_conflict() => {
                log::warn!("work_item={} commit skipped until next run: {e}", current.work_item_id);
                Verdict::Conflict
            }
            Err(e) => {
                log::warn!("work_item={} commit failed: {e}", current.work_item_id);
                Verdict::Failed
            }
        }
    }
}
