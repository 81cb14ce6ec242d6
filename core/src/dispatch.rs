//! Dispatch service: scoring + slot search → proposal → commit.
//!
//! A proposal is a pure read. Committing it is a separate step, applied
//! through one atomic store commit guarded by the work item's version and
//! the technician's calendar. A proposal that lost a race is never
//! reused: callers ask for a fresh one.

use crate::{
    clock::Clock,
    config::{ConfidenceConfig, DispatchConfig, DurationTable, WorkingWindow},
    error::{DispatchError, DispatchResult},
    event::DispatchEvent,
    notifier::{deliver, Notifier},
    rng::IdSource,
    scoring::{select_best, ScoringEngine, ScoringInput},
    slot_finder::{SlotFinder, SlotRequest},
    store::{BookingCheck, CommitReceipt, WorkItemCommit, WorkStore},
    technician::Technician,
    types::{EntityId, Minutes, TechnicianStatus, WorkItemStatus},
    work_item::{NewWorkItem, WorkItem},
};
use chrono::{Datelike, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleOptions {
    /// Use the proximity sub-score when coordinates are known.
    pub consider_travel: bool,
    /// Only `available` technicians enter the pool.
    pub emergency_only: bool,
    /// Replaces the configured working windows for this search.
    pub preferred_windows: Option<Vec<WorkingWindow>>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self { consider_travel: true, emergency_only: false, preferred_windows: None }
    }
}

impl ScheduleOptions {
    pub fn emergency() -> Self {
        Self { emergency_only: true, ..Self::default() }
    }
}

/// Unconfirmed technician + time recommendation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingProposal {
    pub work_item_id: EntityId,
    pub technician_id: EntityId,
    pub scheduled_date: NaiveDateTime,
    pub estimated_duration: Minutes,
    pub confidence: f64,
    pub skill_match: f64,
    /// The slot search ran out of horizon; the date is a fallback.
    pub degraded: bool,
    /// Work-item version the proposal was computed from.
    pub based_on_version: i64,
}

impl SchedulingProposal {
    /// Whether committing would move the item at all.
    pub fn changes(&self, item: &WorkItem) -> bool {
        item.technician_id.as_deref() != Some(self.technician_id.as_str())
            || item.scheduled_date != self.scheduled_date
    }
}

/// Confidence in [0, 1]:
/// base + skill × factor, + bonus if available, + bonus under 24h, + bonus under 4h.
pub fn confidence(cfg: &ConfidenceConfig, skill_match: f64, status: TechnicianStatus, delay: Duration) -> f64 {
    let mut c = cfg.base + skill_match * cfg.skill_factor;
    if status == TechnicianStatus::Available {
        c += cfg.available_bonus;
    }
    if delay < Duration::hours(24) {
        c += cfg.same_day_bonus;
        if delay < Duration::hours(4) {
            c += cfg.imminent_bonus;
        }
    }
    c.min(1.0)
}

pub struct DispatchService {
    store: Arc<dyn WorkStore>,
    scoring: ScoringEngine,
    slots: SlotFinder,
    durations: DurationTable,
    confidence: ConfidenceConfig,
    commit_attempts: u32,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    ids: Arc<dyn IdSource>,
}

impl DispatchService {
    pub fn new(
        store: Arc<dyn WorkStore>,
        config: &DispatchConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        Self {
            store,
            scoring: ScoringEngine::new(config.scoring.clone()),
            slots: SlotFinder::new(config.slots.clone()),
            durations: config.durations.clone(),
            confidence: config.confidence.clone(),
            commit_attempts: config.commit_attempts.max(1),
            clock,
            notifier,
            ids,
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn durations(&self) -> &DurationTable {
        &self.durations
    }

    pub fn work_item(&self, work_item_id: &str) -> DispatchResult<WorkItem> {
        self.store
            .get_work_item(work_item_id)?
            .ok_or_else(|| DispatchError::not_found("work item", work_item_id))
    }

    pub fn technician(&self, technician_id: &str) -> DispatchResult<Technician> {
        self.store
            .get_technician(technician_id)?
            .ok_or_else(|| DispatchError::not_found("technician", technician_id))
    }

    // ── Creation ─────────────────────────────────────────────────────────────

    /// Insert a work item. With a technician it is created `assigned`, under
    /// the same availability and calendar checks as a manual assignment.
    pub fn create_work_item(&self, new: NewWorkItem, source: &'static str) -> DispatchResult<WorkItem> {
        let now = self.now();
        if let Some(incident_id) = new.incident_id.as_deref() {
            if self.store.get_incident(incident_id)?.is_none() {
                return Err(DispatchError::not_found("incident", incident_id));
            }
        }
        if let Some(technician_id) = new.technician_id.as_deref() {
            self.technician(technician_id)?;
        }

        let item = WorkItem {
            work_item_id: self.ids.next_id(),
            reference: self.store.next_reference(now.year())?,
            work_type: new.work_type,
            priority: new.priority,
            status: if new.technician_id.is_some() { WorkItemStatus::Assigned } else { WorkItemStatus::Planned },
            location: new.location,
            scheduled_date: new.scheduled_date,
            started_at: None,
            completed_at: None,
            estimated_duration: new
                .estimated_duration
                .unwrap_or_else(|| self.durations.estimate(new.work_type, new.priority)),
            actual_duration: None,
            technician_id: new.technician_id,
            incident_id: new.incident_id,
            notes: new.notes,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut events = vec![DispatchEvent::WorkItemCreated {
            work_item_id: item.work_item_id.clone(),
            reference: item.reference.clone(),
            work_type: item.work_type,
            priority: item.priority,
            scheduled_date: item.scheduled_date,
        }];
        let assigned = item.technician_id.clone();
        if let Some(technician_id) = &assigned {
            events.push(DispatchEvent::TechnicianAssigned {
                work_item_id: item.work_item_id.clone(),
                technician_id: technician_id.clone(),
                scheduled_date: item.scheduled_date,
                confidence: None,
            });
        }

        let receipt = self.store.create_work_item(WorkItemCommit {
            item,
            expected_version: 0,
            booking: BookingCheck::RejectOverlap,
            require_available: assigned.is_some(),
            technician_change: None,
            events,
            source,
            at: now,
        })?;
        log::info!(
            "work_item={} created ref={} type={} priority={} at={}",
            receipt.item.work_item_id,
            receipt.item.reference,
            receipt.item.work_type,
            receipt.item.priority,
            receipt.item.scheduled_date
        );
        if assigned.is_some() {
            deliver("technician_assigned", &receipt.item.reference, self.notifier.technician_assigned(&receipt.item));
        }
        Ok(receipt.item)
    }

    // ── Proposals ────────────────────────────────────────────────────────────

    pub fn propose(&self, work_item_id: &str, options: &ScheduleOptions) -> DispatchResult<SchedulingProposal> {
        let item = self.work_item(work_item_id)?;
        self.propose_for(&item, options)
    }

    pub fn propose_for(&self, item: &WorkItem, options: &ScheduleOptions) -> DispatchResult<SchedulingProposal> {
        self.propose_excluding(item, options, &[])
    }

    /// Like `propose_for`, with `excluded` technicians left out of the pool.
    pub fn propose_excluding(
        &self,
        item: &WorkItem,
        options: &ScheduleOptions,
        excluded: &[EntityId],
    ) -> DispatchResult<SchedulingProposal> {
        let now = self.now();
        let today = now.date();

        // list_technicians is ordered by id, which fixes the tie-break order.
        let pool: Vec<Technician> = self
            .store
            .list_technicians()?
            .into_iter()
            .filter(|t| !excluded.contains(&t.technician_id))
            .filter(|t| {
                if options.emergency_only {
                    t.status == TechnicianStatus::Available
                } else {
                    t.is_dispatchable()
                }
            })
            .collect();
        if pool.is_empty() {
            return Err(DispatchError::NoCandidates);
        }

        let input = ScoringInput {
            work_type: item.work_type,
            site: item.location.coords.as_ref(),
            consider_travel: options.consider_travel,
        };
        let mut scores = Vec::with_capacity(pool.len());
        for technician in &pool {
            let mut active_today = self.store.count_active_on(&technician.technician_id, today)?;
            if item.is_assigned_to(&technician.technician_id)
                && item.status.is_active()
                && item.scheduled_date.date() == today
            {
                active_today = active_today.saturating_sub(1);
            }
            let score = self.scoring.score(input, technician, active_today);
            log::debug!(
                "work_item={} technician={} score={:.3} skill={:.2} avail={:.2} load={:.2}",
                item.work_item_id, technician.technician_id, score.total, score.skill, score.availability, score.workload
            );
            scores.push(score);
        }
        let best = select_best(&scores).ok_or(DispatchError::NoCandidates)?;
        let technician = &pool[best];
        let score = &scores[best];

        let duration = self.durations.estimate(item.work_type, item.priority);
        let bookings = self.store.find_active(&technician.technician_id, None)?;
        let slot = self.slots.find_slot(
            SlotRequest {
                priority: item.priority,
                duration,
                exclude: Some(&item.work_item_id),
                now,
                windows: options.preferred_windows.as_deref(),
            },
            &bookings,
        );
        let confidence = confidence(&self.confidence, score.skill, technician.status, slot.start - now);

        Ok(SchedulingProposal {
            work_item_id: item.work_item_id.clone(),
            technician_id: technician.technician_id.clone(),
            scheduled_date: slot.start,
            estimated_duration: duration,
            confidence,
            skill_match: score.skill,
            degraded: slot.degraded,
            based_on_version: item.version,
        })
    }

    // ── Commits ──────────────────────────────────────────────────────────────

    /// Apply a proposal, rejecting any overlap in the technician's calendar.
    pub fn commit(&self, proposal: &SchedulingProposal, source: &'static str) -> DispatchResult<CommitReceipt> {
        self.commit_with(proposal, source, BookingCheck::RejectOverlap)
    }

    pub fn commit_with(
        &self,
        proposal: &SchedulingProposal,
        source: &'static str,
        booking: BookingCheck,
    ) -> DispatchResult<CommitReceipt> {
        let now = self.now();
        let item = self.work_item(&proposal.work_item_id)?;
        if item.version != proposal.based_on_version {
            return Err(DispatchError::conflict(format!(
                "proposal for work item {} is stale (version {} != {})",
                item.work_item_id, proposal.based_on_version, item.version
            )));
        }
        if !item.status.is_reschedulable() {
            return Err(DispatchError::conflict(format!(
                "cannot schedule work item {} while it is {}",
                item.work_item_id, item.status
            )));
        }
        let technician = self.technician(&proposal.technician_id)?;

        let previous = item.technician_id.clone();
        let mut next = item.clone();
        next.status = WorkItemStatus::Assigned;
        next.technician_id = Some(technician.technician_id.clone());
        next.scheduled_date = proposal.scheduled_date;
        next.estimated_duration = proposal.estimated_duration;
        next.updated_at = now;

        let event = match &previous {
            None => DispatchEvent::TechnicianAssigned {
                work_item_id: next.work_item_id.clone(),
                technician_id: technician.technician_id.clone(),
                scheduled_date: next.scheduled_date,
                confidence: Some(proposal.confidence),
            },
            Some(from) => DispatchEvent::WorkItemRescheduled {
                work_item_id: next.work_item_id.clone(),
                from_technician: Some(from.clone()),
                to_technician: technician.technician_id.clone(),
                scheduled_date: next.scheduled_date,
                confidence: proposal.confidence,
            },
        };

        let receipt = self.store.commit_work_item(WorkItemCommit {
            item: next,
            expected_version: proposal.based_on_version,
            booking,
            require_available: false,
            technician_change: None,
            events: vec![event],
            source,
            at: now,
        })?;

        log::info!(
            "work_item={} committed technician={} at={} confidence={:.2} source={source}",
            receipt.item.work_item_id, technician.technician_id, receipt.item.scheduled_date, proposal.confidence
        );
        match previous {
            Some(from) if from != technician.technician_id => deliver(
                "technician_reassigned",
                &receipt.item.reference,
                self.notifier.technician_reassigned(&receipt.item, &technician),
            ),
            _ => deliver(
                "technician_assigned",
                &receipt.item.reference,
                self.notifier.technician_assigned(&receipt.item),
            ),
        }
        Ok(receipt)
    }

    /// Propose and commit unconditionally. A lost race is retried with a
    /// fresh proposal, up to the configured number of attempts.
    pub fn schedule_and_assign(
        &self,
        work_item_id: &str,
        options: &ScheduleOptions,
        source: &'static str,
    ) -> DispatchResult<(SchedulingProposal, WorkItem)> {
        let mut attempt = 1;
        loop {
            let proposal = self.propose(work_item_id, options)?;
            match self.commit(&proposal, source) {
                Ok(receipt) => return Ok((proposal, receipt.item)),
                Err(e) if e.is_conflict() && attempt < self.commit_attempts => {
                    log::debug!("work_item={work_item_id} attempt={attempt} lost a race: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
