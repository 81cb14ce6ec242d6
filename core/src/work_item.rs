//! Work items (field interventions) and their state machine.
//!
//!   planned ──► assigned ──► in_progress ──► completed
//!      │           │              │
//!      ├───────────┴──────────────┴──► cancelled
//!      └───────────┴──► postponed
//!
//! Every function here is pure: it validates the requested move against
//! the current record and returns the `Transition` to apply. Nothing is
//! written until the store commits the transition atomically.
//!
//! INVARIANT: `status ∈ {assigned, in_progress} ⇒ technician_id.is_some()`.

use crate::{
    error::{DispatchError, DispatchResult},
    event::DispatchEvent,
    technician::Technician,
    types::{EntityId, Location, Minutes, Priority, TechnicianStatus, WorkItemStatus, WorkItemType},
};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Row from the `work_item` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub work_item_id: EntityId,
    /// Human-facing work-order number, e.g. `INT-2026-000042`.
    pub reference: String,
    pub work_type: WorkItemType,
    pub priority: Priority,
    pub status: WorkItemStatus,
    pub location: Location,
    pub scheduled_date: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub estimated_duration: Minutes,
    pub actual_duration: Option<Minutes>,
    pub technician_id: Option<EntityId>,
    pub incident_id: Option<EntityId>,
    pub notes: Option<String>,
    /// Optimistic concurrency token, bumped by the store on every commit.
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl WorkItem {
    pub fn scheduled_end(&self) -> NaiveDateTime {
        self.scheduled_date + Duration::minutes(self.estimated_duration)
    }

    /// Half-open interval overlap with `[start, end)`.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.scheduled_date < end && self.scheduled_end() > start
    }

    pub fn is_assigned_to(&self, technician_id: &str) -> bool {
        self.technician_id.as_deref() == Some(technician_id)
    }
}

/// Caller-supplied fields of a new work item (`CreateWorkItem`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub work_type: WorkItemType,
    pub priority: Priority,
    pub location: Location,
    pub scheduled_date: NaiveDateTime,
    #[serde(default)]
    pub estimated_duration: Option<Minutes>,
    #[serde(default)]
    pub technician_id: Option<EntityId>,
    #[serde(default)]
    pub incident_id: Option<EntityId>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Technician status side effect of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TechnicianChange {
    SetBusy(EntityId),
    /// Back to available, unless another in-progress item still holds them.
    ReleaseIfIdle(EntityId),
}

/// A validated state change, ready for the store to commit.
#[derive(Debug, Clone)]
pub struct Transition {
    pub item: WorkItem,
    pub technician_change: Option<TechnicianChange>,
    pub event: DispatchEvent,
}

fn invalid_move(item: &WorkItem, action: &str) -> DispatchError {
    DispatchError::conflict(format!(
        "cannot {action} work item {} while it is {}",
        item.work_item_id, item.status
    ))
}

fn assigned_technician(item: &WorkItem) -> DispatchResult<EntityId> {
    item.technician_id.clone().ok_or_else(|| {
        DispatchError::conflict(format!("work item {} has no technician", item.work_item_id))
    })
}

/// `planned → assigned` (also re-assigns an already assigned item).
pub fn assign(item: &WorkItem, technician: &Technician, now: NaiveDateTime) -> DispatchResult<Transition> {
    match item.status {
        WorkItemStatus::Planned | WorkItemStatus::Assigned => {}
        WorkItemStatus::InProgress
        | WorkItemStatus::Completed
        | WorkItemStatus::Cancelled
        | WorkItemStatus::Postponed => return Err(invalid_move(item, "assign")),
    }
    if technician.status != TechnicianStatus::Available {
        return Err(DispatchError::conflict(format!(
            "technician {} is {}, not available",
            technician.technician_id, technician.status
        )));
    }

    let mut next = item.clone();
    next.status = WorkItemStatus::Assigned;
    next.technician_id = Some(technician.technician_id.clone());
    next.updated_at = now;

    Ok(Transition {
        event: DispatchEvent::TechnicianAssigned {
            work_item_id: next.work_item_id.clone(),
            technician_id: technician.technician_id.clone(),
            scheduled_date: next.scheduled_date,
            confidence: None,
        },
        item: next,
        technician_change: None,
    })
}

/// `assigned → in_progress`. The technician becomes busy.
pub fn start(item: &WorkItem, now: NaiveDateTime) -> DispatchResult<Transition> {
    if item.status != WorkItemStatus::Assigned {
        return Err(invalid_move(item, "start"));
    }
    let technician_id = assigned_technician(item)?;

    let mut next = item.clone();
    next.status = WorkItemStatus::InProgress;
    next.started_at = Some(now);
    next.updated_at = now;

    Ok(Transition {
        event: DispatchEvent::WorkItemStarted {
            work_item_id: next.work_item_id.clone(),
            technician_id: technician_id.clone(),
            started_at: now,
        },
        item: next,
        technician_change: Some(TechnicianChange::SetBusy(technician_id)),
    })
}

/// `in_progress → completed`. Records the actual duration and frees the technician.
pub fn complete(item: &WorkItem, now: NaiveDateTime) -> DispatchResult<Transition> {
    if item.status != WorkItemStatus::InProgress {
        return Err(invalid_move(item, "complete"));
    }
    let technician_id = assigned_technician(item)?;
    let started_at = item.started_at.unwrap_or(item.scheduled_date);
    let elapsed_secs = (now - started_at).num_seconds().max(0);
    let actual = (elapsed_secs as f64 / 60.0).round() as Minutes;

    let mut next = item.clone();
    next.status = WorkItemStatus::Completed;
    next.completed_at = Some(now);
    next.actual_duration = Some(actual);
    next.updated_at = now;

    Ok(Transition {
        event: DispatchEvent::WorkItemCompleted {
            work_item_id: next.work_item_id.clone(),
            technician_id: technician_id.clone(),
            actual_duration: actual,
        },
        item: next,
        technician_change: Some(TechnicianChange::ReleaseIfIdle(technician_id)),
    })
}

/// Any active state `→ cancelled`. Releases the technician if one was assigned.
pub fn cancel(item: &WorkItem, reason: &str, now: NaiveDateTime) -> DispatchResult<Transition> {
    if !item.status.is_active() {
        return Err(invalid_move(item, "cancel"));
    }

    let mut next = item.clone();
    next.status = WorkItemStatus::Cancelled;
    next.notes = Some(reason.to_string());
    next.updated_at = now;

    Ok(Transition {
        technician_change: item.technician_id.clone().map(TechnicianChange::ReleaseIfIdle),
        event: DispatchEvent::WorkItemCancelled {
            work_item_id: next.work_item_id.clone(),
            reason: reason.to_string(),
        },
        item: next,
    })
}

/// `planned | assigned → postponed`. The item leaves the technician's calendar.
pub fn postpone(item: &WorkItem, until: NaiveDateTime, now: NaiveDateTime) -> DispatchResult<Transition> {
    if !item.status.is_reschedulable() {
        return Err(invalid_move(item, "postpone"));
    }

    let mut next = item.clone();
    next.status = WorkItemStatus::Postponed;
    next.scheduled_date = until;
    next.technician_id = None;
    next.updated_at = now;

    Ok(Transition {
        event: DispatchEvent::WorkItemPostponed {
            work_item_id: next.work_item_id.clone(),
            until,
        },
        item: next,
        technician_change: None,
    })
}

/// Work in progress is never physically deleted.
pub fn ensure_deletable(item: &WorkItem) -> DispatchResult<()> {
    match item.status {
        WorkItemStatus::InProgress => Err(invalid_move(item, "delete")),
        WorkItemStatus::Planned
        | WorkItemStatus::Assigned
        | WorkItemStatus::Completed
        | WorkItemStatus::Cancelled
        | WorkItemStatus::Postponed => Ok(()),
    }
}
