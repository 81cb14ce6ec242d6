//! Emergency dispatch for critical incidents.
//!
//! Skips confidence gating entirely. The emergency work item is scheduled
//! now, offered to available technicians only, and committed with
//! preemption: lower-priority planned/assigned work in the way goes back
//! to the pool and is placed again straight away.
//!
//! With nobody available the item stays planned and unassigned. The
//! low/medium work of the coming days that could make room is surfaced
//! for operators and the overdue sweep, never bumped here.

use crate::{
    config::EmergencyConfig,
    dispatch::{DispatchService, ScheduleOptions, SchedulingProposal},
    error::{DispatchError, DispatchResult},
    event::{source, DispatchEvent},
    incident::Incident,
    notifier::deliver,
    store::{BookingCheck, TimeRange},
    types::{EntityId, IncidentStatus, Priority, TechnicianStatus, WorkItemType},
    work_item::{NewWorkItem, WorkItem},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a displaced item ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redispatch {
    pub work_item_id: EntityId,
    /// None when no new placement could be committed.
    pub technician_id: Option<EntityId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EmergencyOutcome {
    Dispatched {
        work_item: WorkItem,
        proposal: SchedulingProposal,
        displaced: Vec<Redispatch>,
    },
    /// No technician could take the work now.
    Unstaffed {
        work_item: WorkItem,
        reschedulable: Vec<WorkItem>,
    },
}

impl EmergencyOutcome {
    pub fn work_item(&self) -> &WorkItem {
        match self {
            Self::Dispatched { work_item, .. } | Self::Unstaffed { work_item, .. } => work_item,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

pub struct EmergencyHandler {
    dispatch: Arc<DispatchService>,
    config: EmergencyConfig,
}

impl EmergencyHandler {
    pub fn new(dispatch: Arc<DispatchService>, config: EmergencyConfig) -> Self {
        Self { dispatch, config }
    }

    pub fn handle(&self, incident: &Incident) -> DispatchResult<EmergencyOutcome> {
        let store = self.dispatch.store();
        let now = self.dispatch.now();

        let anyone_available = store
            .list_technicians()?
            .iter()
            .any(|t| t.status == TechnicianStatus::Available);
        let reschedulable = if anyone_available {
            Vec::new()
        } else {
            let range = TimeRange::new(now, now + Duration::days(self.config.reschedulable_lookahead_days));
            let found = store.find_reschedulable(range, Priority::Medium)?;
            log::info!(
                "incident={} no technician available, {} reschedulable item(s) in the next {} days",
                incident.incident_id,
                found.len(),
                self.config.reschedulable_lookahead_days
            );
            found
        };

        let work_item = self.dispatch.create_work_item(
            NewWorkItem {
                work_type: WorkItemType::Emergency,
                priority: Priority::Urgent,
                location: incident.location.clone(),
                scheduled_date: now,
                estimated_duration: None,
                technician_id: None,
                incident_id: Some(incident.incident_id.clone()),
                notes: Some(incident.title.clone()),
            },
            source::EMERGENCY,
        )?;

        let outcome = match self.place(&work_item) {
            Ok(Some((proposal, placed, displaced))) => {
                advance_quietly(&self.dispatch, &incident.incident_id, IncidentStatus::Assigned, source::EMERGENCY);
                EmergencyOutcome::Dispatched { work_item: placed, proposal, displaced }
            }
            Ok(None) => EmergencyOutcome::Unstaffed { work_item, reschedulable },
            Err(e) => return Err(e),
        };

        let technician_id = match &outcome {
            EmergencyOutcome::Dispatched { proposal, .. } => Some(proposal.technician_id.clone()),
            EmergencyOutcome::Unstaffed { .. } => None,
        };
        store.record_event(
            &DispatchEvent::EmergencyDispatched {
                incident_id: incident.incident_id.clone(),
                work_item_id: outcome.work_item().work_item_id.clone(),
                technician_id: technician_id.clone(),
            },
            source::EMERGENCY,
            now,
        )?;
        log::info!(
            "incident={} emergency work_item={} technician={}",
            incident.incident_id,
            outcome.work_item().work_item_id,
            technician_id.as_deref().unwrap_or("none")
        );
        deliver("urgent_incident", &incident.incident_id, self.dispatch.notifier().urgent_incident(incident));
        Ok(outcome)
    }

    /// Propose among available technicians and commit with preemption. A
    /// technician whose calendar refuses the commit leaves the pool and the
    /// next best is tried. Ok(None) once nobody is left.
    fn place(&self, item: &WorkItem) -> DispatchResult<Option<(SchedulingProposal, WorkItem, Vec<Redispatch>)>> {
        let mut refused: Vec<EntityId> = Vec::new();
        loop {
            let current = self.dispatch.work_item(&item.work_item_id)?;
            let proposal = match self.dispatch.propose_excluding(&current, &ScheduleOptions::emergency(), &refused) {
                Ok(p) => p,
                Err(DispatchError::NoCandidates) => return Ok(None),
                Err(e) => return Err(e),
            };
            match self.dispatch.commit_with(&proposal, source::EMERGENCY, BookingCheck::PreemptLowerPriority) {
                Ok(receipt) => {
                    let displaced = receipt.displaced.iter().map(|other| self.redispatch(other)).collect();
                    return Ok(Some((proposal, receipt.item, displaced)));
                }
                Err(e) if e.is_conflict() => {
                    log::warn!(
                        "work_item={} emergency commit refused by technician={}: {e}",
                        item.work_item_id,
                        proposal.technician_id
                    );
                    refused.push(proposal.technician_id);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn redispatch(&self, displaced: &WorkItem) -> Redispatch {
        let placed = self.dispatch.schedule_and_assign(
            &displaced.work_item_id,
            &ScheduleOptions::default(),
            source::EMERGENCY,
        );
        match placed {
            Ok((proposal, _)) => Redispatch {
                work_item_id: displaced.work_item_id.clone(),
                technician_id: Some(proposal.technician_id),
            },
            Err(e) => {
                log::warn!("work_item={} displaced and not re-placed: {e}", displaced.work_item_id);
                Redispatch { work_item_id: displaced.work_item_id.clone(), technician_id: None }
            }
        }
    }
}

/// Move an incident forward when its work progresses. An incident that is
/// already further along is left alone.
pub(crate) fn advance_quietly(
    dispatch: &DispatchService,
    incident_id: &str,
    to: IncidentStatus,
    origin: &'static str,
) {
    let now = dispatch.now();
    match dispatch.store().advance_incident(incident_id, to, origin, now) {
        Ok(_) => {}
        Err(e) if e.is_conflict() => log::debug!("incident={incident_id} stays put: {e}"),
        Err(e) => log::warn!("incident={incident_id} status update to {to} failed: {e}"),
    }
}
