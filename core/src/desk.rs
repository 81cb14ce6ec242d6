//! The operations desk: every external operation in one place.
//!
//! The desk owns the wiring. Dispatch, emergency handling, the optimizer
//! and the pass scheduler are built once here and share one store, one
//! clock and one notifier. No component looks another up at runtime.

use crate::{
    classifier::{Classification, IncidentClassifier},
    clock::{Clock, ManualClock},
    command::{CommandReply, DispatchCommand},
    config::DispatchConfig,
    dispatch::{DispatchService, ScheduleOptions, SchedulingProposal},
    emergency::{advance_quietly, EmergencyHandler, EmergencyOutcome},
    error::{DispatchError, DispatchResult},
    event::source,
    incident::{Incident, IncidentReport},
    notifier::{deliver, Notifier},
    optimizer::{PassReport, PeriodicOptimizer},
    rng::IdSource,
    scheduler::PassScheduler,
    store::{BookingCheck, WorkItemCommit, WorkStore},
    technician::Technician,
    types::IncidentStatus,
    work_item::{self, NewWorkItem, Transition, WorkItem},
};
use chrono::NaiveDateTime;
use std::sync::Arc;

/// Result of `create_incident`.
#[derive(Debug, Clone)]
pub struct IncidentCreated {
    pub incident: Incident,
    pub classification: Classification,
    /// Set for critical incidents.
    pub emergency: Option<EmergencyOutcome>,
}

pub struct OperationsDesk {
    store: Arc<dyn WorkStore>,
    clock: Arc<dyn Clock>,
    manual_clock: Option<Arc<ManualClock>>,
    ids: Arc<dyn IdSource>,
    classifier: IncidentClassifier,
    dispatch: Arc<DispatchService>,
    emergency: EmergencyHandler,
    optimizer: Arc<PeriodicOptimizer>,
    scheduler: Arc<PassScheduler>,
}

impl OperationsDesk {
    pub fn new(
        store: Arc<dyn WorkStore>,
        config: &DispatchConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        let dispatch = Arc::new(DispatchService::new(store.clone(), config, clock.clone(), notifier, ids.clone()));
        let emergency = EmergencyHandler::new(dispatch.clone(), config.emergency.clone());
        let optimizer = Arc::new(PeriodicOptimizer::new(dispatch.clone(), config.optimizer.clone()));
        let scheduler = Arc::new(PassScheduler::with_optimizer(store.clone(), clock.clone(), optimizer.clone()));
        Self {
            store,
            clock,
            manual_clock: None,
            ids,
            classifier: IncidentClassifier::new(),
            dispatch,
            emergency,
            optimizer,
            scheduler,
        }
    }

    /// A desk whose clock can be advanced through `DispatchCommand::Advance`.
    pub fn with_manual_clock(
        store: Arc<dyn WorkStore>,
        config: &DispatchConfig,
        clock: Arc<ManualClock>,
        notifier: Arc<dyn Notifier>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        let mut desk = Self::new(store, config, clock.clone(), notifier, ids);
        desk.manual_clock = Some(clock);
        desk
    }

    pub fn store(&self) -> &Arc<dyn WorkStore> {
        &self.store
    }

    pub fn dispatch(&self) -> &Arc<DispatchService> {
        &self.dispatch
    }

    pub fn optimizer(&self) -> &Arc<PeriodicOptimizer> {
        &self.optimizer
    }

    pub fn scheduler(&self) -> &Arc<PassScheduler> {
        &self.scheduler
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // ── Incidents ────────────────────────────────────────────────────────────

    /// Classify and record a report. Critical incidents go straight to
    /// emergency dispatch, which also sends the urgent notification.
    pub fn create_incident(&self, report: IncidentReport) -> DispatchResult<IncidentCreated> {
        let now = self.now();
        let classification = self.classifier.classify(&report.title, &report.description, report.incident_type);
        let incident = Incident {
            incident_id: self.ids.next_id(),
            title: report.title,
            description: report.description,
            incident_type: report.incident_type,
            priority: classification.priority,
            status: IncidentStatus::Reported,
            location: report.location,
            reported_at: now,
            updated_at: now,
        };
        self.store.insert_incident(&incident, source::API)?;
        log::info!(
            "incident={} reported type={} priority={} rule={:?}",
            incident.incident_id, incident.incident_type, incident.priority, classification.rule
        );

        let emergency = if classification.is_critical() {
            match self.emergency.handle(&incident) {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    log::warn!("incident={} emergency dispatch failed: {e}", incident.incident_id);
                    deliver(
                        "urgent_incident",
                        &incident.incident_id,
                        self.dispatch.notifier().urgent_incident(&incident),
                    );
                    None
                }
            }
        } else {
            None
        };

        let incident = self.incident(&incident.incident_id)?;
        Ok(IncidentCreated { incident, classification, emergency })
    }

    pub fn incident(&self, incident_id: &str) -> DispatchResult<Incident> {
        self.store
            .get_incident(incident_id)?
            .ok_or_else(|| DispatchError::not_found("incident", incident_id))
    }

    pub fn acknowledge_incident(&self, incident_id: &str) -> DispatchResult<Incident> {
        self.store.advance_incident(incident_id, IncidentStatus::Acknowledged, source::API, self.now())
    }

    pub fn close_incident(&self, incident_id: &str) -> DispatchResult<Incident> {
        self.store.advance_incident(incident_id, IncidentStatus::Closed, source::API, self.now())
    }

    // ── Work items ───────────────────────────────────────────────────────────

    pub fn create_work_item(&self, new: NewWorkItem) -> DispatchResult<WorkItem> {
        self.dispatch.create_work_item(new, source::API)
    }

    /// A planned work item for an incident, typed and prioritized from it,
    /// due now.
    pub fn create_work_item_from_incident(&self, incident_id: &str) -> DispatchResult<WorkItem> {
        let incident = self.incident(incident_id)?;
        self.dispatch.create_work_item(
            NewWorkItem {
                work_type: incident.incident_type.work_item_type(),
                priority: incident.priority.work_item_priority(),
                location: incident.location.clone(),
                scheduled_date: self.now(),
                estimated_duration: None,
                technician_id: None,
                incident_id: Some(incident.incident_id.clone()),
                notes: Some(incident.title.clone()),
            },
            source::API,
        )
    }

    pub fn work_item(&self, work_item_id: &str) -> DispatchResult<WorkItem> {
        self.dispatch.work_item(work_item_id)
    }

    /// Manual override. The technician must be available and free for the
    /// item's current slot.
    pub fn assign_technician(&self, work_item_id: &str, technician_id: &str) -> DispatchResult<WorkItem> {
        let item = self.work_item(work_item_id)?;
        let technician = self.dispatch.technician(technician_id)?;
        let previous = item.technician_id.clone();
        let transition = work_item::assign(&item, &technician, self.now())?;
        let committed = self.apply(transition, item.version, BookingCheck::RejectOverlap, true)?;

        match previous {
            Some(from) if from != technician.technician_id => deliver(
                "technician_reassigned",
                &committed.reference,
                self.dispatch.notifier().technician_reassigned(&committed, &technician),
            ),
            _ => deliver(
                "technician_assigned",
                &committed.reference,
                self.dispatch.notifier().technician_assigned(&committed),
            ),
        }
        Ok(committed)
    }

    pub fn start_work_item(&self, work_item_id: &str) -> DispatchResult<WorkItem> {
        let item = self.work_item(work_item_id)?;
        let started = self.apply(work_item::start(&item, self.now())?, item.version, BookingCheck::Skip, false)?;
        if let Some(incident_id) = &started.incident_id {
            advance_quietly(&self.dispatch, incident_id, IncidentStatus::InProgress, source::API);
        }
        Ok(started)
    }

    pub fn complete_work_item(&self, work_item_id: &str) -> DispatchResult<WorkItem> {
        let item = self.work_item(work_item_id)?;
        let done = self.apply(work_item::complete(&item, self.now())?, item.version, BookingCheck::Skip, false)?;
        if let Some(incident_id) = &done.incident_id {
            let open = self
                .store
                .find_for_incident(incident_id)?
                .iter()
                .any(|w| w.status.is_active());
            if !open {
                advance_quietly(&self.dispatch, incident_id, IncidentStatus::Resolved, source::API);
            }
        }
        Ok(done)
    }

    pub fn cancel_work_item(&self, work_item_id: &str, reason: &str) -> DispatchResult<WorkItem> {
        let item = self.work_item(work_item_id)?;
        self.apply(work_item::cancel(&item, reason, self.now())?, item.version, BookingCheck::Skip, false)
    }

    pub fn postpone_work_item(&self, work_item_id: &str, until: NaiveDateTime) -> DispatchResult<WorkItem> {
        let item = self.work_item(work_item_id)?;
        self.apply(work_item::postpone(&item, until, self.now())?, item.version, BookingCheck::Skip, false)
    }

    pub fn delete_work_item(&self, work_item_id: &str) -> DispatchResult<()> {
        let item = self.work_item(work_item_id)?;
        work_item::ensure_deletable(&item)?;
        self.store.delete_work_item(work_item_id, item.version, source::API, self.now())?;
        log::info!("work_item={work_item_id} deleted");
        Ok(())
    }

    fn apply(
        &self,
        transition: Transition,
        expected_version: i64,
        booking: BookingCheck,
        require_available: bool,
    ) -> DispatchResult<WorkItem> {
        let event = transition.event.type_name();
        let mut commit = WorkItemCommit::from_transition(transition, expected_version, source::API, self.now())
            .with_booking(booking);
        if require_available {
            commit = commit.requiring_available();
        }
        let receipt = self.store.commit_work_item(commit)?;
        log::info!("work_item={} {event} status={}", receipt.item.work_item_id, receipt.item.status);
        Ok(receipt.item)
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// A proposal without committing it.
    pub fn schedule_work_item(&self, work_item_id: &str, options: &ScheduleOptions) -> DispatchResult<SchedulingProposal> {
        self.dispatch.propose(work_item_id, options)
    }

    pub fn schedule_and_assign(
        &self,
        work_item_id: &str,
        options: &ScheduleOptions,
    ) -> DispatchResult<(SchedulingProposal, WorkItem)> {
        self.dispatch.schedule_and_assign(work_item_id, options, source::API)
    }

    // ── Roster ───────────────────────────────────────────────────────────────

    pub fn upsert_technician(&self, technician: &Technician) -> DispatchResult<Technician> {
        self.store.upsert_technician(technician)?;
        self.dispatch.technician(&technician.technician_id)
    }

    // ── Passes ───────────────────────────────────────────────────────────────

    pub fn tick(&self) -> Vec<PassReport> {
        self.scheduler.tick()
    }

    // ── Command entry point ──────────────────────────────────────────────────

    pub fn execute(&self, command: DispatchCommand) -> DispatchResult<CommandReply> {
        use DispatchCommand as C;
        let item_reply = |w: WorkItem| CommandReply::WorkItem { work_item: w };
        let incident_reply = |i: Incident| CommandReply::Incident { incident: i };

        Ok(match command {
            C::CreateIncident { report } => {
                let created = self.create_incident(report)?;
                CommandReply::IncidentCreated {
                    incident: created.incident,
                    classification: created.classification,
                    emergency: created.emergency,
                }
            }
            C::AcknowledgeIncident { incident_id } => incident_reply(self.acknowledge_incident(&incident_id)?),
            C::CloseIncident { incident_id } => incident_reply(self.close_incident(&incident_id)?),
            C::CreateWorkItem { item } => item_reply(self.create_work_item(item)?),
            C::CreateWorkItemFromIncident { incident_id } => {
                item_reply(self.create_work_item_from_incident(&incident_id)?)
            }
            C::AssignTechnician { work_item_id, technician_id } => {
                item_reply(self.assign_technician(&work_item_id, &technician_id)?)
            }
            C::StartWorkItem { work_item_id } => item_reply(self.start_work_item(&work_item_id)?),
            C::CompleteWorkItem { work_item_id } => item_reply(self.complete_work_item(&work_item_id)?),
            C::CancelWorkItem { work_item_id, reason } => item_reply(self.cancel_work_item(&work_item_id, &reason)?),
            C::PostponeWorkItem { work_item_id, until } => item_reply(self.postpone_work_item(&work_item_id, until)?),
            C::DeleteWorkItem { work_item_id } => {
                self.delete_work_item(&work_item_id)?;
                CommandReply::Deleted { work_item_id }
            }
            C::ScheduleWorkItem { work_item_id, options } => CommandReply::Proposal {
                proposal: self.schedule_work_item(&work_item_id, &options)?,
            },
            C::ScheduleAndAssign { work_item_id, options } => {
                let (proposal, work_item) = self.schedule_and_assign(&work_item_id, &options)?;
                CommandReply::Scheduled { proposal, work_item }
            }
            C::UpsertTechnician { technician } => CommandReply::Technician {
                technician: self.upsert_technician(&technician)?,
            },
            C::Tick => CommandReply::Passes { reports: self.tick(), now: self.now() },
            C::Advance { minutes } => {
                let clock = self
                    .manual_clock
                    .as_ref()
                    .ok_or_else(|| DispatchError::conflict("clock cannot be advanced: desk runs on system time"))?;
                if minutes < 0 {
                    return Err(DispatchError::conflict("clock only moves forward"));
                }
                clock.advance_minutes(minutes);
                CommandReply::Passes { reports: self.tick(), now: self.now() }
            }
        })
    }
}
