use crate::{
    classifier::Classification,
    dispatch::{ScheduleOptions, SchedulingProposal},
    emergency::EmergencyOutcome,
    incident::{Incident, IncidentReport},
    optimizer::PassReport,
    technician::Technician,
    types::EntityId,
    work_item::{NewWorkItem, WorkItem},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Every operation the desk accepts from outside, as one JSON object per
/// request. Variants are appended over time, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DispatchCommand {
    // ── Incidents ─────────────────────────────────
    CreateIncident {
        #[serde(flatten)]
        report: IncidentReport,
    },
    AcknowledgeIncident { incident_id: EntityId },
    CloseIncident { incident_id: EntityId },

    // ── Work items ────────────────────────────────
    CreateWorkItem {
        #[serde(flatten)]
        item: NewWorkItem,
    },
    CreateWorkItemFromIncident { incident_id: EntityId },
    AssignTechnician { work_item_id: EntityId, technician_id: EntityId },
    StartWorkItem { work_item_id: EntityId },
    CompleteWorkItem { work_item_id: EntityId },
    CancelWorkItem { work_item_id: EntityId, reason: String },
    PostponeWorkItem { work_item_id: EntityId, until: NaiveDateTime },
    DeleteWorkItem { work_item_id: EntityId },

    // ── Dispatch ──────────────────────────────────
    ScheduleWorkItem {
        work_item_id: EntityId,
        #[serde(default)]
        options: ScheduleOptions,
    },
    ScheduleAndAssign {
        work_item_id: EntityId,
        #[serde(default)]
        options: ScheduleOptions,
    },

    // ── Roster ────────────────────────────────────
    UpsertTechnician { technician: Technician },

    // ── Clock and passes ──────────────────────────
    /// Run whatever periodic passes are due now.
    Tick,
    /// Move a manual clock forward, then tick.
    Advance { minutes: i64 },
}

/// Answer to one command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum CommandReply {
    IncidentCreated {
        incident: Incident,
        classification: Classification,
        emergency: Option<EmergencyOutcome>,
    },
    Incident { incident: Incident },
    WorkItem { work_item: WorkItem },
    Deleted { work_item_id: EntityId },
    Proposal { proposal: SchedulingProposal },
    Scheduled { proposal: SchedulingProposal, work_item: WorkItem },
    Technician { technician: Technician },
    Passes { now: NaiveDateTime, reports: Vec<PassReport> },
}
