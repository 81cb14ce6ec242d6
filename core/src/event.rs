//! The dispatch event log: the audit trail of every state mutation.
//!
//! RULE: An event is written in the same store transaction as the
//! mutation it describes. No mutation without an event, no event
//! without a mutation.

use crate::{
    error::DispatchResult,
    types::{EntityId, IncidentPriority, IncidentStatus, Minutes, Priority, TechnicianStatus, WorkItemType},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Where a mutation originated. Stored in the `source` column.
pub mod source {
    pub const API: &str = "api";
    pub const EMERGENCY: &str = "emergency";
    pub const OVERDUE_SWEEP: &str = "overdue_sweep";
    pub const NIGHTLY: &str = "nightly_reoptimize";
}

/// Variants are appended over time. Never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    // ── Work item lifecycle ────────────────────────
    WorkItemCreated {
        work_item_id: EntityId,
        reference: String,
        work_type: WorkItemType,
        priority: Priority,
        scheduled_date: NaiveDateTime,
    },
    TechnicianAssigned {
        work_item_id: EntityId,
        technician_id: EntityId,
        scheduled_date: NaiveDateTime,
        confidence: Option<f64>,
    },
    WorkItemRescheduled {
        work_item_id: EntityId,
        from_technician: Option<EntityId>,
        to_technician: EntityId,
        scheduled_date: NaiveDateTime,
        confidence: f64,
    },
    WorkItemDisplaced {
        work_item_id: EntityId,
        technician_id: EntityId,
        by_work_item_id: EntityId,
    },
    WorkItemStarted {
        work_item_id: EntityId,
        technician_id: EntityId,
        started_at: NaiveDateTime,
    },
    WorkItemCompleted {
        work_item_id: EntityId,
        technician_id: EntityId,
        actual_duration: Minutes,
    },
    WorkItemCancelled {
        work_item_id: EntityId,
        reason: String,
    },
    WorkItemPostponed {
        work_item_id: EntityId,
        until: NaiveDateTime,
    },
    WorkItemDeleted {
        work_item_id: EntityId,
    },

    // ── Technicians ────────────────────────────────
    TechnicianStatusChanged {
        technician_id: EntityId,
        from: TechnicianStatus,
        to: TechnicianStatus,
    },

    // ── Incidents ──────────────────────────────────
    IncidentReported {
        incident_id: EntityId,
        priority: IncidentPriority,
    },
    IncidentStatusChanged {
        incident_id: EntityId,
        from: IncidentStatus,
        to: IncidentStatus,
    },
    EmergencyDispatched {
        incident_id: EntityId,
        work_item_id: EntityId,
        technician_id: Option<EntityId>,
    },
}

impl DispatchEvent {
    /// Stable name for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::WorkItemCreated { .. }         => "work_item_created",
            Self::TechnicianAssigned { .. }      => "technician_assigned",
            Self::WorkItemRescheduled { .. }     => "work_item_rescheduled",
            Self::WorkItemDisplaced { .. }       => "work_item_displaced",
            Self::WorkItemStarted { .. }         => "work_item_started",
            Self::WorkItemCompleted { .. }       => "work_item_completed",
            Self::WorkItemCancelled { .. }       => "work_item_cancelled",
            Self::WorkItemPostponed { .. }       => "work_item_postponed",
            Self::WorkItemDeleted { .. }         => "work_item_deleted",
            Self::TechnicianStatusChanged { .. } => "technician_status_changed",
            Self::IncidentReported { .. }        => "incident_reported",
            Self::IncidentStatusChanged { .. }   => "incident_status_changed",
            Self::EmergencyDispatched { .. }     => "emergency_dispatched",
        }
    }

    /// The entity the event is about, for the `entity_id` column.
    pub fn entity_id(&self) -> &str {
        match self {
            Self::WorkItemCreated { work_item_id, .. }
            | Self::TechnicianAssigned { work_item_id, .. }
            | Self::WorkItemRescheduled { work_item_id, .. }
            | Self::WorkItemDisplaced { work_item_id, .. }
            | Self::WorkItemStarted { work_item_id, .. }
            | Self::WorkItemCompleted { work_item_id, .. }
            | Self::WorkItemCancelled { work_item_id, .. }
            | Self::WorkItemPostponed { work_item_id, .. }
            | Self::WorkItemDeleted { work_item_id } => work_item_id,
            Self::TechnicianStatusChanged { technician_id, .. } => technician_id,
            Self::IncidentReported { incident_id, .. }
            | Self::IncidentStatusChanged { incident_id, .. }
            | Self::EmergencyDispatched { incident_id, .. } => incident_id,
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub recorded_at: NaiveDateTime,
    pub source: String,
    pub event_type: String,
    pub entity_id: String,
    pub payload: String, // JSON-serialized DispatchEvent
}

impl EventLogEntry {
    pub fn new(recorded_at: NaiveDateTime, source: &str, event: &DispatchEvent) -> DispatchResult<Self> {
        Ok(Self {
            id: None,
            recorded_at,
            source: source.to_string(),
            event_type: event.type_name().to_string(),
            entity_id: event.entity_id().to_string(),
            payload: serde_json::to_string(event)?,
        })
    }

    pub fn decode(&self) -> DispatchResult<DispatchEvent> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}
