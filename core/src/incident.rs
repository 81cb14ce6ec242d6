//! Reported incidents and their lifecycle.
//!
//! An incident owns its work items only weakly: each work item keeps an
//! `incident_id` back-reference, the incident keeps nothing.

use crate::{
    error::{DispatchError, DispatchResult},
    types::{EntityId, IncidentPriority, IncidentStatus, IncidentType, Location, Priority, WorkItemType},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Row from the `incident` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: EntityId,
    pub title: String,
    pub description: String,
    pub incident_type: IncidentType,
    pub priority: IncidentPriority,
    pub status: IncidentStatus,
    pub location: Location,
    pub reported_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Caller-supplied fields of a new incident report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub incident_type: IncidentType,
    pub location: Location,
}

impl IncidentType {
    /// Kind of field work an incident of this type calls for.
    pub fn work_item_type(&self) -> WorkItemType {
        match self {
            Self::Leak | Self::PowerOutage => WorkItemType::Repair,
            Self::EquipmentFailure => WorkItemType::Maintenance,
            Self::Emergency => WorkItemType::Emergency,
            Self::QualityIssue | Self::Other => WorkItemType::Maintenance,
        }
    }
}

impl IncidentPriority {
    pub fn work_item_priority(&self) -> Priority {
        match self {
            Self::Low => Priority::Low,
            Self::Medium => Priority::Medium,
            Self::High => Priority::High,
            Self::Critical => Priority::Urgent,
        }
    }
}

/// Validate an incident status change. Returns the target status.
///
/// Incidents move forward only; `closed` is terminal and any open
/// incident may be closed directly.
pub fn advance_status(incident: &Incident, to: IncidentStatus) -> DispatchResult<IncidentStatus> {
    use IncidentStatus::*;
    let allowed = match (incident.status, to) {
        (Closed, _) => false,
        (_, Closed) => true,
        (Reported, Acknowledged | Assigned | InProgress) => true,
        (Acknowledged, Assigned | InProgress) => true,
        (Assigned, InProgress) => true,
        (Reported | Acknowledged | Assigned | InProgress, Resolved) => true,
        _ => false,
    };
    if allowed {
        Ok(to)
    } else {
        Err(DispatchError::conflict(format!(
            "incident {} cannot move from {} to {}",
            incident.incident_id, incident.status, to
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn incident(status: IncidentStatus) -> Incident {
        let t = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(9, 0, 0).unwrap();
        Incident {
            incident_id: "inc-1".into(),
            title: "t".into(),
            description: String::new(),
            incident_type: IncidentType::Leak,
            priority: IncidentPriority::High,
            status,
            location: Location::new("somewhere"),
            reported_at: t,
            updated_at: t,
        }
    }

    #[test]
    fn closed_is_terminal() {
        let err = advance_status(&incident(IncidentStatus::Closed), IncidentStatus::Resolved).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn status_never_moves_backwards() {
        assert!(advance_status(&incident(IncidentStatus::InProgress), IncidentStatus::Assigned).is_err());
        assert!(advance_status(&incident(IncidentStatus::Reported), IncidentStatus::InProgress).is_ok());
    }
}
