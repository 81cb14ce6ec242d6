//! Technician roster records.
//!
//! Skills and location belong to the external roster process; the
//! dispatcher reads them and only ever writes `status`.

use crate::types::{EntityId, GeoPoint, Skill, TechnicianStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Row from the `technician` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technician {
    pub technician_id: EntityId,
    pub name: String,
    pub status: TechnicianStatus,
    pub skills: BTreeSet<Skill>,
    pub location: Option<GeoPoint>,
}

impl Technician {
    pub fn new(technician_id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            technician_id: technician_id.into(),
            name: name.into(),
            status: TechnicianStatus::Available,
            skills: BTreeSet::new(),
            location: None,
        }
    }

    pub fn with_skills(mut self, skills: &[Skill]) -> Self {
        self.skills = skills.iter().copied().collect();
        self
    }

    pub fn with_status(mut self, status: TechnicianStatus) -> Self {
        self.status = status;
        self
    }

    pub fn at(mut self, lat: f64, lon: f64) -> Self {
        self.location = Some(GeoPoint::new(lat, lon));
        self
    }

    /// Members of the default dispatch pool.
    pub fn is_dispatchable(&self) -> bool {
        match self.status {
            TechnicianStatus::Available | TechnicianStatus::Busy => true,
            TechnicianStatus::OffDuty | TechnicianStatus::Vacation => false,
        }
    }
}
