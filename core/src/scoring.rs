//! Technician fitness scoring.
//!
//! Pure: every input is passed in, nothing is read from the store.
//!
//!   total = skill × w_skill + availability × w_avail
//!         + proximity × w_prox   (only when both sides have coordinates)
//!         + workload × w_load
//!
//! Weights are not renormalized when proximity is left out, so a score
//! without travel information tops out at 0.8 with the default weights.

use crate::{
    config::ScoringConfig,
    technician::Technician,
    types::{EntityId, GeoPoint, Skill, TechnicianStatus, WorkItemType},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Skills a work type calls for.
pub fn required_skills(work_type: WorkItemType) -> &'static [Skill] {
    match work_type {
        WorkItemType::Maintenance => &[Skill::Mechanical, Skill::Plumbing],
        WorkItemType::Repair => &[Skill::Mechanical, Skill::Electrical],
        WorkItemType::Installation => &[Skill::Plumbing, Skill::Electrical],
        WorkItemType::Emergency => &[Skill::Emergency],
        WorkItemType::Reading => &[Skill::Electronics],
        WorkItemType::Cutting => &[Skill::Mechanical],
    }
}

/// |skills ∩ required| / |required|. A technician with no recorded skills
/// gets `empty_score`.
pub fn skill_match(skills: &BTreeSet<Skill>, work_type: WorkItemType, empty_score: f64) -> f64 {
    if skills.is_empty() {
        return empty_score;
    }
    let required = required_skills(work_type);
    if required.is_empty() {
        return empty_score;
    }
    let covered = required.iter().filter(|s| skills.contains(s)).count();
    covered as f64 / required.len() as f64
}

pub fn availability_score(status: TechnicianStatus) -> f64 {
    match status {
        TechnicianStatus::Available => 1.0,
        TechnicianStatus::Busy => 0.3,
        TechnicianStatus::OffDuty | TechnicianStatus::Vacation => 0.0,
    }
}

/// One technician's score with its parts, for logs and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub technician_id: EntityId,
    pub skill: f64,
    pub availability: f64,
    /// None when travel was not considered or a location is missing.
    pub proximity: Option<f64>,
    pub workload: f64,
    pub total: f64,
}

/// What the engine needs to know about the work being placed.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub work_type: WorkItemType,
    pub site: Option<&'a GeoPoint>,
    pub consider_travel: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// `active_today` is the technician's active work-item count for the
    /// reference day, not counting the item being scored.
    pub fn score(&self, input: ScoringInput<'_>, technician: &Technician, active_today: usize) -> ScoreBreakdown {
        let c = &self.config;
        let skill = skill_match(&technician.skills, input.work_type, c.empty_skills_score);
        let availability = availability_score(technician.status);
        let proximity = if input.consider_travel {
            input.site.zip(technician.location.as_ref()).map(|(site, here)| self.proximity(site, here))
        } else {
            None
        };
        let workload = (1.0 - active_today as f64 / c.workload_capacity).max(0.0);

        let mut total = skill * c.skill_weight + availability * c.availability_weight + workload * c.workload_weight;
        if let Some(p) = proximity {
            total += p * c.proximity_weight;
        }

        ScoreBreakdown {
            technician_id: technician.technician_id.clone(),
            skill,
            availability,
            proximity,
            workload,
            total: total.clamp(0.0, 1.0),
        }
    }

    fn proximity(&self, site: &GeoPoint, here: &GeoPoint) -> f64 {
        let km = site.degree_distance(here) * self.config.km_per_degree;
        (1.0 - km / self.config.proximity_cutoff_km).max(0.0)
    }
}

/// Index of the winning score. Ties keep the earliest entry. When nothing
/// scores above zero the first entry wins anyway. None only for an empty slice.
pub fn select_best(scores: &[ScoreBreakdown]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, s) in scores.iter().enumerate() {
        if s.total <= 0.0 {
            continue;
        }
        match best {
            Some(b) if scores[b].total >= s.total => {}
            _ => best = Some(i),
        }
    }
    best.or(if scores.is_empty() { None } else { Some(0) })
}
