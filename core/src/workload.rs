//! Seeded roster and workload generation for demos, the runner and the
//! determinism tests. Same seed, same technicians, same reports, same order.

use crate::{
    incident::IncidentReport,
    rng::StreamRng,
    technician::Technician,
    types::{IncidentType, Location, Priority, Skill, TechnicianStatus, WorkItemType},
    work_item::NewWorkItem,
};
use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Centre of the service area and how far sites spread around it, in degrees.
const BASE_LAT: f64 = 43.604;
const BASE_LON: f64 = 1.444;
const SPREAD: f64 = 0.25;

const FIRST_NAMES: &[&str] = &[
    "Camille", "Lucas", "Manon", "Hugo", "Léa", "Nathan", "Chloé", "Louis", "Inès", "Jules",
    "Sarah", "Adam", "Emma", "Théo", "Jade", "Malik", "Yasmine", "Paul", "Nora", "Samir",
];

const LAST_NAMES: &[&str] = &[
    "Martin", "Bernard", "Dubois", "Thomas", "Robert", "Richard", "Petit", "Durand", "Leroy", "Moreau",
    "Simon", "Laurent", "Lefebvre", "Michel", "Garcia", "Fournier", "Benali", "Mercier", "Rousseau", "Blanc",
];

const STREETS: &[&str] = &[
    "avenue de la Gare", "rue des Lilas", "boulevard Carnot", "rue du Moulin", "chemin des Vignes",
    "place du Marché", "rue Pasteur", "allée des Pins", "quai de la Daurade", "route de Revel",
];

/// (type, title, description) seeds. Some carry classifier keywords, some don't.
const REPORTS: &[(IncidentType, &str, &str)] = &[
    (IncidentType::Leak, "Fuite majeure", "Eau qui jaillit de la chaussée"),
    (IncidentType::Leak, "Fuite sous compteur", "Flaque permanente devant le regard"),
    (IncidentType::Leak, "Damp patch on pavement", "Resident reports wet ground near the meter"),
    (IncidentType::PowerOutage, "Coupure pompe de relevage", "Station sans alimentation"),
    (IncidentType::PowerOutage, "Pump station dark", "No telemetry since this morning"),
    (IncidentType::EquipmentFailure, "Vanne bloquée", "Manoeuvre impossible sur la vanne principale"),
    (IncidentType::EquipmentFailure, "Pressure regulator breakdown", "Pressure swings reported"),
    (IncidentType::QualityIssue, "Eau trouble", "Plusieurs abonnés signalent une eau colorée"),
    (IncidentType::QualityIssue, "Taste complaint", "Chlorine taste reported by a school"),
    (IncidentType::Emergency, "Rupture de canalisation", "Inondation de la cave d'un immeuble"),
    (IncidentType::Other, "Regard descellé", "Plaque de regard bruyante au passage des voitures"),
    (IncidentType::Other, "Meter access blocked", "Cabinet padlocked by the owner"),
];

pub fn full_name(rng: &mut StreamRng) -> String {
    let first = rng.pick(FIRST_NAMES).copied().unwrap_or("Alex");
    let last = rng.pick(LAST_NAMES).copied().unwrap_or("Martin");
    format!("{first} {last}")
}

pub fn location(rng: &mut StreamRng) -> Location {
    let number = 1 + rng.below(120);
    let street = rng.pick(STREETS).copied().unwrap_or("rue Principale");
    let lat = BASE_LAT + rng.range_f64(-SPREAD, SPREAD);
    let lon = BASE_LON + rng.range_f64(-SPREAD, SPREAD);
    Location::new(format!("{number} {street}")).with_coords(lat, lon)
}

/// `count` technicians with ids `tech-001`, `tech-002`, … Most are on duty.
pub fn roster(rng: &mut StreamRng, count: usize) -> Vec<Technician> {
    (1..=count)
        .map(|n| {
            let mut skills: Vec<Skill> = Skill::ALL.iter().copied().filter(|_| rng.chance(0.4)).collect();
            if skills.is_empty() {
                if let Some(s) = rng.pick(Skill::ALL) {
                    skills.push(*s);
                }
            }
            let status = match rng.below(10) {
                0 => TechnicianStatus::OffDuty,
                1 => TechnicianStatus::Vacation,
                _ => TechnicianStatus::Available,
            };
            let here = location(rng).coords;
            let mut technician = Technician::new(format!("tech-{n:03}"), full_name(rng))
                .with_skills(&skills)
                .with_status(status);
            technician.location = here;
            technician
        })
        .collect()
}

pub fn incident_report(rng: &mut StreamRng) -> IncidentReport {
    let (incident_type, title, description) = rng
        .pick(REPORTS)
        .copied()
        .unwrap_or((IncidentType::Other, "Signalement", ""));
    IncidentReport {
        title: title.to_string(),
        description: description.to_string(),
        incident_type,
        location: location(rng),
    }
}

/// A planned intervention a few working hours to a few days out.
pub fn planned_work(rng: &mut StreamRng, now: NaiveDateTime) -> NewWorkItem {
    let work_type = rng
        .pick(&[
            WorkItemType::Maintenance,
            WorkItemType::Maintenance,
            WorkItemType::Reading,
            WorkItemType::Reading,
            WorkItemType::Repair,
            WorkItemType::Installation,
            WorkItemType::Cutting,
        ])
        .copied()
        .unwrap_or(WorkItemType::Maintenance);
    let priority = match rng.below(20) {
        0 => Priority::Urgent,
        1..=4 => Priority::High,
        5..=12 => Priority::Medium,
        _ => Priority::Low,
    };
    let day = now.date() + Duration::days(1 + rng.below(5) as i64);
    let hour = [8, 9, 10, 14, 15, 16][rng.below(6) as usize];
    let at = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default();
    NewWorkItem {
        work_type,
        priority,
        location: location(rng),
        scheduled_date: day.and_time(at),
        estimated_duration: None,
        technician_id: None,
        incident_id: None,
        notes: None,
    }
}
