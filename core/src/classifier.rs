//! Incident classifier: turns a raw report into a priority.
//!
//! Rules, evaluated in order, first match wins:
//!   1. any critical keyword in title or description  → critical
//!   2. any high-priority keyword                      → high
//!   3. incident type lookup
//!
//! Matching is a case-insensitive substring search. Field reports come in
//! French and English, so both keyword sets carry both languages.

use crate::types::{IncidentPriority, IncidentType};
use serde::{Deserialize, Serialize};

const CRITICAL_KEYWORDS: &[&str] = &[
    "major leak",
    "fuite majeure",
    "majeure",
    "rupture",
    "explosion",
    "emergency",
    "urgence",
    "danger",
    "inondation",
    "flood",
    "contamination",
];

const HIGH_KEYWORDS: &[&str] = &[
    "leak",
    "fuite",
    "failure",
    "défaillance",
    "outage",
    "coupure",
    "breakdown",
    "panne",
];

/// Which rule produced the priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "keyword", rename_all = "snake_case")]
pub enum MatchedRule {
    CriticalKeyword(String),
    HighKeyword(String),
    TypeDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub priority: IncidentPriority,
    pub rule: MatchedRule,
}

impl Classification {
    /// Critical incidents require an urgent notification and emergency dispatch.
    pub fn is_critical(&self) -> bool {
        self.priority == IncidentPriority::Critical
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IncidentClassifier;

impl IncidentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, title: &str, description: &str, incident_type: IncidentType) -> Classification {
        let text = format!("{title}\n{description}").to_lowercase();

        if let Some(k) = first_match(&text, CRITICAL_KEYWORDS) {
            return Classification {
                priority: IncidentPriority::Critical,
                rule: MatchedRule::CriticalKeyword(k.to_string()),
            };
        }
        if let Some(k) = first_match(&text, HIGH_KEYWORDS) {
            return Classification {
                priority: IncidentPriority::High,
                rule: MatchedRule::HighKeyword(k.to_string()),
            };
        }
        Classification { priority: type_priority(incident_type), rule: MatchedRule::TypeDefault }
    }
}

fn first_match<'k>(text: &str, keywords: &[&'k str]) -> Option<&'k str> {
    keywords.iter().copied().find(|k| text.contains(k))
}

pub fn type_priority(incident_type: IncidentType) -> IncidentPriority {
    match incident_type {
        IncidentType::Emergency => IncidentPriority::Critical,
        IncidentType::Leak | IncidentType::PowerOutage => IncidentPriority::High,
        IncidentType::EquipmentFailure => IncidentPriority::Medium,
        IncidentType::QualityIssue | IncidentType::Other => IncidentPriority::Low,
    }
}
