//! Incident classifier rules: critical keywords, then high keywords,
//! then the incident-type table. First match wins.

use dispatch_core::{
    classifier::{type_priority, IncidentClassifier, MatchedRule},
    types::{IncidentPriority, IncidentType},
};

fn classify(title: &str, description: &str, incident_type: IncidentType) -> (IncidentPriority, MatchedRule) {
    let c = IncidentClassifier::new().classify(title, description, incident_type);
    (c.priority, c.rule)
}

#[test]
fn french_major_leak_is_critical() {
    let (priority, rule) = classify("Fuite majeure avenue X", "", IncidentType::Leak);
    assert_eq!(priority, IncidentPriority::Critical);
    assert!(
        matches!(rule, MatchedRule::CriticalKeyword(_)),
        "expected a critical keyword match, got {rule:?}"
    );
}

#[test]
fn critical_keywords_are_checked_before_high_ones() {
    // "leak" alone is a high keyword; "major leak" must win.
    let (priority, rule) = classify("Major leak on main road", "", IncidentType::Other);
    assert_eq!(priority, IncidentPriority::Critical);
    assert_eq!(rule, MatchedRule::CriticalKeyword("major leak".into()));
}

#[test]
fn matching_ignores_case_and_reads_the_description() {
    let (priority, _) = classify("Noise in basement", "possible EXPLOSION risk", IncidentType::Other);
    assert_eq!(priority, IncidentPriority::Critical);

    let (priority, rule) = classify("Quartier sans eau", "Panne de la station", IncidentType::QualityIssue);
    assert_eq!(priority, IncidentPriority::High);
    assert_eq!(rule, MatchedRule::HighKeyword("panne".into()));
}

#[test]
fn keyword_beats_the_type_table() {
    // An equipment failure report whose text says "breakdown" is high, not medium.
    let (priority, _) = classify("Valve breakdown", "", IncidentType::EquipmentFailure);
    assert_eq!(priority, IncidentPriority::High);
}

#[test]
fn type_table_applies_without_keywords() {
    let cases = [
        (IncidentType::Emergency, IncidentPriority::Critical),
        (IncidentType::Leak, IncidentPriority::High),
        (IncidentType::PowerOutage, IncidentPriority::High),
        (IncidentType::EquipmentFailure, IncidentPriority::Medium),
        (IncidentType::QualityIssue, IncidentPriority::Low),
        (IncidentType::Other, IncidentPriority::Low),
    ];
    for (incident_type, expected) in cases {
        let (priority, rule) = classify("Routine report", "nothing remarkable", incident_type);
        assert_eq!(priority, expected, "type {incident_type}");
        assert_eq!(rule, MatchedRule::TypeDefault);
        assert_eq!(type_priority(incident_type), expected);
    }
}

#[test]
fn only_critical_results_ask_for_emergency_handling() {
    let c = IncidentClassifier::new();
    assert!(c.classify("Rupture de canalisation", "", IncidentType::Leak).is_critical());
    assert!(!c.classify("Small leak", "", IncidentType::Leak).is_critical());
}
