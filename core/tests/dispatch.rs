//! Proposals and commits: candidate selection, tie-breaks, confidence,
//! notifications and optimistic concurrency.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use dispatch_core::{
    clock::ManualClock,
    config::{DispatchConfig, ScoringConfig},
    desk::OperationsDesk,
    dispatch::{confidence, ScheduleOptions},
    error::DispatchError,
    event::{source, DispatchEvent},
    notifier::{Notification, RecordingNotifier},
    rng::RandomIds,
    store::OpsStore,
    technician::Technician,
    types::{Location, Priority, Skill, TechnicianStatus, WorkItemStatus, WorkItemType},
    work_item::NewWorkItem,
};
use std::sync::Arc;

fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, day).unwrap().and_hms_opt(h, m, 0).unwrap()
}

struct Fixture {
    desk: OperationsDesk,
    notifier: Arc<RecordingNotifier>,
}

fn build_with(config: DispatchConfig, notifier: RecordingNotifier, technicians: &[Technician]) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = OpsStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    let notifier = Arc::new(notifier);
    let desk = OperationsDesk::with_manual_clock(
        Arc::new(store),
        &config,
        Arc::new(ManualClock::new(at(19, 7, 0))),
        notifier.clone(),
        Arc::new(RandomIds),
    );
    for t in technicians {
        desk.upsert_technician(t).expect("roster sync");
    }
    Fixture { desk, notifier }
}

fn build(technicians: &[Technician]) -> Fixture {
    build_with(DispatchConfig::default(), RecordingNotifier::new(), technicians)
}

fn fitter(id: &str) -> Technician {
    Technician::new(id, format!("Fitter {id}")).with_skills(&[Skill::Mechanical, Skill::Plumbing])
}

fn electrician(id: &str) -> Technician {
    Technician::new(id, format!("Electrician {id}")).with_skills(&[Skill::Electrical])
}

fn maintenance(when: NaiveDateTime) -> NewWorkItem {
    NewWorkItem {
        work_type: WorkItemType::Maintenance,
        priority: Priority::Medium,
        location: Location::new("22 allées Jean Jaurès"),
        scheduled_date: when,
        estimated_duration: None,
        technician_id: None,
        incident_id: None,
        notes: None,
    }
}

#[test]
fn best_skilled_technician_wins_the_next_window() {
    let f = build(&[electrician("tech-a"), fitter("tech-b")]);
    let item = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("create");

    let proposal = f.desk.schedule_work_item(&item.work_item_id, &ScheduleOptions::default()).expect("propose");
    assert_eq!(proposal.technician_id, "tech-b");
    assert_eq!(proposal.scheduled_date, at(19, 8, 0));
    assert_eq!(proposal.estimated_duration, 120);
    assert_eq!(proposal.skill_match, 1.0);
    assert!(!proposal.degraded);
    assert!(proposal.confidence >= 0.9, "same-day proposal for a free expert, got {}", proposal.confidence);
}

#[test]
fn proposals_do_not_write() {
    let f = build(&[fitter("tech-a")]);
    let item = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("create");
    let before = f.desk.store().event_count().expect("count");

    f.desk.schedule_work_item(&item.work_item_id, &ScheduleOptions::default()).expect("propose");

    assert_eq!(f.desk.store().event_count().expect("count"), before);
    assert_eq!(f.desk.work_item(&item.work_item_id).unwrap(), item);
    assert!(f.notifier.sent().is_empty());
}

#[test]
fn equal_scores_go_to_the_lowest_technician_id() {
    // Inserted in reverse order on purpose.
    let f = build(&[fitter("tech-c"), fitter("tech-b"), fitter("tech-a")]);
    let item = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("create");
    let proposal = f.desk.schedule_work_item(&item.work_item_id, &ScheduleOptions::default()).expect("propose");
    assert_eq!(proposal.technician_id, "tech-a");
}

#[test]
fn first_candidate_wins_when_nobody_scores() {
    let config = DispatchConfig {
        scoring: ScoringConfig {
            skill_weight: 0.0,
            availability_weight: 0.0,
            proximity_weight: 0.0,
            workload_weight: 0.0,
            ..ScoringConfig::default()
        },
        ..DispatchConfig::default()
    };
    let f = build_with(config, RecordingNotifier::new(), &[fitter("tech-b"), electrician("tech-a")]);
    let item = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("create");
    let proposal = f.desk.schedule_work_item(&item.work_item_id, &ScheduleOptions::default()).expect("propose");
    assert_eq!(proposal.technician_id, "tech-a");
}

#[test]
fn nearby_technician_wins_on_travel() {
    let f = build(&[fitter("tech-a").at(43.95, 1.44), fitter("tech-b").at(43.601, 1.441)]);
    let mut new = maintenance(at(19, 8, 0));
    new.location = Location::new("Capitole").with_coords(43.6045, 1.4440);
    let item = f.desk.create_work_item(new).expect("create");

    let with_travel = f.desk.schedule_work_item(&item.work_item_id, &ScheduleOptions::default()).expect("propose");
    assert_eq!(with_travel.technician_id, "tech-b");

    let no_travel = ScheduleOptions { consider_travel: false, ..ScheduleOptions::default() };
    let without = f.desk.schedule_work_item(&item.work_item_id, &no_travel).expect("propose");
    assert_eq!(without.technician_id, "tech-a", "without travel the tie goes to the lowest id");
}

#[test]
fn busy_technicians_are_candidates_unless_emergency_only() {
    let f = build(&[fitter("tech-a").with_status(TechnicianStatus::Busy), electrician("tech-b")]);
    let item = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("create");

    let regular = f.desk.schedule_work_item(&item.work_item_id, &ScheduleOptions::default()).expect("propose");
    assert_eq!(regular.technician_id, "tech-a", "skills outweigh availability here");

    let emergency = f.desk.schedule_work_item(&item.work_item_id, &ScheduleOptions::emergency()).expect("propose");
    assert_eq!(emergency.technician_id, "tech-b");
}

#[test]
fn no_dispatchable_technician_means_no_candidates() {
    let f = build(&[
        fitter("tech-a").with_status(TechnicianStatus::OffDuty),
        fitter("tech-b").with_status(TechnicianStatus::Vacation),
    ]);
    let item = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("create");
    let err = f.desk.schedule_work_item(&item.work_item_id, &ScheduleOptions::default()).unwrap_err();
    assert!(matches!(err, DispatchError::NoCandidates), "got {err:?}");
}

#[test]
fn unknown_work_item_is_not_found() {
    let f = build(&[fitter("tech-a")]);
    let err = f.desk.schedule_work_item("nope", &ScheduleOptions::default()).unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
}

#[test]
fn urgent_work_is_shorter_and_starts_now() {
    let f = build(&[fitter("tech-a")]);
    let mut new = maintenance(at(19, 7, 0));
    new.work_type = WorkItemType::Repair;
    new.priority = Priority::Urgent;
    let item = f.desk.create_work_item(new).expect("create");

    let proposal = f.desk.schedule_work_item(&item.work_item_id, &ScheduleOptions::default()).expect("propose");
    assert_eq!(proposal.estimated_duration, 144);
    assert_eq!(proposal.scheduled_date, at(19, 7, 0));
}

#[test]
fn confidence_adds_up_its_bonuses() {
    let cfg = DispatchConfig::default().confidence;
    let close = |a: f64, b: f64| (a - b).abs() < 1e-9;

    assert!(close(confidence(&cfg, 0.5, TechnicianStatus::Busy, Duration::hours(48)), 0.65));
    assert!(close(confidence(&cfg, 0.5, TechnicianStatus::Busy, Duration::hours(10)), 0.75));
    assert!(close(confidence(&cfg, 0.0, TechnicianStatus::Available, Duration::hours(30)), 0.7));
    assert!(close(confidence(&cfg, 1.0, TechnicianStatus::Available, Duration::hours(2)), 1.0), "capped at 1.0");
}

#[test]
fn schedule_and_assign_commits_and_notifies() {
    let f = build(&[fitter("tech-a")]);
    let item = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("create");

    let (proposal, committed) = f.desk.schedule_and_assign(&item.work_item_id, &ScheduleOptions::default()).expect("commit");
    assert_eq!(committed.status, WorkItemStatus::Assigned);
    assert_eq!(committed.technician_id.as_deref(), Some("tech-a"));
    assert_eq!(committed.scheduled_date, proposal.scheduled_date);
    assert_eq!(committed.version, item.version + 1);

    assert_eq!(
        f.notifier.sent(),
        vec![Notification::Assigned { work_item_id: item.work_item_id.clone(), technician_id: Some("tech-a".into()) }]
    );

    let last = f.desk.store().events().expect("events").pop().expect("event");
    assert_eq!(last.source, source::API);
    match last.decode().expect("decode") {
        DispatchEvent::TechnicianAssigned { confidence, technician_id, .. } => {
            assert_eq!(technician_id, "tech-a");
            assert_eq!(confidence, Some(proposal.confidence));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn moving_work_to_another_technician_notifies_a_reassignment() {
    let f = build(&[fitter("tech-a"), electrician("tech-b")]);
    let mut new = maintenance(at(19, 8, 0));
    new.technician_id = Some("tech-b".into());
    let item = f.desk.create_work_item(new).expect("create");

    let (proposal, committed) = f.desk.schedule_and_assign(&item.work_item_id, &ScheduleOptions::default()).expect("commit");
    assert_eq!(proposal.technician_id, "tech-a");
    assert_eq!(committed.technician_id.as_deref(), Some("tech-a"));

    let sent = f.notifier.sent();
    assert_eq!(
        sent.last(),
        Some(&Notification::Reassigned { work_item_id: item.work_item_id.clone(), technician_id: "tech-a".into() })
    );
    let last = f.desk.store().events().expect("events").pop().expect("event");
    assert_eq!(last.event_type, "work_item_rescheduled");
}

#[test]
fn stale_proposal_is_rejected() {
    let f = build(&[fitter("tech-a"), fitter("tech-b")]);
    let item = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("create");
    let proposal = f.desk.schedule_work_item(&item.work_item_id, &ScheduleOptions::default()).expect("propose");

    f.desk.assign_technician(&item.work_item_id, "tech-b").expect("manual override");

    let err = f.desk.dispatch().commit(&proposal, source::API).unwrap_err();
    assert!(err.is_conflict(), "got {err:?}");
    let stored = f.desk.work_item(&item.work_item_id).unwrap();
    assert_eq!(stored.technician_id.as_deref(), Some("tech-b"), "the manual assignment stands");
}

#[test]
fn failed_notification_does_not_roll_back() {
    let f = build_with(DispatchConfig::default(), RecordingNotifier::failing(), &[fitter("tech-a")]);
    let item = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("create");

    let (_, committed) = f
        .desk
        .schedule_and_assign(&item.work_item_id, &ScheduleOptions::default())
        .expect("commit succeeds even though delivery fails");
    assert_eq!(committed.status, WorkItemStatus::Assigned);
    assert_eq!(f.desk.work_item(&item.work_item_id).unwrap().technician_id.as_deref(), Some("tech-a"));
    assert!(f.notifier.sent().is_empty());
}

#[test]
fn second_item_takes_the_next_free_window() {
    let f = build(&[fitter("tech-a")]);
    let first = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("first");
    let second = f.desk.create_work_item(maintenance(at(19, 8, 0))).expect("second");

    let (_, a) = f.desk.schedule_and_assign(&first.work_item_id, &ScheduleOptions::default()).expect("first");
    let (_, b) = f.desk.schedule_and_assign(&second.work_item_id, &ScheduleOptions::default()).expect("second");
    assert_eq!(a.scheduled_date, at(19, 8, 0));
    assert_eq!(b.scheduled_date, at(19, 14, 0));
}
