//! Periodic passes: overdue sweep, nightly re-optimization, and the
//! scheduler's single-run guarantee.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use dispatch_core::{
    clock::ManualClock,
    config::DispatchConfig,
    desk::OperationsDesk,
    event::source,
    notifier::{Notification, RecordingNotifier},
    rng::RandomIds,
    error::{DispatchError, DispatchResult},
    optimizer::PassReport,
    scheduler::{Cadence, PassScheduler, PeriodicPass, Ticker},
    store::OpsStore,
    technician::Technician,
    types::{Location, Priority, Skill, TechnicianStatus, WorkItemStatus, WorkItemType},
    work_item::NewWorkItem,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, day).unwrap().and_hms_opt(h, m, 0).unwrap()
}

struct Fixture {
    desk: OperationsDesk,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
}

fn build(now: NaiveDateTime, technicians: &[Technician]) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = OpsStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    let clock = Arc::new(ManualClock::new(now));
    let notifier = Arc::new(RecordingNotifier::new());
    let desk = OperationsDesk::with_manual_clock(
        Arc::new(store),
        &DispatchConfig::default(),
        clock.clone(),
        notifier.clone(),
        Arc::new(RandomIds),
    );
    for t in technicians {
        desk.upsert_technician(t).expect("roster sync");
    }
    Fixture { desk, clock, notifier }
}

fn fitter(id: &str) -> Technician {
    Technician::new(id, format!("Fitter {id}")).with_skills(&[Skill::Mechanical, Skill::Plumbing])
}

fn job(work_type: WorkItemType, when: NaiveDateTime) -> NewWorkItem {
    NewWorkItem {
        work_type,
        priority: Priority::Medium,
        location: Location::new("18 rue de Metz"),
        scheduled_date: when,
        estimated_duration: None,
        technician_id: None,
        incident_id: None,
        notes: None,
    }
}

// ── Overdue sweep ────────────────────────────────────────────────────────────

#[test]
fn overdue_item_is_notified_and_moved_when_confident() {
    let f = build(at(19, 7, 0), &[fitter("tech-a")]);
    let item = f.desk.create_work_item(job(WorkItemType::Maintenance, at(19, 8, 0))).expect("create");

    f.clock.set(at(19, 10, 0));
    let report = f.desk.optimizer().overdue_sweep().expect("sweep");
    assert_eq!(report.examined, 1);
    assert_eq!(report.committed, 1);

    let moved = f.desk.work_item(&item.work_item_id).unwrap();
    assert_eq!(moved.status, WorkItemStatus::Assigned);
    assert_eq!(moved.technician_id.as_deref(), Some("tech-a"));
    assert_eq!(moved.scheduled_date, at(19, 14, 0));

    assert!(f.notifier.sent().contains(&Notification::Overdue { work_item_id: item.work_item_id.clone() }));
    let last = f.desk.store().events().expect("events").pop().expect("event");
    assert_eq!(last.source, source::OVERDUE_SWEEP);
}

#[test]
fn overdue_proposal_at_or_below_threshold_is_left_alone() {
    // Busy, no matching skill, four hours out: confidence 0.6.
    let f = build(
        at(19, 7, 0),
        &[Technician::new("tech-a", "Reader").with_skills(&[Skill::Electronics]).with_status(TechnicianStatus::Busy)],
    );
    let item = f.desk.create_work_item(job(WorkItemType::Maintenance, at(19, 8, 0))).expect("create");

    f.clock.set(at(19, 10, 0));
    let report = f.desk.optimizer().overdue_sweep().expect("sweep");
    assert_eq!(report.below_threshold, 1);
    assert_eq!(report.committed, 0);
    assert_eq!(f.desk.work_item(&item.work_item_id).unwrap(), item, "item untouched");
    assert!(f.notifier.sent().contains(&Notification::Overdue { work_item_id: item.work_item_id.clone() }));
}

#[test]
fn started_and_finished_work_is_never_overdue() {
    let f = build(at(19, 7, 0), &[fitter("tech-a")]);
    let mut new = job(WorkItemType::Maintenance, at(19, 7, 0));
    new.technician_id = Some("tech-a".into());
    let item = f.desk.create_work_item(new).expect("create");
    f.desk.start_work_item(&item.work_item_id).expect("start");

    f.clock.set(at(19, 12, 0));
    let report = f.desk.optimizer().overdue_sweep().expect("sweep");
    assert_eq!(report.examined, 0);
}

// ── Nightly re-optimization ──────────────────────────────────────────────────

#[test]
fn nightly_places_tomorrows_work_and_a_rerun_changes_nothing() {
    let f = build(at(19, 21, 0), &[fitter("tech-a"), Technician::new("tech-b", "Sparky").with_skills(&[Skill::Electrical])]);
    let first = f.desk.create_work_item(job(WorkItemType::Maintenance, at(20, 8, 0))).expect("first");
    let second = f.desk.create_work_item(job(WorkItemType::Maintenance, at(20, 8, 0))).expect("second");

    f.clock.set(at(19, 22, 0));
    let report = f.desk.optimizer().nightly_reoptimize().expect("nightly");
    assert_eq!(report.target, "2026-10-20");
    assert_eq!(report.examined, 2);
    assert_eq!(report.committed, 2);

    let mut starts: Vec<NaiveDateTime> = [&first, &second]
        .iter()
        .map(|w| f.desk.work_item(&w.work_item_id).unwrap())
        .inspect(|w| assert_eq!(w.technician_id.as_deref(), Some("tech-a")))
        .map(|w| w.scheduled_date)
        .collect();
    starts.sort();
    assert_eq!(starts, vec![at(20, 8, 0), at(20, 14, 0)]);

    let before = f.desk.store().event_count().expect("count");
    let rerun = f.desk.optimizer().nightly_reoptimize().expect("rerun");
    assert_eq!(rerun.committed, 0);
    assert_eq!(rerun.unchanged, 2);
    assert_eq!(f.desk.store().event_count().expect("count"), before, "an immediate rerun writes nothing");
}

#[test]
fn nightly_requires_high_confidence() {
    // Busy technician, half the skills, tomorrow: confidence 0.75.
    let f = build(
        at(19, 22, 0),
        &[Technician::new("tech-a", "Mech").with_skills(&[Skill::Mechanical]).with_status(TechnicianStatus::Busy)],
    );
    let item = f.desk.create_work_item(job(WorkItemType::Repair, at(20, 8, 0))).expect("create");

    let report = f.desk.optimizer().nightly_reoptimize().expect("nightly");
    assert_eq!(report.below_threshold, 1);
    assert_eq!(report.committed, 0);
    assert_eq!(f.desk.work_item(&item.work_item_id).unwrap().status, WorkItemStatus::Planned);
}

#[test]
fn nightly_skips_weekend_targets() {
    // Friday night re-plans Saturday: nothing to do.
    let f = build(at(23, 22, 0), &[fitter("tech-a")]);
    f.desk.create_work_item(job(WorkItemType::Maintenance, at(24, 9, 0))).expect("create");

    let report = f.desk.optimizer().nightly_reoptimize().expect("nightly");
    assert!(report.skipped_weekend);
    assert_eq!(report.examined, 0);
}

// ── Scheduler ────────────────────────────────────────────────────────────────

#[test]
fn cadence_keys() {
    let every = Cadence::Every { minutes: 10 };
    assert_eq!(every.trigger_key(at(19, 21, 50)), Some("2026-10-19T21:50:00".into()));
    assert_eq!(every.trigger_key(at(19, 21, 59)), Some("2026-10-19T21:50:00".into()));
    assert_eq!(every.trigger_key(at(19, 22, 0)), Some("2026-10-19T22:00:00".into()));

    let nightly = Cadence::DailyAt(NaiveTime::from_hms_opt(22, 0, 0).unwrap());
    assert_eq!(nightly.trigger_key(at(19, 21, 59)), None);
    assert_eq!(nightly.trigger_key(at(19, 22, 0)), Some("2026-10-19".into()));
    assert_eq!(nightly.trigger_key(at(19, 23, 30)), Some("2026-10-19".into()));
}

#[test]
fn each_pass_runs_once_per_key() {
    let f = build(at(19, 21, 50), &[fitter("tech-a")]);

    let names = |reports: &[dispatch_core::optimizer::PassReport]| -> Vec<String> {
        reports.iter().map(|r| r.pass.clone()).collect()
    };

    assert_eq!(names(&f.desk.tick()), vec![source::OVERDUE_SWEEP]);
    assert!(f.desk.tick().is_empty(), "same bucket, same day: nothing is due");

    f.clock.set(at(19, 22, 0));
    assert_eq!(names(&f.desk.tick()), vec![source::OVERDUE_SWEEP, source::NIGHTLY]);

    f.clock.set(at(19, 22, 5));
    assert!(f.desk.tick().is_empty(), "second trigger for a claimed key is a no-op");

    f.clock.set(at(19, 22, 10));
    assert_eq!(names(&f.desk.tick()), vec![source::OVERDUE_SWEEP]);
}

#[test]
fn concurrent_ticks_never_double_run() {
    let f = build(at(19, 22, 0), &[fitter("tech-a")]);
    let desk = &f.desk;

    let runs: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|_| s.spawn(|| desk.tick().len())).collect();
        handles.into_iter().map(|h| h.join().expect("tick thread")).sum()
    });
    assert_eq!(runs, 2, "one overdue sweep and one nightly pass in total");
}

#[test]
fn background_ticker_runs_due_passes_until_stopped() {
    let f = build(at(19, 7, 0), &[fitter("tech-a")]);
    f.desk.create_work_item(job(WorkItemType::Maintenance, at(19, 8, 0))).expect("create");
    f.clock.set(at(19, 10, 0));

    let before = f.desk.store().event_count().expect("count");
    let ticker = Ticker::spawn(f.desk.scheduler().clone(), Duration::from_millis(5));
    let deadline = Instant::now() + Duration::from_secs(5);
    while f.desk.store().event_count().expect("count") == before && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    ticker.stop();

    assert!(f.desk.store().event_count().expect("count") > before, "the overdue sweep moved the item");
    assert!(f.desk.tick().is_empty(), "the ticker already claimed this bucket");
}

/// Fails its first run, then succeeds.
struct FlakyPass {
    runs: AtomicUsize,
}

impl PeriodicPass for FlakyPass {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Every { minutes: 10 }
    }

    fn run(&self, _now: NaiveDateTime) -> DispatchResult<PassReport> {
        if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(DispatchError::conflict("store briefly unavailable"));
        }
        Ok(PassReport { pass: "flaky".into(), target: "retried".into(), ..PassReport::default() })
    }
}

#[test]
fn failed_pass_is_retried_on_the_next_tick() {
    let store = OpsStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    let clock = Arc::new(ManualClock::new(at(19, 22, 0)));
    let mut scheduler = PassScheduler::new(Arc::new(store), clock.clone());
    scheduler.register(Box::new(FlakyPass { runs: AtomicUsize::new(0) }));

    let failed = scheduler.tick();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].errors, 1);

    // Same bucket: the failed key was released, so it runs again.
    clock.set(at(19, 22, 5));
    let retried = scheduler.tick();
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].errors, 0);

    assert!(scheduler.tick().is_empty(), "a successful run keeps its claim");
}
