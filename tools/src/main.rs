//! dispatch-runner: headless operator console for the dispatch desk.
//!
//! Usage:
//!   dispatch-runner --seed 12345 --days 5 --technicians 8 --db run.db
//!   dispatch-runner --config dispatch.json --ipc-mode
//!
//! Batch mode simulates `--days` days in 10-minute steps on a manual clock:
//! seeded incidents and planned work arrive during working hours, crews
//! start and finish what they were given, and the periodic passes run off
//! the same clock. IPC mode reads one JSON `DispatchCommand` per stdin line
//! and answers each with one JSON line.

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use dispatch_core::{
    clock::ManualClock,
    command::DispatchCommand,
    config::DispatchConfig,
    desk::OperationsDesk,
    dispatch::ScheduleOptions,
    error::DispatchError,
    notifier::LogNotifier,
    rng::{SeedBank, SeededIds, Stream, StreamRng},
    store::{OpsStore, WorkStore},
    types::WorkItemStatus,
    workload,
};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

const STEP_MINUTES: i64 = 10;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let days = parse_arg(&args, "--days", 5i64);
    let technicians = parse_arg(&args, "--technicians", 8usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let config = match string_arg(&args, "--config") {
        Some(path) => DispatchConfig::load(path)?,
        None => DispatchConfig::default(),
    };

    if !ipc_mode {
        println!("dispatch-runner");
        println!("  seed:         {seed}");
        println!("  days:         {days}");
        println!("  technicians:  {technicians}");
        println!("  db:           {db}");
        println!();
    }

    let store = if db == ":memory:" { OpsStore::in_memory()? } else { OpsStore::open(db)? };
    store.migrate().context("applying migrations")?;
    let store: Arc<dyn WorkStore> = Arc::new(store);

    let bank = SeedBank::new(seed);
    let clock = Arc::new(ManualClock::new(start_of_run()?));
    let desk = OperationsDesk::with_manual_clock(
        store.clone(),
        &config,
        clock.clone(),
        Arc::new(LogNotifier),
        Arc::new(SeededIds::new(&bank)),
    );

    for technician in workload::roster(&mut bank.stream(Stream::Roster), technicians) {
        desk.upsert_technician(&technician)?;
    }

    if ipc_mode {
        run_ipc_loop(&desk)
    } else {
        let mut rng = bank.stream(Stream::Workload);
        for _ in 0..(days * 24 * 60 / STEP_MINUTES) {
            clock.advance_minutes(STEP_MINUTES);
            step(&desk, &mut rng)?;
        }
        print_summary(&desk, days)
    }
}

/// 06:00 on a fixed Monday, so runs with the same seed line up exactly.
fn start_of_run() -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(2026, 10, 19)
        .and_then(|d| d.and_hms_opt(6, 0, 0))
        .context("invalid run start")
}

/// One simulated step: new work, crew progress, periodic passes.
fn step(desk: &OperationsDesk, rng: &mut StreamRng) -> Result<()> {
    let now = desk.now();
    let weekday = !matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
    let office_hours = weekday && (8..18).contains(&now.hour());

    if office_hours && rng.chance(0.04) {
        let report = workload::incident_report(rng);
        let created = desk.create_incident(report)?;
        if created.emergency.is_none() && rng.chance(0.5) {
            let item = desk.create_work_item_from_incident(&created.incident.incident_id)?;
            swallow(desk.schedule_and_assign(&item.work_item_id, &ScheduleOptions::default()).map(|_| ()));
        }
    }
    if office_hours && rng.chance(0.08) {
        let item = desk.create_work_item(workload::planned_work(rng, now))?;
        swallow(desk.schedule_and_assign(&item.work_item_id, &ScheduleOptions::default()).map(|_| ()));
    }

    progress_crews(desk, now)?;
    desk.tick();
    Ok(())
}

/// Start what is due and finish what has run its estimate.
fn progress_crews(desk: &OperationsDesk, now: NaiveDateTime) -> Result<()> {
    for technician in desk.store().list_technicians()? {
        let booked = desk.store().find_active(&technician.technician_id, None)?;
        let busy = booked.iter().any(|w| w.status == WorkItemStatus::InProgress);
        for item in &booked {
            match item.status {
                WorkItemStatus::InProgress => {
                    let started = item.started_at.unwrap_or(item.scheduled_date);
                    if started + Duration::minutes(item.estimated_duration) <= now {
                        swallow(desk.complete_work_item(&item.work_item_id).map(|_| ()));
                    }
                }
                WorkItemStatus::Assigned if !busy && item.scheduled_date <= now => {
                    swallow(desk.start_work_item(&item.work_item_id).map(|_| ()));
                    break;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Conflicts are part of a live desk; anything else is worth a warning.
fn swallow(result: Result<(), DispatchError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_conflict() => log::debug!("skipped: {e}"),
        Err(e) => log::warn!("operation failed: {e}"),
    }
}

fn run_ipc_loop(desk: &OperationsDesk) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<DispatchCommand>(&buffer) {
            Ok(cmd) => match desk.execute(cmd) {
                Ok(reply) => serde_json::json!({ "ok": reply }),
                Err(e) => serde_json::json!({ "error": { "kind": error_kind(&e), "message": e.to_string() } }),
            },
            Err(e) => serde_json::json!({ "error": { "kind": "bad_request", "message": e.to_string() } }),
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn error_kind(e: &DispatchError) -> &'static str {
    match e {
        DispatchError::NotFound { .. } => "not_found",
        DispatchError::Conflict { .. } => "conflict",
        DispatchError::NoCandidates => "no_candidates",
        DispatchError::InvalidValue(_) => "invalid_value",
        DispatchError::Database(_)
        | DispatchError::Serialization(_)
        | DispatchError::StorePoisoned
        | DispatchError::Other(_) => "internal",
    }
}

fn print_summary(desk: &OperationsDesk, days: i64) -> Result<()> {
    let events = desk.store().events()?;
    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for e in &events {
        *by_type.entry(e.event_type.as_str()).or_default() += 1;
    }

    println!("=== RUN SUMMARY ===");
    println!("  days simulated: {days}");
    println!("  final time:     {}", desk.now());
    println!("  events logged:  {}", events.len());
    println!();
    println!("=== EVENTS BY TYPE ===");
    for (event_type, count) in &by_type {
        println!("  {event_type:<28} {count}");
    }
    println!();
    println!("=== ROSTER ===");
    for t in desk.store().list_technicians()? {
        let open = desk.store().find_active(&t.technician_id, None)?.len();
        println!("  {} {:<20} {:<10} open={open}", t.technician_id, t.name, t.status.as_str());
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
