//! Slot search over working windows, weekends and existing bookings.
//!
//! 2026-10-19 is a Monday; 2026-10-24 is a Saturday.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use dispatch_core::{
    config::{SlotConfig, WorkingWindow},
    slot_finder::{SlotFinder, SlotRequest},
    types::{Location, Minutes, Priority, WorkItemStatus, WorkItemType},
    work_item::WorkItem,
};

fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, day).unwrap().and_hms_opt(h, m, 0).unwrap()
}

fn booking(id: &str, start: NaiveDateTime, minutes: Minutes, status: WorkItemStatus) -> WorkItem {
    WorkItem {
        work_item_id: id.into(),
        reference: format!("WI-{id}"),
        work_type: WorkItemType::Maintenance,
        priority: Priority::Medium,
        status,
        location: Location::new("1 rue du Test"),
        scheduled_date: start,
        started_at: None,
        completed_at: None,
        estimated_duration: minutes,
        actual_duration: None,
        technician_id: Some("tech-a".into()),
        incident_id: None,
        notes: None,
        version: 1,
        created_at: start,
        updated_at: start,
    }
}

fn request(priority: Priority, duration: Minutes, now: NaiveDateTime) -> SlotRequest<'static> {
    SlotRequest { priority, duration, exclude: None, now, windows: None }
}

fn finder() -> SlotFinder {
    SlotFinder::new(SlotConfig::default())
}

#[test]
fn free_calendar_gets_the_next_window_start() {
    let slot = finder().find_slot(request(Priority::Medium, 120, at(19, 7, 0)), &[]);
    assert_eq!(slot.start, at(19, 8, 0));
    assert!(!slot.degraded);
}

#[test]
fn window_starting_exactly_now_is_eligible() {
    let slot = finder().find_slot(request(Priority::Medium, 120, at(19, 8, 0)), &[]);
    assert_eq!(slot.start, at(19, 8, 0));
}

#[test]
fn window_already_begun_is_skipped() {
    let slot = finder().find_slot(request(Priority::Medium, 120, at(19, 9, 0)), &[]);
    assert_eq!(slot.start, at(19, 14, 0), "08:00 is in the past, the afternoon window is next");
}

#[test]
fn friday_evening_rolls_over_the_weekend() {
    let slot = finder().find_slot(request(Priority::High, 120, at(23, 19, 0)), &[]);
    assert_eq!(slot.start, at(26, 8, 0));

    let slot = finder().find_slot(request(Priority::Low, 120, at(24, 10, 0)), &[]);
    assert_eq!(slot.start, at(26, 8, 0), "saturday requests land on monday");
}

#[test]
fn overlapping_booking_blocks_a_window() {
    let bookings = [booking("b1", at(19, 7, 0), 90, WorkItemStatus::Assigned)];
    let slot = finder().find_slot(request(Priority::Medium, 120, at(19, 6, 0)), &bookings);
    assert_eq!(slot.start, at(19, 14, 0));

    // A booking that spills into the afternoon blocks 14:00 as well.
    let bookings = [
        booking("b1", at(19, 8, 0), 60, WorkItemStatus::Assigned),
        booking("b2", at(19, 13, 0), 90, WorkItemStatus::InProgress),
    ];
    let slot = finder().find_slot(request(Priority::Medium, 120, at(19, 6, 0)), &bookings);
    assert_eq!(slot.start, at(20, 8, 0));
}

#[test]
fn intervals_are_half_open() {
    // Ends exactly when the afternoon window opens.
    let bookings = [
        booking("b1", at(19, 6, 0), 180, WorkItemStatus::Assigned),
        booking("b2", at(19, 12, 0), 120, WorkItemStatus::Assigned),
    ];
    let slot = finder().find_slot(request(Priority::Medium, 120, at(19, 6, 0)), &bookings);
    assert_eq!(slot.start, at(19, 14, 0));
}

#[test]
fn inactive_bookings_do_not_block() {
    let bookings = [
        booking("done", at(19, 8, 0), 120, WorkItemStatus::Completed),
        booking("gone", at(19, 8, 0), 120, WorkItemStatus::Cancelled),
        booking("later", at(19, 8, 0), 120, WorkItemStatus::Postponed),
    ];
    let slot = finder().find_slot(request(Priority::Medium, 120, at(19, 7, 0)), &bookings);
    assert_eq!(slot.start, at(19, 8, 0));
}

#[test]
fn the_item_being_rescheduled_does_not_block_itself() {
    let bookings = [booking("self", at(19, 8, 0), 120, WorkItemStatus::Assigned)];
    let req = SlotRequest { exclude: Some("self"), ..request(Priority::Medium, 120, at(19, 7, 0)) };
    let slot = finder().find_slot(req, &bookings);
    assert_eq!(slot.start, at(19, 8, 0));
}

#[test]
fn urgent_work_starts_now_regardless_of_bookings() {
    let now = at(24, 23, 17);
    let bookings = [booking("b1", at(24, 23, 0), 240, WorkItemStatus::InProgress)];
    let slot = finder().find_slot(request(Priority::Urgent, 72, now), &bookings);
    assert_eq!(slot.start, now);
    assert!(!slot.degraded);
}

#[test]
fn full_calendar_falls_back_to_the_horizon() {
    let now = at(19, 7, 0);
    let mut bookings = Vec::new();
    for d in 0..16 {
        let day = now.date() + Duration::days(d);
        bookings.push(booking(&format!("am{d}"), day.and_hms_opt(8, 0, 0).unwrap(), 240, WorkItemStatus::Assigned));
        bookings.push(booking(&format!("pm{d}"), day.and_hms_opt(14, 0, 0).unwrap(), 240, WorkItemStatus::Assigned));
    }
    let slot = finder().find_slot(request(Priority::Medium, 120, now), &bookings);
    assert_eq!(slot.start, now + Duration::days(14));
    assert!(slot.degraded, "fallback slots are flagged");
}

#[test]
fn preferred_windows_replace_the_defaults() {
    let evening = [WorkingWindow::hours(18, 20).unwrap()];
    let req = SlotRequest { windows: Some(&evening), ..request(Priority::Medium, 60, at(19, 7, 0)) };
    let slot = finder().find_slot(req, &[]);
    assert_eq!(slot.start, at(19, 18, 0));
}
