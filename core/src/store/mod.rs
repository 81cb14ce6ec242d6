//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The dispatch core depends on the `WorkStore` trait. It never
//! executes SQL directly and never sees a rusqlite type.
//!
//! Every mutation runs in a single IMMEDIATE transaction together with
//! the event-log rows that describe it, so a commit either lands whole
//! or not at all.

use crate::{
    error::{DispatchError, DispatchResult},
    event::{DispatchEvent, EventLogEntry},
    incident::Incident,
    technician::Technician,
    types::{EntityId, IncidentStatus, Priority, UnknownVariant},
    work_item::{TechnicianChange, Transition, WorkItem},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{types::Type, Connection, Row, TransactionBehavior};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

mod incident;
mod ledger;
mod technician;
mod work_item;

// ── Store interface ──────────────────────────────────────────────────────────

/// Half-open `[start, end)` time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn day(day: NaiveDate) -> Self {
        let start = day.and_time(chrono::NaiveTime::MIN);
        Self { start, end: start + chrono::Duration::days(1) }
    }
}

/// How a commit treats other bookings of the item's technician.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingCheck {
    /// No calendar check (state transitions that do not move the item).
    Skip,
    /// Fail with Conflict if any other active item overlaps.
    RejectOverlap,
    /// Return overlapping lower-priority planned/assigned items to the
    /// unassigned pool; fail with Conflict on any other overlap.
    PreemptLowerPriority,
}

/// Everything the store needs to apply one work-item change atomically.
#[derive(Debug, Clone)]
pub struct WorkItemCommit {
    /// Desired state of the row. `version` is ignored; the store bumps it.
    pub item: WorkItem,
    /// Version the caller read. A mismatch means somebody else committed first.
    pub expected_version: i64,
    pub booking: BookingCheck,
    /// The item's technician must be `available` at commit time.
    pub require_available: bool,
    pub technician_change: Option<TechnicianChange>,
    pub events: Vec<DispatchEvent>,
    pub source: &'static str,
    pub at: NaiveDateTime,
}

impl WorkItemCommit {
    pub fn from_transition(
        transition: Transition,
        expected_version: i64,
        source: &'static str,
        at: NaiveDateTime,
    ) -> Self {
        Self {
            item: transition.item,
            expected_version,
            booking: BookingCheck::Skip,
            require_available: false,
            technician_change: transition.technician_change,
            events: vec![transition.event],
            source,
            at,
        }
    }

    pub fn with_booking(mut self, booking: BookingCheck) -> Self {
        self.booking = booking;
        self
    }

    pub fn requiring_available(mut self) -> Self {
        self.require_available = true;
        self
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    /// The row as stored, with its new version.
    pub item: WorkItem,
    /// Items pushed out of the technician's calendar by a preempting commit.
    pub displaced: Vec<WorkItem>,
}

/// The operations the dispatch core needs from persistence.
pub trait WorkStore: Send + Sync {
    // ── Work items ─────────────────────────────────
    /// Next work-order number for `year`, e.g. `INT-2026-000042`.
    fn next_reference(&self, year: i32) -> DispatchResult<String>;
    /// Insert a new row. `expected_version` is ignored.
    fn create_work_item(&self, commit: WorkItemCommit) -> DispatchResult<CommitReceipt>;
    fn get_work_item(&self, work_item_id: &str) -> DispatchResult<Option<WorkItem>>;
    fn commit_work_item(&self, commit: WorkItemCommit) -> DispatchResult<CommitReceipt>;
    fn delete_work_item(
        &self,
        work_item_id: &str,
        expected_version: i64,
        source: &'static str,
        at: NaiveDateTime,
    ) -> DispatchResult<()>;
    /// Active items of a technician, optionally only those overlapping `range`.
    fn find_active(&self, technician_id: &str, range: Option<TimeRange>) -> DispatchResult<Vec<WorkItem>>;
    /// Active items of a technician scheduled on `day`.
    fn count_active_on(&self, technician_id: &str, day: NaiveDate) -> DispatchResult<usize>;
    /// Planned/assigned items whose scheduled start is before `now`.
    fn find_overdue(&self, now: NaiveDateTime) -> DispatchResult<Vec<WorkItem>>;
    /// Planned/assigned items starting inside `range` with priority at most `up_to`.
    fn find_reschedulable(&self, range: TimeRange, up_to: Priority) -> DispatchResult<Vec<WorkItem>>;
    fn find_for_incident(&self, incident_id: &str) -> DispatchResult<Vec<WorkItem>>;

    // ── Technicians ────────────────────────────────
    /// All technicians, ordered by id.
    fn list_technicians(&self) -> DispatchResult<Vec<Technician>>;
    fn get_technician(&self, technician_id: &str) -> DispatchResult<Option<Technician>>;
    /// Roster sync. Writes skills, location and status as given.
    fn upsert_technician(&self, technician: &Technician) -> DispatchResult<()>;

    // ── Incidents ──────────────────────────────────
    fn insert_incident(&self, incident: &Incident, source: &'static str) -> DispatchResult<()>;
    fn get_incident(&self, incident_id: &str) -> DispatchResult<Option<Incident>>;
    /// Validated forward move of an incident's status.
    fn advance_incident(
        &self,
        incident_id: &str,
        to: IncidentStatus,
        source: &'static str,
        at: NaiveDateTime,
    ) -> DispatchResult<Incident>;

    // ── Ledger ─────────────────────────────────────
    fn record_event(&self, event: &DispatchEvent, source: &'static str, at: NaiveDateTime) -> DispatchResult<()>;
    /// The whole event log in insertion order.
    fn events(&self) -> DispatchResult<Vec<EventLogEntry>>;
    fn event_count(&self) -> DispatchResult<i64>;
    /// Claim a periodic pass run. False if `(pass, key)` was already claimed.
    fn begin_pass(&self, pass: &str, key: &str, at: NaiveDateTime) -> DispatchResult<bool>;
    fn finish_pass(&self, pass: &str, key: &str, at: NaiveDateTime, report_json: &str) -> DispatchResult<()>;
    /// Drop a claim so the next trigger for the same key runs again.
    fn release_pass(&self, pass: &str, key: &str) -> DispatchResult<()>;
}

// ── SQLite implementation ────────────────────────────────────────────────────

pub struct OpsStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl OpsStore {
    pub fn open(path: &str) -> DispatchResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn), path: Some(path.to_string()) })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> DispatchResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn), path: None })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> DispatchResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/002_operations.sql"))?;
        Ok(())
    }

    fn conn(&self) -> DispatchResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DispatchError::StorePoisoned)
    }

    /// Run `f` inside one IMMEDIATE transaction; commit only if it succeeds.
    fn write<T>(&self, f: impl FnOnce(&Connection) -> DispatchResult<T>) -> DispatchResult<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> DispatchResult<T>) -> DispatchResult<T> {
        let conn = self.conn()?;
        f(&conn)
    }
}

impl WorkStore for OpsStore {
    fn next_reference(&self, year: i32) -> DispatchResult<String> {
        self.write(|c| work_item::next_reference(c, year))
    }

    fn create_work_item(&self, commit: WorkItemCommit) -> DispatchResult<CommitReceipt> {
        self.write(|c| work_item::create(c, commit))
    }

    fn get_work_item(&self, work_item_id: &str) -> DispatchResult<Option<WorkItem>> {
        self.read(|c| work_item::get(c, work_item_id))
    }

    fn commit_work_item(&self, commit: WorkItemCommit) -> DispatchResult<CommitReceipt> {
        self.write(|c| work_item::commit(c, commit))
    }

    fn delete_work_item(
        &self,
        work_item_id: &str,
        expected_version: i64,
        source: &'static str,
        at: NaiveDateTime,
    ) -> DispatchResult<()> {
        self.write(|c| work_item::delete(c, work_item_id, expected_version, source, at))
    }

    fn find_active(&self, technician_id: &str, range: Option<TimeRange>) -> DispatchResult<Vec<WorkItem>> {
        self.read(|c| work_item::find_active(c, technician_id, range, None))
    }

    fn count_active_on(&self, technician_id: &str, day: NaiveDate) -> DispatchResult<usize> {
        self.read(|c| work_item::count_active_on(c, technician_id, day))
    }

    fn find_overdue(&self, now: NaiveDateTime) -> DispatchResult<Vec<WorkItem>> {
        self.read(|c| work_item::find_overdue(c, now))
    }

    fn find_reschedulable(&self, range: TimeRange, up_to: Priority) -> DispatchResult<Vec<WorkItem>> {
        self.read(|c| work_item::find_reschedulable(c, range, up_to))
    }

    fn find_for_incident(&self, incident_id: &str) -> DispatchResult<Vec<WorkItem>> {
        self.read(|c| work_item::find_for_incident(c, incident_id))
    }

    fn list_technicians(&self) -> DispatchResult<Vec<Technician>> {
        self.read(technician::list)
    }

    fn get_technician(&self, technician_id: &str) -> DispatchResult<Option<Technician>> {
        self.read(|c| technician::get(c, technician_id))
    }

    fn upsert_technician(&self, t: &Technician) -> DispatchResult<()> {
        self.write(|c| technician::upsert(c, t))
    }

    fn insert_incident(&self, incident: &Incident, source: &'static str) -> DispatchResult<()> {
        self.write(|c| incident::insert(c, incident, source))
    }

    fn get_incident(&self, incident_id: &str) -> DispatchResult<Option<Incident>> {
        self.read(|c| incident::get(c, incident_id))
    }

    fn advance_incident(
        &self,
        incident_id: &str,
        to: IncidentStatus,
        source: &'static str,
        at: NaiveDateTime,
    ) -> DispatchResult<Incident> {
        self.write(|c| incident::advance(c, incident_id, to, source, at))
    }

    fn record_event(&self, event: &DispatchEvent, source: &'static str, at: NaiveDateTime) -> DispatchResult<()> {
        self.write(|c| ledger::append_events(c, std::slice::from_ref(event), source, at))
    }

    fn events(&self) -> DispatchResult<Vec<EventLogEntry>> {
        self.read(ledger::all_events)
    }

    fn event_count(&self) -> DispatchResult<i64> {
        self.read(ledger::event_count)
    }

    fn begin_pass(&self, pass: &str, key: &str, at: NaiveDateTime) -> DispatchResult<bool> {
        self.write(|c| ledger::begin_pass(c, pass, key, at))
    }

    fn finish_pass(&self, pass: &str, key: &str, at: NaiveDateTime, report_json: &str) -> DispatchResult<()> {
        self.write(|c| ledger::finish_pass(c, pass, key, at, report_json))
    }

    fn release_pass(&self, pass: &str, key: &str) -> DispatchResult<()> {
        self.write(|c| ledger::release_pass(c, pass, key))
    }
}

// ── Column helpers ───────────────────────────────────────────────────────────

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Timestamps are stored as fixed-width text so SQL comparisons sort correctly.
pub(crate) fn ts(t: NaiveDateTime) -> String {
    t.format(TS_FORMAT).to_string()
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let text: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&text, TS_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| NaiveDateTime::parse_from_str(&t, TS_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn get_point(row: &Row<'_>, lat_idx: usize) -> rusqlite::Result<Option<crate::types::GeoPoint>> {
    let lat: Option<f64> = row.get(lat_idx)?;
    let lon: Option<f64> = row.get(lat_idx + 1)?;
    Ok(lat.zip(lon).map(|(lat, lon)| crate::types::GeoPoint::new(lat, lon)))
}

fn not_found(kind: &'static str, id: &str) -> DispatchError {
    DispatchError::not_found(kind, id.to_string())
}

fn id_list(items: &[WorkItem]) -> Vec<EntityId> {
    items.iter().map(|w| w.work_item_id.clone()).collect()
}
