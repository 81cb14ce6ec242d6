//! Work item queries and the atomic commit primitive.

use super::{
    get_enum, get_opt_ts, get_point, get_ts, id_list, ledger, not_found, technician, ts, BookingCheck,
    CommitReceipt, TimeRange, WorkItemCommit,
};
use crate::{
    error::{DispatchError, DispatchResult},
    event::DispatchEvent,
    types::{Location, Priority, TechnicianStatus, WorkItemStatus},
    work_item::{TechnicianChange, WorkItem},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "work_item_id, reference, work_type, priority, status, address, lat, lon,
     scheduled_start, started_at, completed_at, estimated_duration, actual_duration,
     technician_id, incident_id, notes, version, created_at, updated_at";

fn work_item_row_mapper(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    Ok(WorkItem {
        work_item_id: row.get(0)?,
        reference: row.get(1)?,
        work_type: get_enum(row, 2)?,
        priority: get_enum(row, 3)?,
        status: get_enum(row, 4)?,
        location: Location { address: row.get(5)?, coords: get_point(row, 6)? },
        scheduled_date: get_ts(row, 8)?,
        started_at: get_opt_ts(row, 9)?,
        completed_at: get_opt_ts(row, 10)?,
        estimated_duration: row.get(11)?,
        actual_duration: row.get(12)?,
        technician_id: row.get(13)?,
        incident_id: row.get(14)?,
        notes: row.get(15)?,
        version: row.get(16)?,
        created_at: get_ts(row, 17)?,
        updated_at: get_ts(row, 18)?,
    })
}

fn query_items(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::ToSql],
) -> DispatchResult<Vec<WorkItem>> {
    let sql = format!("SELECT {COLUMNS} FROM work_item WHERE {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params, work_item_row_mapper)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

// ── Reads ──────────────────────────────────────────────────────────

pub(super) fn get(conn: &Connection, work_item_id: &str) -> DispatchResult<Option<WorkItem>> {
    let sql = format!("SELECT {COLUMNS} FROM work_item WHERE work_item_id = ?1");
    Ok(conn
        .query_row(&sql, params![work_item_id], work_item_row_mapper)
        .optional()?)
}

/// Active items of `technician_id`, optionally overlapping `range`,
/// optionally excluding one item.
pub(super) fn find_active(
    conn: &Connection,
    technician_id: &str,
    range: Option<TimeRange>,
    exclude: Option<&str>,
) -> DispatchResult<Vec<WorkItem>> {
    let (start, end) = match range {
        Some(r) => (ts(r.start), ts(r.end)),
        // Fixed-width text: these bounds sort outside every real timestamp.
        None => ("0000".to_string(), "9999".to_string()),
    };
    query_items(
        conn,
        "technician_id = ?1
           AND status IN ('planned', 'assigned', 'in_progress')
           AND scheduled_start < ?3 AND scheduled_end > ?2
           AND work_item_id != ?4
         ORDER BY scheduled_start, work_item_id",
        &[&technician_id, &start, &end, &exclude.unwrap_or("")],
    )
}

pub(super) fn count_active_on(conn: &Connection, technician_id: &str, day: NaiveDate) -> DispatchResult<usize> {
    let range = TimeRange::day(day);
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM work_item
         WHERE technician_id = ?1
           AND status IN ('planned', 'assigned', 'in_progress')
           AND scheduled_start >= ?2 AND scheduled_start < ?3",
        params![technician_id, ts(range.start), ts(range.end)],
        |r| r.get(0),
    )?;
    Ok(count as usize)
}

pub(super) fn find_overdue(conn: &Connection, now: NaiveDateTime) -> DispatchResult<Vec<WorkItem>> {
    query_items(
        conn,
        "status IN ('planned', 'assigned') AND scheduled_start < ?1
         ORDER BY scheduled_start, work_item_id",
        &[&ts(now)],
    )
}

pub(super) fn find_reschedulable(conn: &Connection, range: TimeRange, up_to: Priority) -> DispatchResult<Vec<WorkItem>> {
    let candidates = query_items(
        conn,
        "status IN ('planned', 'assigned')
           AND scheduled_start >= ?1 AND scheduled_start < ?2
         ORDER BY scheduled_start, work_item_id",
        &[&ts(range.start), &ts(range.end)],
    )?;
    Ok(candidates.into_iter().filter(|w| w.priority <= up_to).collect())
}

pub(super) fn find_for_incident(conn: &Connection, incident_id: &str) -> DispatchResult<Vec<WorkItem>> {
    query_items(conn, "incident_id = ?1 ORDER BY created_at, work_item_id", &[&incident_id])
}

// ── Writes ─────────────────────────────────────────────────────────

pub(super) fn next_reference(conn: &Connection, year: i32) -> DispatchResult<String> {
    let value: i64 = conn.query_row(
        "INSERT INTO sequence (name, value) VALUES (?1, 1)
         ON CONFLICT (name) DO UPDATE SET value = value + 1
         RETURNING value",
        params![format!("work_item_{year}")],
        |r| r.get(0),
    )?;
    Ok(format!("INT-{year}-{value:06}"))
}

pub(super) fn create(conn: &Connection, commit: WorkItemCommit) -> DispatchResult<CommitReceipt> {
    if get(conn, &commit.item.work_item_id)?.is_some() {
        return Err(DispatchError::conflict(format!(
            "work item {} already exists",
            commit.item.work_item_id
        )));
    }
    let mut item = commit.item.clone();
    item.version = 0;
    let displaced = check_calendar(conn, &commit, &item)?;

    conn.execute(
        &format!(
            "INSERT INTO work_item ({COLUMNS}, scheduled_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?18, ?19, ?20)"
        ),
        params![
            &item.work_item_id,
            &item.reference,
            item.work_type.as_str(),
            item.priority.as_str(),
            item.status.as_str(),
            &item.location.address,
            item.location.coords.map(|p| p.lat),
            item.location.coords.map(|p| p.lon),
            ts(item.scheduled_date),
            item.started_at.map(ts),
            item.completed_at.map(ts),
            item.estimated_duration,
            item.actual_duration,
            item.technician_id.as_deref(),
            item.incident_id.as_deref(),
            item.notes.as_deref(),
            item.version,
            ts(item.created_at),
            ts(item.updated_at),
            ts(item.scheduled_end()),
        ],
    )?;

    finish_commit(conn, commit, item, displaced)
}

/// Apply one work-item change: version check, technician precondition,
/// calendar check, row update, technician side effect, events.
pub(super) fn commit(conn: &Connection, change: WorkItemCommit) -> DispatchResult<CommitReceipt> {
    let id = change.item.work_item_id.clone();
    let current = get(conn, &id)?.ok_or_else(|| not_found("work item", &id))?;
    if current.version != change.expected_version {
        return Err(DispatchError::conflict(format!(
            "work item {id} changed since it was read (version {} != {})",
            current.version, change.expected_version
        )));
    }

    let mut item = change.item.clone();
    item.version = current.version + 1;
    let displaced = check_calendar(conn, &change, &item)?;
    update_row(conn, &item)?;

    finish_commit(conn, change, item, displaced)
}

pub(super) fn delete(
    conn: &Connection,
    work_item_id: &str,
    expected_version: i64,
    source: &'static str,
    at: NaiveDateTime,
) -> DispatchResult<()> {
    let current = get(conn, work_item_id)?.ok_or_else(|| not_found("work item", work_item_id))?;
    if current.version != expected_version {
        return Err(DispatchError::conflict(format!(
            "work item {work_item_id} changed since it was read"
        )));
    }
    crate::work_item::ensure_deletable(&current)?;
    conn.execute("DELETE FROM work_item WHERE work_item_id = ?1", params![work_item_id])?;
    ledger::append_events(
        conn,
        &[DispatchEvent::WorkItemDeleted { work_item_id: work_item_id.to_string() }],
        source,
        at,
    )
}

fn update_row(conn: &Connection, item: &WorkItem) -> DispatchResult<()> {
    conn.execute(
        "UPDATE work_item SET
            priority = ?2, status = ?3, address = ?4, lat = ?5, lon = ?6,
            scheduled_start = ?7, scheduled_end = ?8, started_at = ?9, completed_at = ?10,
            estimated_duration = ?11, actual_duration = ?12, technician_id = ?13,
            notes = ?14, version = ?15, updated_at = ?16
         WHERE work_item_id = ?1",
        params![
            &item.work_item_id,
            item.priority.as_str(),
            item.status.as_str(),
            &item.location.address,
            item.location.coords.map(|p| p.lat),
            item.location.coords.map(|p| p.lon),
            ts(item.scheduled_date),
            ts(item.scheduled_end()),
            item.started_at.map(ts),
            item.completed_at.map(ts),
            item.estimated_duration,
            item.actual_duration,
            item.technician_id.as_deref(),
            item.notes.as_deref(),
            item.version,
            ts(item.updated_at),
        ],
    )?;
    Ok(())
}

/// Technician precondition and booking check. Returns displaced items,
/// already written back to the unassigned pool.
fn check_calendar(conn: &Connection, commit: &WorkItemCommit, item: &WorkItem) -> DispatchResult<Vec<WorkItem>> {
    let Some(technician_id) = item.technician_id.as_deref() else {
        return Ok(Vec::new());
    };
    let technician = technician::get(conn, technician_id)?
        .ok_or_else(|| not_found("technician", technician_id))?;
    if commit.require_available && technician.status != TechnicianStatus::Available {
        return Err(DispatchError::conflict(format!(
            "technician {technician_id} is {}, not available",
            technician.status
        )));
    }
    if !item.status.is_active() || commit.booking == BookingCheck::Skip {
        return Ok(Vec::new());
    }

    let window = TimeRange::new(item.scheduled_date, item.scheduled_end());
    let overlapping = find_active(conn, technician_id, Some(window), Some(&item.work_item_id))?;
    if overlapping.is_empty() {
        return Ok(Vec::new());
    }

    let preemptable = |w: &WorkItem| w.status.is_reschedulable() && w.priority < item.priority;
    if commit.booking == BookingCheck::RejectOverlap || !overlapping.iter().all(preemptable) {
        return Err(DispatchError::conflict(format!(
            "technician {technician_id} already booked {} - {} by {:?}",
            item.scheduled_date,
            item.scheduled_end(),
            id_list(&overlapping)
        )));
    }

    let mut displaced = Vec::with_capacity(overlapping.len());
    for mut other in overlapping {
        other.status = WorkItemStatus::Planned;
        other.technician_id = None;
        other.version += 1;
        other.updated_at = commit.at;
        update_row(conn, &other)?;
        ledger::append_events(
            conn,
            &[DispatchEvent::WorkItemDisplaced {
                work_item_id: other.work_item_id.clone(),
                technician_id: technician_id.to_string(),
                by_work_item_id: item.work_item_id.clone(),
            }],
            commit.source,
            commit.at,
        )?;
        log::info!(
            "work_item={} displaced from technician={} by work_item={}",
            other.work_item_id, technician_id, item.work_item_id
        );
        displaced.push(other);
    }
    Ok(displaced)
}

fn finish_commit(
    conn: &Connection,
    commit: WorkItemCommit,
    item: WorkItem,
    displaced: Vec<WorkItem>,
) -> DispatchResult<CommitReceipt> {
    let mut events = commit.events;
    match &commit.technician_change {
        Some(TechnicianChange::SetBusy(technician_id)) => {
            if let Some(e) = technician::set_status(conn, technician_id, TechnicianStatus::Busy, None)? {
                events.push(e);
            }
        }
        Some(TechnicianChange::ReleaseIfIdle(technician_id)) => {
            let still_working: i64 = conn.query_row(
                "SELECT COUNT(*) FROM work_item
                 WHERE technician_id = ?1 AND status = 'in_progress' AND work_item_id != ?2",
                params![technician_id, &item.work_item_id],
                |r| r.get(0),
            )?;
            if still_working == 0 {
                let from_busy = Some(TechnicianStatus::Busy);
                if let Some(e) = technician::set_status(conn, technician_id, TechnicianStatus::Available, from_busy)? {
                    events.push(e);
                }
            }
        }
        None => {}
    }
    ledger::append_events(conn, &events, commit.source, commit.at)?;
    Ok(CommitReceipt { item, displaced })
}
