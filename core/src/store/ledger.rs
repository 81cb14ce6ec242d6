//! Event log and periodic-pass ledger.

use super::{get_ts, ts};
use crate::{
    error::DispatchResult,
    event::{DispatchEvent, EventLogEntry},
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

pub(super) fn append_events(
    conn: &Connection,
    events: &[DispatchEvent],
    source: &'static str,
    at: NaiveDateTime,
) -> DispatchResult<()> {
    for event in events {
        let entry = EventLogEntry::new(at, source, event)?;
        conn.execute(
            "INSERT INTO event_log (recorded_at, source, event_type, entity_id, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![ts(entry.recorded_at), entry.source, entry.event_type, entry.entity_id, entry.payload],
        )?;
    }
    Ok(())
}

pub(super) fn all_events(conn: &Connection) -> DispatchResult<Vec<EventLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, recorded_at, source, event_type, entity_id, payload
         FROM event_log ORDER BY id ASC",
    )?;
    let entries = stmt
        .query_map([], |row| {
            Ok(EventLogEntry {
                id: Some(row.get(0)?),
                recorded_at: get_ts(row, 1)?,
                source: row.get(2)?,
                event_type: row.get(3)?,
                entity_id: row.get(4)?,
                payload: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub(super) fn event_count(conn: &Connection) -> DispatchResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM event_log", [], |r| r.get(0))?)
}

pub(super) fn begin_pass(conn: &Connection, pass: &str, key: &str, at: NaiveDateTime) -> DispatchResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO pass_run (pass_name, target_key, started_at) VALUES (?1, ?2, ?3)",
        params![pass, key, ts(at)],
    )?;
    Ok(inserted == 1)
}

pub(super) fn finish_pass(
    conn: &Connection,
    pass: &str,
    key: &str,
    at: NaiveDateTime,
    report_json: &str,
) -> DispatchResult<()> {
    conn.execute(
        "UPDATE pass_run SET finished_at = ?3, report_json = ?4
         WHERE pass_name = ?1 AND target_key = ?2",
        params![pass, key, ts(at), report_json],
    )?;
    Ok(())
}

pub(super) fn release_pass(conn: &Connection, pass: &str, key: &str) -> DispatchResult<()> {
    conn.execute(
        "DELETE FROM pass_run WHERE pass_name = ?1 AND target_key = ?2",
        params![pass, key],
    )?;
    Ok(())
}
