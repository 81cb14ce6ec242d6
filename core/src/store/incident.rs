//! Incident queries.

use super::{get_enum, get_point, get_ts, ledger, not_found, ts};
use crate::{
    error::DispatchResult,
    event::DispatchEvent,
    incident::{advance_status, Incident},
    types::{IncidentStatus, Location},
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

fn incident_row_mapper(row: &Row<'_>) -> rusqlite::Result<Incident> {
    Ok(Incident {
        incident_id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        incident_type: get_enum(row, 3)?,
        priority: get_enum(row, 4)?,
        status: get_enum(row, 5)?,
        location: Location { address: row.get(6)?, coords: get_point(row, 7)? },
        reported_at: get_ts(row, 9)?,
        updated_at: get_ts(row, 10)?,
    })
}

pub(super) fn insert(conn: &Connection, i: &Incident, source: &'static str) -> DispatchResult<()> {
    conn.execute(
        "INSERT INTO incident (incident_id, title, description, incident_type, priority,
            status, address, lat, lon, reported_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &i.incident_id,
            &i.title,
            &i.description,
            i.incident_type.as_str(),
            i.priority.as_str(),
            i.status.as_str(),
            &i.location.address,
            i.location.coords.map(|p| p.lat),
            i.location.coords.map(|p| p.lon),
            ts(i.reported_at),
            ts(i.updated_at),
        ],
    )?;
    ledger::append_events(
        conn,
        &[DispatchEvent::IncidentReported { incident_id: i.incident_id.clone(), priority: i.priority }],
        source,
        i.reported_at,
    )
}

pub(super) fn get(conn: &Connection, incident_id: &str) -> DispatchResult<Option<Incident>> {
    Ok(conn
        .query_row(
            "SELECT incident_id, title, description, incident_type, priority, status,
                    address, lat, lon, reported_at, updated_at
             FROM incident WHERE incident_id = ?1",
            params![incident_id],
            incident_row_mapper,
        )
        .optional()?)
}

pub(super) fn advance(
    conn: &Connection,
    incident_id: &str,
    to: IncidentStatus,
    source: &'static str,
    at: NaiveDateTime,
) -> DispatchResult<Incident> {
    let mut incident = get(conn, incident_id)?.ok_or_else(|| not_found("incident", incident_id))?;
    let from = incident.status;
    incident.status = advance_status(&incident, to)?;
    incident.updated_at = at;
    conn.execute(
        "UPDATE incident SET status = ?2, updated_at = ?3 WHERE incident_id = ?1",
        params![incident_id, to.as_str(), ts(at)],
    )?;
    ledger::append_events(
        conn,
        &[DispatchEvent::IncidentStatusChanged { incident_id: incident_id.to_string(), from, to }],
        source,
        at,
    )?;
    Ok(incident)
}
