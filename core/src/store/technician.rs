//! Technician roster queries.

use super::{conversion_error, get_enum, get_point};
use crate::{
    error::DispatchResult,
    event::DispatchEvent,
    technician::Technician,
    types::{Skill, TechnicianStatus},
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

fn technician_row_mapper(row: &Row<'_>) -> rusqlite::Result<Technician> {
    let skills_json: String = row.get(3)?;
    let skills: BTreeSet<Skill> =
        serde_json::from_str(&skills_json).map_err(|e| conversion_error(3, e))?;
    Ok(Technician {
        technician_id: row.get(0)?,
        name: row.get(1)?,
        status: get_enum(row, 2)?,
        skills,
        location: get_point(row, 4)?,
    })
}

pub(super) fn list(conn: &Connection) -> DispatchResult<Vec<Technician>> {
    let mut stmt = conn.prepare(
        "SELECT technician_id, name, status, skills, lat, lon
         FROM technician ORDER BY technician_id",
    )?;
    let rows = stmt
        .query_map([], technician_row_mapper)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(super) fn get(conn: &Connection, technician_id: &str) -> DispatchResult<Option<Technician>> {
    Ok(conn
        .query_row(
            "SELECT technician_id, name, status, skills, lat, lon
             FROM technician WHERE technician_id = ?1",
            params![technician_id],
            technician_row_mapper,
        )
        .optional()?)
}

pub(super) fn upsert(conn: &Connection, t: &Technician) -> DispatchResult<()> {
    conn.execute(
        "INSERT INTO technician (technician_id, name, status, skills, lat, lon)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (technician_id) DO UPDATE SET
            name = excluded.name, status = excluded.status, skills = excluded.skills,
            lat = excluded.lat, lon = excluded.lon",
        params![
            &t.technician_id,
            &t.name,
            t.status.as_str(),
            serde_json::to_string(&t.skills)?,
            t.location.map(|p| p.lat),
            t.location.map(|p| p.lon),
        ],
    )?;
    Ok(())
}

/// Set a technician's status. With `only_from`, the write happens only if
/// the current status matches. Returns the change event, or None if nothing
/// changed.
pub(super) fn set_status(
    conn: &Connection,
    technician_id: &str,
    to: TechnicianStatus,
    only_from: Option<TechnicianStatus>,
) -> DispatchResult<Option<DispatchEvent>> {
    let Some(current) = get(conn, technician_id)? else {
        return Err(super::not_found("technician", technician_id));
    };
    if current.status == to || only_from.is_some_and(|s| s != current.status) {
        return Ok(None);
    }
    conn.execute(
        "UPDATE technician SET status = ?2 WHERE technician_id = ?1",
        params![technician_id, to.as_str()],
    )?;
    log::debug!("technician={technician_id} status {} -> {to}", current.status);
    Ok(Some(DispatchEvent::TechnicianStatusChanged {
        technician_id: technician_id.to_string(),
        from: current.status,
        to,
    }))
}
