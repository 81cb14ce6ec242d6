//! Shared primitive types used across the dispatch core.
//!
//! RULE: every status, type and priority is a closed enum.
//! Lookup tables match on them exhaustively, so adding a variant
//! is a compile error until every table handles it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A stable, unique identifier for any entity (work item, technician, incident).
pub type EntityId = String;

/// Durations are tracked in whole minutes everywhere.
pub type Minutes = i64;

/// Text that does not name any variant of a closed enum.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` over the snake_case names
/// that are also used on the wire and in the database.
macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

// ── Work items ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemType {
    Maintenance,
    Repair,
    Installation,
    Reading,
    Cutting,
    Emergency,
}

text_enum!(WorkItemType, "work item type", {
    Maintenance  => "maintenance",
    Repair       => "repair",
    Installation => "installation",
    Reading      => "reading",
    Cutting      => "cutting",
    Emergency    => "emergency",
});

/// Ordered: `Low < Medium < High < Urgent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

text_enum!(Priority, "priority", {
    Low    => "low",
    Medium => "medium",
    High   => "high",
    Urgent => "urgent",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Planned,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
    Postponed,
}

text_enum!(WorkItemStatus, "work item status", {
    Planned    => "planned",
    Assigned   => "assigned",
    InProgress => "in_progress",
    Completed  => "completed",
    Cancelled  => "cancelled",
    Postponed  => "postponed",
});

impl WorkItemStatus {
    /// Active items occupy a technician's calendar.
    pub fn is_active(&self) -> bool {
        match self {
            Self::Planned | Self::Assigned | Self::InProgress => true,
            Self::Completed | Self::Cancelled | Self::Postponed => false,
        }
    }

    /// Statuses the dispatcher may still move to another technician or slot.
    pub fn is_reschedulable(&self) -> bool {
        match self {
            Self::Planned | Self::Assigned => true,
            Self::InProgress | Self::Completed | Self::Cancelled | Self::Postponed => false,
        }
    }
}

// ── Technicians ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicianStatus {
    Available,
    Busy,
    OffDuty,
    Vacation,
}

text_enum!(TechnicianStatus, "technician status", {
    Available => "available",
    Busy      => "busy",
    OffDuty   => "off_duty",
    Vacation  => "vacation",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Plumbing,
    Electrical,
    Mechanical,
    Electronics,
    Emergency,
}

text_enum!(Skill, "skill", {
    Plumbing    => "plumbing",
    Electrical  => "electrical",
    Mechanical  => "mechanical",
    Electronics => "electronics",
    Emergency   => "emergency",
});

// ── Incidents ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    Leak,
    PowerOutage,
    EquipmentFailure,
    Emergency,
    QualityIssue,
    Other,
}

text_enum!(IncidentType, "incident type", {
    Leak             => "leak",
    PowerOutage      => "power_outage",
    EquipmentFailure => "equipment_failure",
    Emergency        => "emergency",
    QualityIssue     => "quality_issue",
    Other            => "other",
});

/// Ordered: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentPriority {
    Low,
    Medium,
    High,
    Critical,
}

text_enum!(IncidentPriority, "incident priority", {
    Low      => "low",
    Medium   => "medium",
    High     => "high",
    Critical => "critical",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Reported,
    Acknowledged,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

text_enum!(IncidentStatus, "incident status", {
    Reported     => "reported",
    Acknowledged => "acknowledged",
    Assigned     => "assigned",
    InProgress   => "in_progress",
    Resolved     => "resolved",
    Closed       => "closed",
});

// ── Geography ────────────────────────────────────────────────────────────────

/// WGS84 coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Planar distance in degrees. Good enough at city scale.
    pub fn degree_distance(&self, other: &GeoPoint) -> f64 {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        (dlat * dlat + dlon * dlon).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    #[serde(default)]
    pub coords: Option<GeoPoint>,
}

impl Location {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), coords: None }
    }

    pub fn with_coords(mut self, lat: f64, lon: f64) -> Self {
        self.coords = Some(GeoPoint::new(lat, lon));
        self
    }
}
