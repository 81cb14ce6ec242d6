//! Outbound notifications to the external messaging collaborator.
//!
//! Notifications are fire-and-forget. A failed delivery is logged and
//! never rolls back the scheduling change that triggered it.

use crate::{incident::Incident, technician::Technician, work_item::WorkItem};
use std::sync::Mutex;

pub trait Notifier: Send + Sync {
    fn technician_assigned(&self, item: &WorkItem) -> anyhow::Result<()>;
    fn technician_reassigned(&self, item: &WorkItem, new_technician: &Technician) -> anyhow::Result<()>;
    fn urgent_incident(&self, incident: &Incident) -> anyhow::Result<()>;
    fn overdue(&self, item: &WorkItem) -> anyhow::Result<()>;
}

/// Deliver through `notifier`, logging instead of propagating failures.
pub(crate) fn deliver(kind: &str, subject: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        log::warn!("notification {kind} for {subject} failed: {e:#}");
    }
}

/// Writes every notification to the log. For deployments without a mail
/// or SMS bridge, and for the runner.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn technician_assigned(&self, item: &WorkItem) -> anyhow::Result<()> {
        log::info!(
            "notify: {} assigned to technician={} at {}",
            item.reference,
            item.technician_id.as_deref().unwrap_or("-"),
            item.scheduled_date
        );
        Ok(())
    }

    fn technician_reassigned(&self, item: &WorkItem, new_technician: &Technician) -> anyhow::Result<()> {
        log::info!(
            "notify: {} reassigned to technician={} ({}) at {}",
            item.reference, new_technician.technician_id, new_technician.name, item.scheduled_date
        );
        Ok(())
    }

    fn urgent_incident(&self, incident: &Incident) -> anyhow::Result<()> {
        log::warn!(
            "notify: URGENT incident={} '{}' at {}",
            incident.incident_id, incident.title, incident.location.address
        );
        Ok(())
    }

    fn overdue(&self, item: &WorkItem) -> anyhow::Result<()> {
        log::info!("notify: {} overdue since {}", item.reference, item.scheduled_date);
        Ok(())
    }
}

/// One delivered notification, as captured by `RecordingNotifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Assigned { work_item_id: String, technician_id: Option<String> },
    Reassigned { work_item_id: String, technician_id: String },
    UrgentIncident { incident_id: String },
    Overdue { work_item_id: String },
}

/// Keeps every notification in memory. Optionally fails every delivery,
/// to exercise the no-rollback rule.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records nothing and reports every delivery as failed.
    pub fn failing() -> Self {
        Self { sent: Mutex::new(Vec::new()), fail: true }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn push(&self, n: Notification) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("delivery refused: {n:?}");
        }
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("recording notifier poisoned"))?
            .push(n);
        Ok(())
    }
}

impl Notifier for RecordingNotifier {
    fn technician_assigned(&self, item: &WorkItem) -> anyhow::Result<()> {
        self.push(Notification::Assigned {
            work_item_id: item.work_item_id.clone(),
            technician_id: item.technician_id.clone(),
        })
    }

    fn technician_reassigned(&self, item: &WorkItem, new_technician: &Technician) -> anyhow::Result<()> {
        self.push(Notification::Reassigned {
            work_item_id: item.work_item_id.clone(),
            technician_id: new_technician.technician_id.clone(),
        })
    }

    fn urgent_incident(&self, incident: &Incident) -> anyhow::Result<()> {
        self.push(Notification::UrgentIncident { incident_id: incident.incident_id.clone() })
    }

    fn overdue(&self, item: &WorkItem) -> anyhow::Result<()> {
        self.push(Notification::Overdue { work_item_id: item.work_item_id.clone() })
    }
}
