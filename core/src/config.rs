use crate::types::{Minutes, Priority, WorkItemType};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

// ── Scoring ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub skill_weight: f64,
    pub availability_weight: f64,
    /// Only applied when both the technician and the work item have coordinates.
    pub proximity_weight: f64,
    pub workload_weight: f64,
    /// Active items per day at which the workload sub-score reaches zero.
    pub workload_capacity: f64,
    /// Distance at which the proximity sub-score reaches zero.
    pub proximity_cutoff_km: f64,
    pub km_per_degree: f64,
    /// Skill sub-score for a technician with no recorded skills.
    pub empty_skills_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            skill_weight: 0.4,
            availability_weight: 0.3,
            proximity_weight: 0.2,
            workload_weight: 0.1,
            workload_capacity: 6.0,
            proximity_cutoff_km: 50.0,
            km_per_degree: 111.0,
            empty_skills_score: 0.5,
        }
    }
}

// ── Slot search ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingWindow {
    /// Returns None when either bound is not a valid wall-clock time.
    pub fn hours(start_h: u32, end_h: u32) -> Option<Self> {
        Some(Self {
            start: NaiveTime::from_hms_opt(start_h, 0, 0)?,
            end: NaiveTime::from_hms_opt(end_h, 0, 0)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    pub horizon_days: i64,
    pub working_windows: Vec<WorkingWindow>,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            horizon_days: 14,
            working_windows: [(8, 12), (14, 18)]
                .iter()
                .filter_map(|&(s, e)| WorkingWindow::hours(s, e))
                .collect(),
        }
    }
}

// ── Duration estimates ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationTable {
    pub maintenance: Minutes,
    pub repair: Minutes,
    pub installation: Minutes,
    pub emergency: Minutes,
    pub reading: Minutes,
    pub cutting: Minutes,
    /// Fraction shaved off the base estimate for urgent items.
    pub urgent_reduction: f64,
}

impl Default for DurationTable {
    fn default() -> Self {
        Self {
            maintenance: 120,
            repair: 180,
            installation: 240,
            emergency: 90,
            reading: 30,
            cutting: 60,
            urgent_reduction: 0.2,
        }
    }
}

impl DurationTable {
    pub fn base_minutes(&self, work_type: WorkItemType) -> Minutes {
        match work_type {
            WorkItemType::Maintenance => self.maintenance,
            WorkItemType::Repair => self.repair,
            WorkItemType::Installation => self.installation,
            WorkItemType::Emergency => self.emergency,
            WorkItemType::Reading => self.reading,
            WorkItemType::Cutting => self.cutting,
        }
    }

    /// Base estimate, reduced for urgent work. Rounded to whole minutes.
    pub fn estimate(&self, work_type: WorkItemType, priority: Priority) -> Minutes {
        let base = self.base_minutes(work_type);
        match priority {
            Priority::Urgent => (base as f64 * (1.0 - self.urgent_reduction)).round() as Minutes,
            Priority::Low | Priority::Medium | Priority::High => base,
        }
    }
}

// ── Confidence ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub base: f64,
    pub skill_factor: f64,
    pub available_bonus: f64,
    /// Added when the proposed start is less than 24h away.
    pub same_day_bonus: f64,
    /// Added on top when the proposed start is less than 4h away.
    pub imminent_bonus: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            base: 0.5,
            skill_factor: 0.3,
            available_bonus: 0.2,
            same_day_bonus: 0.1,
            imminent_bonus: 0.1,
        }
    }
}

// ── Periodic passes ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub overdue_interval_minutes: i64,
    /// Overdue proposals are committed only above this confidence.
    pub overdue_threshold: f64,
    /// Local time at which the nightly pass becomes due.
    pub nightly_at: NaiveTime,
    pub nightly_threshold: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            overdue_interval_minutes: 10,
            overdue_threshold: 0.7,
            nightly_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            nightly_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    /// How far ahead to look for low/medium work that could make room.
    pub reschedulable_lookahead_days: i64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self { reschedulable_lookahead_days: 7 }
    }
}

// ── Root ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub scoring: ScoringConfig,
    pub slots: SlotConfig,
    pub durations: DurationTable,
    pub confidence: ConfidenceConfig,
    pub optimizer: OptimizerConfig,
    pub emergency: EmergencyConfig,
    /// Fresh proposals a direct schedule-and-commit computes after losing a race.
    pub commit_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            slots: SlotConfig::default(),
            durations: DurationTable::default(),
            confidence: ConfidenceConfig::default(),
            optimizer: OptimizerConfig::default(),
            emergency: EmergencyConfig::default(),
            commit_attempts: 3,
        }
    }
}

impl DispatchConfig {
    /// Load from a JSON file. Missing sections and fields keep their defaults.
    /// In tests, use DispatchConfig::default().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: DispatchConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.slots.working_windows.is_empty() {
            anyhow::bail!("slots.working_windows must not be empty");
        }
        for w in &self.slots.working_windows {
            if w.start >= w.end {
                anyhow::bail!("working window {} - {} ends before it starts", w.start, w.end);
            }
        }
        if self.slots.horizon_days <= 0 {
            anyhow::bail!("slots.horizon_days must be positive");
        }
        if self.scoring.workload_capacity <= 0.0 || self.scoring.proximity_cutoff_km <= 0.0 {
            anyhow::bail!("scoring.workload_capacity and scoring.proximity_cutoff_km must be positive");
        }
        if self.optimizer.overdue_interval_minutes <= 0 {
            anyhow::bail!("optimizer.overdue_interval_minutes must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgent_items_get_twenty_percent_less_time() {
        let table = DurationTable::default();
        assert_eq!(table.estimate(WorkItemType::Emergency, Priority::Urgent), 72);
        assert_eq!(table.estimate(WorkItemType::Repair, Priority::Urgent), 144);
        assert_eq!(table.estimate(WorkItemType::Repair, Priority::High), 180);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: DispatchConfig =
            serde_json::from_str(r#"{ "scoring": { "workload_capacity": 8.0 } }"#).unwrap();
        assert_eq!(cfg.scoring.workload_capacity, 8.0);
        assert_eq!(cfg.scoring.skill_weight, 0.4);
        assert_eq!(cfg.slots.working_windows.len(), 2);
        assert_eq!(cfg.optimizer.nightly_threshold, 0.85);
        cfg.validate().unwrap();
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut cfg = DispatchConfig::default();
        cfg.slots.working_windows = vec![WorkingWindow::hours(12, 8).unwrap()];
        assert!(cfg.validate().is_err());
    }
}
