use crate::modules::backlog::core::item::ItemType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const AT_RISK_TOTAL: usize = 150;
pub const WARNING_WIP: usize = 20;
pub const WARNING_LEAD_TIME_DAYS: f64 = 60.0;
pub const HEALTHY_TOTAL: usize = 100;
pub const HEALTHY_WIP: usize = 10;
pub const HEALTHY_LEAD_TIME_DAYS: f64 = 30.0;
pub const DEFAULT_AGEING_THRESHOLD_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Average,
    Warning,
    AtRisk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_items: usize,
    pub epic_count: usize,
    pub feature_count: usize,
    pub story_count: usize,
    pub average_age_days: f64,
    pub wip_count: usize,
    pub lead_time_days: f64,
    pub throughput: usize,
    pub iceberg_ratio: f64,
    pub health_status: HealthStatus,
    pub blocked_count: usize,
    pub average_blocked_days: f64,
    pub ageing_count: usize,
    pub ageing_threshold_days: u32,
    pub story_points: StoryPointsProgress,
    pub type_distribution: TypeDistribution,
    pub window_days: u32,
    pub computed_at: i64,
}

/// Points completed in the window against points created in it. Items
/// created before the window but finished inside it count as completed only,
/// so the percentage can exceed 100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryPointsProgress {
    pub completed: i64,
    pub total: i64,
    pub completion_percentage: f64,
}

impl StoryPointsProgress {
    pub fn new(completed: i64, total: i64) -> Self {
        let completion_percentage = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            completed,
            total,
            completion_percentage,
        }
    }
}

/// Share of every stored item, DONE included, per type in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDistribution {
    pub epic: f64,
    pub feature: f64,
    pub story: f64,
}

impl TypeDistribution {
    pub fn from_counts(counts: &HashMap<ItemType, usize>) -> Self {
        let total: usize = counts.values().sum();
        let share = |t: ItemType| {
            if total == 0 {
                return 0.0;
            }
            counts.get(&t).copied().unwrap_or(0) as f64 / total as f64 * 100.0
        };
        Self {
            epic: share(ItemType::Epic),
            feature: share(ItemType::Feature),
            story: share(ItemType::Story),
        }
    }
}

/// 1.0 when active items split evenly across the three types, 0.0 for an
/// empty backlog.
pub fn iceberg_ratio(epics: usize, features: usize, stories: usize) -> f64 {
    let total = epics + features + stories;
    if total == 0 {
        return 0.0;
    }
    let ideal = 1.0 / 3.0;
    let deviation: f64 = [epics, features, stories]
        .iter()
        .map(|&count| (count as f64 / total as f64 - ideal).abs())
        .sum();
    (1.0 - deviation / 2.0).clamp(0.0, 1.0)
}

pub fn health_status(total_items: usize, wip_count: usize, lead_time_days: f64) -> HealthStatus {
    if total_items > AT_RISK_TOTAL {
        HealthStatus::AtRisk
    } else if wip_count > WARNING_WIP || lead_time_days > WARNING_LEAD_TIME_DAYS {
        HealthStatus::Warning
    } else if total_items <= HEALTHY_TOTAL
        && wip_count <= HEALTHY_WIP
        && lead_time_days <= HEALTHY_LEAD_TIME_DAYS
    {
        HealthStatus::Healthy
    } else {
        HealthStatus::Average
    }
}

/// Plain mean over the three type buckets; a missing bucket counts as 0.
pub fn mean_over_types(by_type: &HashMap<ItemType, f64>) -> f64 {
    let sum: f64 = ItemType::ALL
        .iter()
        .map(|t| by_type.get(t).copied().unwrap_or(0.0))
        .sum();
    sum / ItemType::ALL.len() as f64
}
