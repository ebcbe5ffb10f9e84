use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Append-only activity log entry in `community_analytics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub action_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: i64,
}

/// Event counts per action type.
pub type EngagementSummary = BTreeMap<String, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessRate {
    pub total: u64,
    pub success: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStreak {
    pub streak: u32,
    pub last_active: Option<NaiveDate>,
}
