use serde::{Deserialize, Serialize};

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    #[serde(default)]
    pub id: String,
    pub from_user_id: String,
    pub session_id: String,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Cached mean score for a user, stored at `reputation/{uid}`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReputationSummary {
    pub average: f64,
    pub count: u64,
}

impl ReputationSummary {
    /// Running mean after one more score.
    pub fn with_score(&self, score: u8) -> Self {
        let count = self.count + 1;
        let average = (self.average * self.count as f64 + f64::from(score)) / count as f64;
        Self { average, count }
    }

    pub fn from_scores(scores: &[u8]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let total: u64 = scores.iter().map(|s| u64::from(*s)).sum();
        Self {
            average: total as f64 / scores.len() as f64,
            count: scores.len() as u64,
        }
    }
}
