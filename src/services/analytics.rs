// AnalyticsService - append-only activity log and the metrics derived from it.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{
    decode_all, DatabaseInterface, DocumentQuery, FilterOp, SortDirection, Write,
};
use crate::models::{
    current_time_millis, AnalyticsEvent, EngagementSummary, SuccessRate, UserStreak,
    ANALYTICS_COLLECTION,
};

/// Latest events considered when computing a streak.
const STREAK_WINDOW: i64 = 30;

#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<dyn DatabaseInterface>,
}

impl AnalyticsService {
    pub fn new(db: Arc<dyn DatabaseInterface>) -> Self {
        Self { db }
    }

    pub async fn log_user_action(
        &self,
        user_id: &str,
        action_type: &str,
        metadata: Map<String, Value>,
    ) -> AppResult<AnalyticsEvent> {
        self.log_user_action_at(user_id, action_type, metadata, current_time_millis())
            .await
    }

    /// Log an action with an explicit timestamp; used for backfills.
    pub async fn log_user_action_at(
        &self,
        user_id: &str,
        action_type: &str,
        metadata: Map<String, Value>,
        created_at: i64,
    ) -> AppResult<AnalyticsEvent> {
        if user_id.is_empty() {
            return Err(AppError::Validation("userId is required.".to_string()));
        }
        if action_type.is_empty() {
            return Err(AppError::Validation("actionType is required.".to_string()));
        }

        let event = AnalyticsEvent {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            action_type: action_type.to_string(),
            metadata,
            created_at,
        };
        self.db
            .commit_batch(vec![Write::create(ANALYTICS_COLLECTION, &event.id, &event)?])
            .await?;
        Ok(event)
    }

    /// Most recent actions first.
    pub async fn get_user_activity(&self, user_id: &str, limit: i64) -> AppResult<Vec<AnalyticsEvent>> {
        if user_id.is_empty() {
            return Err(AppError::Validation("userId is required.".to_string()));
        }
        let docs = self
            .db
            .query(
                DocumentQuery::new(ANALYTICS_COLLECTION)
                    .where_eq("userId", user_id)
                    .order_by("createdAt", SortDirection::Desc)
                    .limit(limit),
            )
            .await?;
        decode_all(&docs)
    }

    /// Event counts per action type over the last `days` days.
    pub async fn get_community_engagement(&self, days: i64) -> AppResult<EngagementSummary> {
        let since = (Utc::now() - Duration::days(days)).timestamp_millis();
        let docs = self
            .db
            .query(DocumentQuery::new(ANALYTICS_COLLECTION).where_op("createdAt", FilterOp::Gte, since))
            .await?;

        let events: Vec<AnalyticsEvent> = decode_all(&docs)?;
        let mut actions = EngagementSummary::new();
        for event in events {
            *actions.entry(event.action_type).or_insert(0) += 1;
        }
        Ok(actions)
    }

    /// Share of `action_type` events whose metadata has a truthy `success_key`.
    pub async fn get_success_rate(&self, action_type: &str, success_key: &str) -> AppResult<SuccessRate> {
        let docs = self
            .db
            .query(DocumentQuery::new(ANALYTICS_COLLECTION).where_eq("actionType", action_type))
            .await?;
        let events: Vec<AnalyticsEvent> = decode_all(&docs)?;

        let total = events.len() as u64;
        let success = events
            .iter()
            .filter(|e| e.metadata.get(success_key).map(is_truthy).unwrap_or(false))
            .count() as u64;

        Ok(SuccessRate {
            total,
            success,
            rate: if total > 0 { success as f64 / total as f64 } else { 0.0 },
        })
    }

    pub async fn get_user_streak(&self, user_id: &str) -> AppResult<UserStreak> {
        self.get_user_streak_on(user_id, Utc::now().date_naive()).await
    }

    /// Streak relative to `today`: consecutive active days counted back from
    /// the latest active day, and only while that day is today or yesterday.
    pub async fn get_user_streak_on(&self, user_id: &str, today: NaiveDate) -> AppResult<UserStreak> {
        let events = self.get_user_activity(user_id, STREAK_WINDOW).await?;
        let days: BTreeSet<NaiveDate> = events
            .iter()
            .filter_map(|e| DateTime::<Utc>::from_timestamp_millis(e.created_at))
            .map(|t| t.date_naive())
            .collect();
        Ok(streak_from_days(&days, today))
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn streak_from_days(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> UserStreak {
    let mut latest_first = days.iter().rev();
    let Some(&last_active) = latest_first.next() else {
        return UserStreak {
            streak: 0,
            last_active: None,
        };
    };

    if (today - last_active).num_days() > 1 {
        return UserStreak {
            streak: 0,
            last_active: Some(last_active),
        };
    }

    let mut streak = 1;
    let mut prev = last_active;
    for &day in latest_first {
        if (prev - day).num_days() == 1 {
            streak += 1;
            prev = day;
        } else {
            break;
        }
    }

    UserStreak {
        streak,
        last_active: Some(last_active),
    }
}
