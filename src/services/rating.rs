// RatingService - per-session ratings and the cached reputation summary.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{
    decode_all, fields, DatabaseInterface, Document, DocumentQuery, Write,
};
use crate::models::rating::{MAX_SCORE, MIN_SCORE};
use crate::models::{
    current_time_millis, pair_id, ratings_collection, Rating, ReputationSummary,
    REPUTATION_COLLECTION,
};

/// Optimistic commit attempts before a contended rating gives up.
pub const RATING_COMMIT_ATTEMPTS: u32 = 10;

#[derive(Clone)]
pub struct RatingService {
    db: Arc<dyn DatabaseInterface>,
}

impl RatingService {
    pub fn new(db: Arc<dyn DatabaseInterface>) -> Self {
        Self { db }
    }

    /// Rate `target_user_id` for a session. A second rating for the same
    /// `(from_user_id, session_id)` replaces the first and the average is
    /// recomputed from every stored rating; a new rating folds into the running
    /// mean. Rating row and summary commit together under version checks.
    pub async fn rate_user(
        &self,
        target_user_id: &str,
        from_user_id: &str,
        session_id: &str,
        score: i64,
        comment: Option<String>,
    ) -> AppResult<ReputationSummary> {
        if target_user_id == from_user_id {
            return Err(AppError::Validation("Users cannot rate themselves.".to_string()));
        }
        if score < i64::from(MIN_SCORE) || score > i64::from(MAX_SCORE) {
            return Err(AppError::Validation("Score must be between 1 and 5.".to_string()));
        }
        let score = score as u8;
        let comment = comment.filter(|c| !c.trim().is_empty());

        for attempt in 1..=RATING_COMMIT_ATTEMPTS {
            match self
                .try_rate(target_user_id, from_user_id, session_id, score, comment.clone())
                .await
            {
                Ok(summary) => {
                    info!(
                        target = target_user_id,
                        from = from_user_id,
                        session = session_id,
                        average = summary.average,
                        count = summary.count,
                        "rating recorded"
                    );
                    return Ok(summary);
                }
                Err(AppError::Conflict(reason)) => {
                    debug!(attempt, %reason, "rating commit conflicted, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(
            "Rating could not be saved because of concurrent updates.".to_string(),
        ))
    }

    async fn try_rate(
        &self,
        target_user_id: &str,
        from_user_id: &str,
        session_id: &str,
        score: u8,
        comment: Option<String>,
    ) -> AppResult<ReputationSummary> {
        let collection = ratings_collection(target_user_id);
        let rating_id = pair_id(from_user_id, session_id);
        let now = current_time_millis();

        let existing = self.db.get(&collection, &rating_id).await?;
        let reputation_doc = self.db.get(REPUTATION_COLLECTION, target_user_id).await?;

        let (rating_write, summary) = match existing {
            Some(existing) => {
                let docs = self.db.query(DocumentQuery::new(collection.clone())).await?;
                let ratings: Vec<Rating> = decode_all(&docs)?;
                let scores: Vec<u8> = ratings
                    .iter()
                    .map(|r| if r.id == rating_id { score } else { r.score })
                    .collect();

                let write = Write::update(
                    &collection,
                    &rating_id,
                    fields([
                        ("score", json!(score)),
                        ("comment", comment.map(Value::String).unwrap_or(Value::Null)),
                        ("updatedAt", json!(now)),
                    ]),
                )
                .if_version(existing.version);
                (write, ReputationSummary::from_scores(&scores))
            }
            None => {
                let rating = Rating {
                    id: rating_id.clone(),
                    from_user_id: from_user_id.to_string(),
                    session_id: session_id.to_string(),
                    score,
                    comment,
                    created_at: now,
                    updated_at: None,
                };
                let current = decode_summary(reputation_doc.as_ref())?;
                (
                    Write::create(&collection, &rating_id, &rating)?,
                    current.with_score(score),
                )
            }
        };

        let summary_write = Write::set(REPUTATION_COLLECTION, target_user_id, summary)?;
        let summary_write = match &reputation_doc {
            Some(doc) => summary_write.if_version(doc.version),
            None => summary_write.if_not_exists(),
        };

        self.db.commit_batch(vec![rating_write, summary_write]).await?;
        Ok(summary)
    }

    pub async fn get_user_ratings(&self, user_id: &str) -> AppResult<Vec<Rating>> {
        let docs = self
            .db
            .query(DocumentQuery::new(ratings_collection(user_id)))
            .await?;
        decode_all(&docs)
    }

    /// Reputation summary, `{average: 0, count: 0}` when the user has none.
    pub async fn get_user_reputation(&self, user_id: &str) -> AppResult<ReputationSummary> {
        let doc = self.db.get(REPUTATION_COLLECTION, user_id).await?;
        decode_summary(doc.as_ref())
    }
}

fn decode_summary(doc: Option<&Document>) -> AppResult<ReputationSummary> {
    match doc {
        Some(doc) => doc.decode(),
        None => Ok(ReputationSummary::default()),
    }
}
