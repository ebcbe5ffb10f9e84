// CommunityService - feed, badges, challenges and the leaderboard.

use futures::future::{try_join, try_join_all};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{
    decode_all, DatabaseInterface, DocumentQuery, Filter, SortDirection, Write,
};
use crate::models::{
    current_time_millis, pair_id, Badge, Challenge, ChallengeProgress, LeaderboardEntry,
    LeaderboardScope, Post, UserProfile, BADGES_COLLECTION, CHALLENGES_COLLECTION,
    CHALLENGE_PROGRESS_COLLECTION, POSTS_COLLECTION, USERS_COLLECTION,
};
use crate::services::analytics::AnalyticsService;
use crate::services::connection::ConnectionService;
use crate::services::rating::RatingService;

#[derive(Clone)]
pub struct CommunityService {
    db: Arc<dyn DatabaseInterface>,
    connections: Arc<ConnectionService>,
    ratings: Arc<RatingService>,
    analytics: Arc<AnalyticsService>,
}

impl CommunityService {
    pub fn new(
        db: Arc<dyn DatabaseInterface>,
        connections: Arc<ConnectionService>,
        ratings: Arc<RatingService>,
        analytics: Arc<AnalyticsService>,
    ) -> Self {
        Self {
            db,
            connections,
            ratings,
            analytics,
        }
    }

    async fn display_name(&self, user_id: &str) -> AppResult<String> {
        let name = match self.db.get(USERS_COLLECTION, user_id).await? {
            Some(doc) => doc.decode::<UserProfile>()?.display_name,
            None => String::new(),
        };
        Ok(if name.is_empty() { "User".to_string() } else { name })
    }

    pub async fn create_post(
        &self,
        user_id: &str,
        message: &str,
        streak: Option<u32>,
        confidence: Option<f64>,
    ) -> AppResult<Post> {
        if message.trim().is_empty() {
            return Err(AppError::Validation("Post message must not be empty.".to_string()));
        }

        let post = Post {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            username: self.display_name(user_id).await?,
            message: message.to_string(),
            streak,
            confidence,
            created_at: current_time_millis(),
        };
        self.db
            .commit_batch(vec![Write::create(POSTS_COLLECTION, &post.id, &post)?])
            .await?;
        info!(user_id, post_id = %post.id, "post created");
        Ok(post)
    }

    /// Newest posts. For a signed-in viewer with `friends_first`, friends'
    /// posts come first followed by the remaining global posts.
    pub async fn get_feed(&self, viewer: Option<&str>, friends_first: bool, limit: i64) -> AppResult<Vec<Post>> {
        let global_query = DocumentQuery::new(POSTS_COLLECTION)
            .order_by("createdAt", SortDirection::Desc)
            .limit(limit);

        let Some(user_id) = viewer else {
            return decode_all(&self.db.query(global_query).await?);
        };

        let friend_ids = self.connections.friend_ids(user_id).await?;
        let (friend_posts, global_posts) = try_join(
            self.posts_by(&friend_ids, limit),
            self.db.query(global_query),
        )
        .await?;
        let global_posts: Vec<Post> = decode_all(&global_posts)?;

        if !friends_first {
            return Ok(global_posts);
        }

        let mut merged = friend_posts;
        let rest: Vec<Post> = global_posts
            .into_iter()
            .filter(|g| !merged.iter().any(|f| f.id == g.id))
            .collect();
        merged.extend(rest);
        Ok(merged)
    }

    async fn posts_by(&self, user_ids: &[String], limit: i64) -> AppResult<Vec<Post>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let filters = user_ids.iter().map(|id| Filter::eq("userId", id.as_str())).collect();
        let docs = self
            .db
            .query(
                DocumentQuery::new(POSTS_COLLECTION)
                    .any_of(filters)
                    .order_by("createdAt", SortDirection::Desc)
                    .limit(limit),
            )
            .await?;
        decode_all(&docs)
    }

    pub async fn create_badge(&self, badge: Badge) -> AppResult<Badge> {
        let id = if badge.id.is_empty() { badge.key.clone() } else { badge.id.clone() };
        let badge = Badge { id, ..badge };
        self.db
            .commit_batch(vec![Write::create(BADGES_COLLECTION, &badge.id, &badge)?])
            .await?;
        Ok(badge)
    }

    pub async fn get_badges(&self) -> AppResult<Vec<Badge>> {
        decode_all(&self.db.query(DocumentQuery::new(BADGES_COLLECTION)).await?)
    }

    pub async fn create_challenge(&self, challenge: Challenge) -> AppResult<Challenge> {
        if challenge.ends_at <= challenge.starts_at {
            return Err(AppError::Validation("Challenge must end after it starts.".to_string()));
        }
        let challenge = Challenge {
            id: Uuid::new_v4().to_string(),
            ..challenge
        };
        self.db
            .commit_batch(vec![Write::create(CHALLENGES_COLLECTION, &challenge.id, &challenge)?])
            .await?;
        Ok(challenge)
    }

    /// Challenges ordered by start time.
    pub async fn get_challenges(&self) -> AppResult<Vec<Challenge>> {
        let docs = self
            .db
            .query(DocumentQuery::new(CHALLENGES_COLLECTION).order_by("startsAt", SortDirection::Asc))
            .await?;
        decode_all(&docs)
    }

    pub async fn get_challenge_progress(&self, challenge_id: &str) -> AppResult<Vec<ChallengeProgress>> {
        let docs = self
            .db
            .query(DocumentQuery::new(CHALLENGE_PROGRESS_COLLECTION).where_eq("challengeId", challenge_id))
            .await?;
        decode_all(&docs)
    }

    /// Add `increment` to the user's count for a challenge.
    pub async fn record_challenge_progress(
        &self,
        challenge_id: &str,
        user_id: &str,
        increment: u32,
    ) -> AppResult<ChallengeProgress> {
        if self.db.get(CHALLENGES_COLLECTION, challenge_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Challenge {} not found", challenge_id)));
        }

        let id = pair_id(challenge_id, user_id);
        let existing = self.db.get(CHALLENGE_PROGRESS_COLLECTION, &id).await?;
        let (count, write_guard) = match &existing {
            Some(doc) => (doc.decode::<ChallengeProgress>()?.count, Some(doc.version)),
            None => (0, None),
        };

        let progress = ChallengeProgress {
            challenge_id: challenge_id.to_string(),
            user_id: user_id.to_string(),
            count: count + increment,
            updated_at: current_time_millis(),
        };
        let write = Write::set(CHALLENGE_PROGRESS_COLLECTION, &id, &progress)?;
        let write = match write_guard {
            Some(version) => write.if_version(version),
            None => write.if_not_exists(),
        };
        self.db.commit_batch(vec![write]).await?;
        Ok(progress)
    }

    /// Rank users by current streak, then reputation average.
    pub async fn get_leaderboard(
        &self,
        viewer: Option<&str>,
        scope: LeaderboardScope,
        limit: usize,
    ) -> AppResult<Vec<LeaderboardEntry>> {
        let user_ids: Vec<String> = match scope {
            LeaderboardScope::Global => self
                .db
                .query(DocumentQuery::new(USERS_COLLECTION))
                .await?
                .into_iter()
                .map(|doc| doc.id)
                .collect(),
            LeaderboardScope::Friends => {
                let user_id = viewer.ok_or_else(|| {
                    AppError::Unauthorized("Sign-in required for the friends leaderboard".to_string())
                })?;
                let mut ids = vec![user_id.to_string()];
                ids.extend(self.connections.friend_ids(user_id).await?);
                ids
            }
        };

        let mut entries = try_join_all(user_ids.iter().map(|id| self.leaderboard_entry(id))).await?;
        entries.sort_by(|a, b| {
            b.streak
                .cmp(&a.streak)
                .then(b.reputation.partial_cmp(&a.reputation).unwrap_or(Ordering::Equal))
                .then(a.user_id.cmp(&b.user_id))
        });
        entries.truncate(limit);
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = i as u32 + 1;
        }
        Ok(entries)
    }

    async fn leaderboard_entry(&self, user_id: &str) -> AppResult<LeaderboardEntry> {
        let (streak, reputation) = try_join(
            self.analytics.get_user_streak(user_id),
            self.ratings.get_user_reputation(user_id),
        )
        .await?;
        Ok(LeaderboardEntry {
            rank: 0,
            user_id: user_id.to_string(),
            display_name: self.display_name(user_id).await?,
            streak: streak.streak,
            reputation: reputation.average,
        })
    }
}
