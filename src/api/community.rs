// Analytics, feed, badges, challenges and leaderboard routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::infrastructure::middleware::Vc;
use crate::models::{
    AnalyticsEvent, Badge, Challenge, ChallengeProgress, EngagementSummary, LeaderboardEntry,
    LeaderboardScope, Post, SuccessRate, UserStreak,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analytics/events", post(log_user_action))
        .route("/analytics/engagement", get(get_community_engagement))
        .route("/analytics/success-rate", get(get_success_rate))
        .route("/users/{user_id}/activity", get(get_user_activity))
        .route("/users/{user_id}/streak", get(get_user_streak))
        .route("/posts", post(create_post))
        .route("/feed", get(get_feed))
        .route("/badges", get(get_badges).post(create_badge))
        .route("/challenges", get(get_challenges).post(create_challenge))
        .route(
            "/challenges/{challenge_id}/progress",
            get(get_challenge_progress).post(record_challenge_progress),
        )
        .route("/leaderboard", get(get_leaderboard))
}

fn default_activity_limit() -> i64 {
    10
}

fn default_days() -> i64 {
    7
}

fn default_success_key() -> String {
    "success".to_string()
}

fn default_feed_limit() -> i64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_leaderboard_limit() -> usize {
    20
}

fn default_increment() -> u32 {
    1
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActionBody {
    pub action_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Deserialize)]
pub struct ActivityQuery {
    #[serde(default = "default_activity_limit")]
    pub limit: i64,
}

#[derive(Deserialize)]
pub struct EngagementQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessRateQuery {
    pub action_type: String,
    #[serde(default = "default_success_key")]
    pub key: String,
}

#[derive(Deserialize)]
pub struct CreatePostBody {
    pub message: String,
    #[serde(default)]
    pub streak: Option<u32>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    #[serde(default = "default_true")]
    pub friends_first: bool,
    #[serde(default = "default_feed_limit")]
    pub limit: i64,
}

#[derive(Deserialize)]
pub struct ProgressBody {
    #[serde(default = "default_increment")]
    pub increment: u32,
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub scope: LeaderboardScope,
    #[serde(default = "default_leaderboard_limit")]
    pub limit: usize,
}

pub async fn log_user_action(
    State(state): State<AppState>,
    vc: Vc,
    Json(body): Json<LogActionBody>,
) -> AppResult<(StatusCode, Json<AnalyticsEvent>)> {
    let event = state
        .analytics
        .log_user_action(vc.require_user()?, &body.action_type, body.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_user_activity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<Vec<AnalyticsEvent>>> {
    Ok(Json(state.analytics.get_user_activity(&user_id, query.limit).await?))
}

pub async fn get_user_streak(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserStreak>> {
    Ok(Json(state.analytics.get_user_streak(&user_id).await?))
}

pub async fn get_community_engagement(
    State(state): State<AppState>,
    Query(query): Query<EngagementQuery>,
) -> AppResult<Json<EngagementSummary>> {
    Ok(Json(state.analytics.get_community_engagement(query.days).await?))
}

pub async fn get_success_rate(
    State(state): State<AppState>,
    Query(query): Query<SuccessRateQuery>,
) -> AppResult<Json<SuccessRate>> {
    Ok(Json(
        state
            .analytics
            .get_success_rate(&query.action_type, &query.key)
            .await?,
    ))
}

pub async fn create_post(
    State(state): State<AppState>,
    vc: Vc,
    Json(body): Json<CreatePostBody>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let post = state
        .community
        .create_post(vc.require_user()?, &body.message, body.streak, body.confidence)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_feed(
    State(state): State<AppState>,
    vc: Vc,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Vec<Post>>> {
    let posts = state
        .community
        .get_feed(vc.user_id.as_deref(), query.friends_first, query.limit)
        .await?;
    Ok(Json(posts))
}

pub async fn get_badges(State(state): State<AppState>) -> AppResult<Json<Vec<Badge>>> {
    Ok(Json(state.community.get_badges().await?))
}

pub async fn create_badge(
    State(state): State<AppState>,
    vc: Vc,
    Json(badge): Json<Badge>,
) -> AppResult<(StatusCode, Json<Badge>)> {
    vc.require_user()?;
    Ok((StatusCode::CREATED, Json(state.community.create_badge(badge).await?)))
}

pub async fn get_challenges(State(state): State<AppState>) -> AppResult<Json<Vec<Challenge>>> {
    Ok(Json(state.community.get_challenges().await?))
}

pub async fn create_challenge(
    State(state): State<AppState>,
    vc: Vc,
    Json(challenge): Json<Challenge>,
) -> AppResult<(StatusCode, Json<Challenge>)> {
    vc.require_user()?;
    Ok((StatusCode::CREATED, Json(state.community.create_challenge(challenge).await?)))
}

pub async fn get_challenge_progress(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
) -> AppResult<Json<Vec<ChallengeProgress>>> {
    Ok(Json(state.community.get_challenge_progress(&challenge_id).await?))
}

pub async fn record_challenge_progress(
    State(state): State<AppState>,
    vc: Vc,
    Path(challenge_id): Path<String>,
    Json(body): Json<ProgressBody>,
) -> AppResult<Json<ChallengeProgress>> {
    let progress = state
        .community
        .record_challenge_progress(&challenge_id, vc.require_user()?, body.increment)
        .await?;
    Ok(Json(progress))
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    vc: Vc,
    Query(query): Query<LeaderboardQuery>,
) -> AppResult<Json<Vec<LeaderboardEntry>>> {
    let entries = state
        .community
        .get_leaderboard(vc.user_id.as_deref(), query.scope, query.limit)
        .await?;
    Ok(Json(entries))
}
