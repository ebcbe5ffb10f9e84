// Connection graph and rating routes. The acting user is always the viewer.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::infrastructure::middleware::Vc;
use crate::models::{Connection, FriendRequest, Rating, ReputationSummary};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/friend-requests", post(send_friend_request))
        .route("/friend-requests/incoming", get(get_pending_requests))
        .route("/friend-requests/outgoing", get(get_outgoing_requests))
        .route("/friend-requests/to/{user_id}", delete(cancel_friend_request))
        .route("/friend-requests/{request_id}/accept", post(accept_friend_request))
        .route("/friend-requests/{request_id}/reject", post(reject_friend_request))
        .route("/connections/{friend_id}", delete(unfriend))
        .route("/blocks", post(block_user))
        .route("/blocks/{user_id}", delete(unblock_user))
        .route("/users/{user_id}/connections", get(get_connections))
        .route("/users/{user_id}/relationship", get(get_relationship))
        .route("/users/{user_id}/ratings", get(get_user_ratings).post(rate_user))
        .route("/users/{user_id}/reputation", get(get_user_reputation))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestBody {
    pub to_user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBody {
    pub user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateUserBody {
    pub session_id: String,
    pub score: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub connected: bool,
    pub blocked: bool,
}

pub async fn send_friend_request(
    State(state): State<AppState>,
    vc: Vc,
    Json(body): Json<FriendRequestBody>,
) -> AppResult<(StatusCode, Json<FriendRequest>)> {
    let from = vc.require_user()?;
    let request = state.connections.send_friend_request(from, &body.to_user_id).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn cancel_friend_request(
    State(state): State<AppState>,
    vc: Vc,
    Path(user_id): Path<String>,
) -> AppResult<StatusCode> {
    state
        .connections
        .cancel_friend_request(vc.require_user()?, &user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn accept_friend_request(
    State(state): State<AppState>,
    vc: Vc,
    Path(request_id): Path<String>,
) -> AppResult<StatusCode> {
    state
        .connections
        .accept_friend_request(vc.require_user()?, &request_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reject_friend_request(
    State(state): State<AppState>,
    vc: Vc,
    Path(request_id): Path<String>,
) -> AppResult<StatusCode> {
    state
        .connections
        .reject_friend_request(vc.require_user()?, &request_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_pending_requests(
    State(state): State<AppState>,
    vc: Vc,
) -> AppResult<Json<Vec<FriendRequest>>> {
    let requests = state.connections.get_pending_requests(vc.require_user()?).await?;
    Ok(Json(requests))
}

pub async fn get_outgoing_requests(
    State(state): State<AppState>,
    vc: Vc,
) -> AppResult<Json<Vec<FriendRequest>>> {
    let requests = state.connections.get_outgoing_requests(vc.require_user()?).await?;
    Ok(Json(requests))
}

pub async fn unfriend(
    State(state): State<AppState>,
    vc: Vc,
    Path(friend_id): Path<String>,
) -> AppResult<StatusCode> {
    state.connections.unfriend(vc.require_user()?, &friend_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn block_user(
    State(state): State<AppState>,
    vc: Vc,
    Json(body): Json<BlockBody>,
) -> AppResult<StatusCode> {
    state.connections.block_user(vc.require_user()?, &body.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unblock_user(
    State(state): State<AppState>,
    vc: Vc,
    Path(user_id): Path<String>,
) -> AppResult<StatusCode> {
    state.connections.unblock_user(vc.require_user()?, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_connections(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<Connection>>> {
    Ok(Json(state.connections.get_connections(&user_id).await?))
}

/// How the viewer relates to `user_id`.
pub async fn get_relationship(
    State(state): State<AppState>,
    vc: Vc,
    Path(user_id): Path<String>,
) -> AppResult<Json<Relationship>> {
    let me = vc.require_user()?;
    let (connected, blocked) = futures::try_join!(
        state.connections.is_connected(me, &user_id),
        state.connections.is_blocked(me, &user_id),
    )?;
    Ok(Json(Relationship { connected, blocked }))
}

pub async fn rate_user(
    State(state): State<AppState>,
    vc: Vc,
    Path(user_id): Path<String>,
    Json(body): Json<RateUserBody>,
) -> AppResult<Json<ReputationSummary>> {
    let summary = state
        .ratings
        .rate_user(&user_id, vc.require_user()?, &body.session_id, body.score, body.comment)
        .await?;
    Ok(Json(summary))
}

pub async fn get_user_ratings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<Rating>>> {
    Ok(Json(state.ratings.get_user_ratings(&user_id).await?))
}

pub async fn get_user_reputation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ReputationSummary>> {
    Ok(Json(state.ratings.get_user_reputation(&user_id).await?))
}
