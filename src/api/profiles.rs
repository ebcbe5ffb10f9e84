use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use super::ensure_self;
use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::infrastructure::middleware::Vc;
use crate::models::{ProfilePatch, UserProfile};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/sign-in", post(sign_in))
        .route(
            "/profiles/{uid}",
            get(get_profile)
                .post(create_profile)
                .put(set_profile)
                .patch(update_profile)
                .delete(delete_profile),
        )
        .route("/profiles/{uid}/push-token", put(register_push_token))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Deserialize)]
pub struct PushTokenRequest {
    pub token: String,
}

pub async fn sign_in(
    State(state): State<AppState>,
    vc: Vc,
    Json(req): Json<SignInRequest>,
) -> AppResult<Json<UserProfile>> {
    let user_id = vc.require_user()?;
    let session = state.auth.sign_in(user_id, req.display_name, req.photo_url).await?;
    session
        .profile
        .map(Json)
        .ok_or_else(|| AppError::Internal("Signed-in viewer has no profile".to_string()))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> AppResult<Json<UserProfile>> {
    state
        .profiles
        .get_user_profile(&uid)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", uid)))
}

pub async fn create_profile(
    State(state): State<AppState>,
    vc: Vc,
    Path(uid): Path<String>,
    Json(patch): Json<ProfilePatch>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    ensure_self(&vc, &uid)?;
    let profile = state.profiles.create_user_profile(&uid, patch).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn set_profile(
    State(state): State<AppState>,
    vc: Vc,
    Path(uid): Path<String>,
    Json(profile): Json<UserProfile>,
) -> AppResult<StatusCode> {
    ensure_self(&vc, &uid)?;
    state.profiles.set_user_profile(&uid, &profile).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_profile(
    State(state): State<AppState>,
    vc: Vc,
    Path(uid): Path<String>,
    Json(patch): Json<ProfilePatch>,
) -> AppResult<StatusCode> {
    ensure_self(&vc, &uid)?;
    state.profiles.update_user_profile(&uid, patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_profile(
    State(state): State<AppState>,
    vc: Vc,
    Path(uid): Path<String>,
) -> AppResult<StatusCode> {
    ensure_self(&vc, &uid)?;
    state.profiles.delete_user_profile(&uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn register_push_token(
    State(state): State<AppState>,
    vc: Vc,
    Path(uid): Path<String>,
    Json(req): Json<PushTokenRequest>,
) -> AppResult<StatusCode> {
    ensure_self(&vc, &uid)?;
    state.profiles.register_push_token(&uid, &req.token).await?;
    Ok(StatusCode::NO_CONTENT)
}
