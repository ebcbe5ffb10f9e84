use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::infrastructure::middleware::Vc;
use crate::models::{BookingFormInput, BookingSearchParams, BookingSession};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(post_booking_session))
        .route("/bookings/mine", get(get_scheduled_sessions))
        .route("/bookings/search", get(search_booking_sessions))
        .route(
            "/bookings/{session_id}",
            get(get_booking_session).delete(delete_booking_session),
        )
        .route("/bookings/{session_id}/requests", post(request_to_join))
        .route(
            "/bookings/{session_id}/requests/{user_id}/accept",
            post(accept_booking_request),
        )
        .route(
            "/bookings/{session_id}/requests/{user_id}/reject",
            post(reject_booking_request),
        )
}

pub async fn post_booking_session(
    State(state): State<AppState>,
    vc: Vc,
    Json(input): Json<BookingFormInput>,
) -> AppResult<(StatusCode, Json<BookingSession>)> {
    let session = state.bookings.post_booking_session(&vc, input).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_scheduled_sessions(
    State(state): State<AppState>,
    vc: Vc,
) -> AppResult<Json<Vec<BookingSession>>> {
    Ok(Json(state.bookings.get_cur_user_scheduled_sessions(&vc).await?))
}

pub async fn search_booking_sessions(
    State(state): State<AppState>,
    Query(params): Query<BookingSearchParams>,
) -> AppResult<Json<Vec<BookingSession>>> {
    Ok(Json(state.bookings.search_booking_sessions(params).await?))
}

pub async fn get_booking_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<BookingSession>> {
    Ok(Json(state.bookings.get_booking_session_info(&session_id).await?))
}

pub async fn delete_booking_session(
    State(state): State<AppState>,
    vc: Vc,
    Path(session_id): Path<String>,
) -> AppResult<StatusCode> {
    state.bookings.delete_booking_session(&vc, &session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn request_to_join(
    State(state): State<AppState>,
    vc: Vc,
    Path(session_id): Path<String>,
) -> AppResult<Json<BookingSession>> {
    Ok(Json(state.bookings.request_to_join_booking(&vc, &session_id).await?))
}

pub async fn accept_booking_request(
    State(state): State<AppState>,
    vc: Vc,
    Path((session_id, user_id)): Path<(String, String)>,
) -> AppResult<Json<BookingSession>> {
    let session = state
        .bookings
        .accept_booking_request(&vc, &session_id, &user_id)
        .await?;
    Ok(Json(session))
}

pub async fn reject_booking_request(
    State(state): State<AppState>,
    vc: Vc,
    Path((session_id, user_id)): Path<(String, String)>,
) -> AppResult<Json<BookingSession>> {
    let session = state
        .bookings
        .reject_booking_request(&vc, &session_id, &user_id)
        .await?;
    Ok(Json(session))
}
