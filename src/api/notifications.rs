// Serverless trigger endpoints. Callers only learn whether the request was
// processed; delivery details go to the logs.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::notifications::{DeliveryReport, FcmPayload};

pub const PROCESSED: &str = "Notification Request Processed";
pub const FAILED: &str = "Failed to process notification request";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sendFeedbackNotification", post(send_feedback_notification))
        .route("/sendSessionReminder", post(send_session_reminder))
        .route("/dailyReminder", post(daily_reminder))
}

#[derive(Deserialize)]
pub struct FeedbackNotificationRequest {
    pub tokens: Vec<String>,
    pub payloads: Vec<FcmPayload>,
}

#[derive(Deserialize)]
pub struct SessionReminderRequest {
    pub tokens: Vec<String>,
}

fn parse<T: serde::de::DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    Ok(serde_json::from_slice(body)?)
}

fn outcome(trigger: &str, result: AppResult<DeliveryReport>) -> Response {
    match result {
        Ok(report) => {
            info!(
                trigger,
                success_count = report.success_count,
                failure_count = report.failure_count,
                "notification request processed"
            );
            (StatusCode::OK, PROCESSED).into_response()
        }
        Err(e) => {
            error!(trigger, error = %e, "error processing notification request");
            (StatusCode::INTERNAL_SERVER_ERROR, FAILED).into_response()
        }
    }
}

pub async fn send_feedback_notification(State(state): State<AppState>, body: Bytes) -> Response {
    let result = match parse::<FeedbackNotificationRequest>(&body) {
        Ok(req) => {
            state
                .notifications
                .send_multiple_notifications(req.tokens, req.payloads)
                .await
        }
        Err(e) => Err(e),
    };
    outcome("sendFeedbackNotification", result)
}

pub async fn send_session_reminder(State(state): State<AppState>, body: Bytes) -> Response {
    let result = match parse::<SessionReminderRequest>(&body) {
        Ok(req) => Ok(state.notifications.send_session_reminder(req.tokens).await),
        Err(e) => Err(e),
    };
    outcome("sendSessionReminder", result)
}

pub async fn daily_reminder(State(state): State<AppState>) -> Response {
    outcome("dailyReminder", state.notifications.daily_reminder().await)
}
