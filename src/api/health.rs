use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::error::AppResult;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state.db.health_check().await?;
    Ok(Json(json!({
        "status": "ok",
        "service": "aurify",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
