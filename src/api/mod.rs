// HTTP surface - serverless trigger endpoints at the root and the REST API
// under /api/v1. Every request passes through the viewer context middleware.

pub mod bookings;
pub mod coaching;
pub mod community;
pub mod health;
pub mod notifications;
pub mod profiles;
pub mod social;

use axum::{middleware, Router};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::infrastructure::middleware::viewer_context_middleware;
use crate::infrastructure::ViewerContext;

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(profiles::routes())
        .merge(social::routes())
        .merge(bookings::routes())
        .merge(community::routes())
        .merge(coaching::routes());

    Router::new()
        .merge(health::routes())
        .merge(notifications::routes())
        .nest("/api/v1", api)
        .layer(middleware::from_fn(viewer_context_middleware))
        .with_state(state)
}

/// The signed-in viewer must be `user_id`.
pub(crate) fn ensure_self(vc: &ViewerContext, user_id: &str) -> AppResult<()> {
    if vc.require_user()? != user_id {
        return Err(AppError::Forbidden(
            "You can only change your own data.".to_string(),
        ));
    }
    Ok(())
}
