// ViewerContext middleware - builds the request-scoped viewer from headers
// and injects it into request extensions.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::infrastructure::viewer::ViewerContext;

/// Header set by the identity provider in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authentication information extracted from request
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub user_id: Option<String>,
    pub is_authenticated: bool,
}

pub async fn viewer_context_middleware(mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let auth_info = extract_auth_from_request(request.headers())?;
    let viewer_context = create_viewer_context(auth_info);

    tracing::debug!(
        request_id = %viewer_context.request_id,
        user_id = ?viewer_context.user_id,
        "viewer context created"
    );

    request.extensions_mut().insert(viewer_context);
    Ok(next.run(request).await)
}

fn extract_auth_from_request(headers: &HeaderMap) -> Result<AuthInfo, StatusCode> {
    if let Some(value) = headers.get(USER_ID_HEADER) {
        let user_id = value.to_str().map_err(|_| StatusCode::BAD_REQUEST)?.trim();
        if !user_id.is_empty() {
            return Ok(AuthInfo {
                user_id: Some(user_id.to_string()),
                is_authenticated: true,
            });
        }
    }

    Ok(AuthInfo {
        user_id: None,
        is_authenticated: false,
    })
}

fn create_viewer_context(auth_info: AuthInfo) -> Arc<ViewerContext> {
    let request_id = format!("req-{}", Uuid::new_v4());
    let viewer_context = match (auth_info.is_authenticated, auth_info.user_id) {
        (true, Some(user_id)) => ViewerContext::authenticated(user_id, request_id),
        _ => ViewerContext::anonymous(request_id),
    };
    Arc::new(viewer_context)
}
