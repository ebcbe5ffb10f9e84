// ViewerContext - explicit per-request identity passed into every service call.

use crate::error::{AppError, AppResult};
use crate::models::UserProfile;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub user_id: Option<String>,
    /// Loaded on sign-in; handlers that only need the id leave it empty.
    pub profile: Option<UserProfile>,
    pub request_id: String,
}

impl ViewerContext {
    pub fn anonymous(request_id: String) -> Self {
        Self {
            user_id: None,
            profile: None,
            request_id,
        }
    }

    pub fn authenticated(user_id: impl Into<String>, request_id: String) -> Self {
        Self {
            user_id: Some(user_id.into()),
            profile: None,
            request_id,
        }
    }

    /// Viewer for a known user outside of an HTTP request (jobs, tests).
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let request_id = format!("user-{}-{}", user_id, Uuid::new_v4());
        Self::authenticated(user_id, request_id)
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// The signed-in user's id, or `Unauthorized` for anonymous viewers.
    pub fn require_user(&self) -> AppResult<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized("Sign-in required".to_string()))
    }
}
