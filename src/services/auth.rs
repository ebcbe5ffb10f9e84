// AuthSession - turns a verified identity into a ViewerContext with a loaded profile.

use std::sync::Arc;
use tracing::info;

use crate::error::AppResult;
use crate::infrastructure::viewer::ViewerContext;
use crate::models::ProfilePatch;
use crate::services::profile::ProfileService;

#[derive(Clone)]
pub struct AuthSession {
    profiles: Arc<ProfileService>,
}

impl AuthSession {
    pub fn new(profiles: Arc<ProfileService>) -> Self {
        Self { profiles }
    }

    /// Load the user's profile, creating the default one on first sign-in.
    pub async fn sign_in(
        &self,
        user_id: &str,
        display_name: Option<String>,
        photo_url: Option<String>,
    ) -> AppResult<ViewerContext> {
        let profile = match self.profiles.get_user_profile(user_id).await? {
            Some(profile) => profile,
            None => {
                info!(user_id, "first sign-in, creating profile");
                self.profiles
                    .create_user_profile(
                        user_id,
                        ProfilePatch {
                            display_name,
                            profile_picture: photo_url,
                            ..Default::default()
                        },
                    )
                    .await?
            }
        };

        Ok(ViewerContext::for_user(user_id).with_profile(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LegacyBehavior;
    use crate::infrastructure::{DatabaseInterface, SqliteDatabase};
    use crate::models::USERS_COLLECTION;

    async fn session(legacy: LegacyBehavior) -> (AuthSession, Arc<dyn DatabaseInterface>) {
        let db: Arc<dyn DatabaseInterface> = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let profiles = Arc::new(ProfileService::new(db.clone(), legacy));
        (AuthSession::new(profiles), db)
    }

    #[tokio::test]
    async fn test_first_sign_in_creates_profile() {
        let (auth, db) = session(LegacyBehavior::corrected()).await;
        let vc = auth
            .sign_in("u1", Some("Grace".into()), Some("https://img/1.png".into()))
            .await
            .unwrap();

        assert_eq!(vc.user_id.as_deref(), Some("u1"));
        let profile = vc.profile.unwrap();
        assert_eq!(profile.display_name, "Grace");
        assert_eq!(profile.profile_picture, "https://img/1.png");
        assert!(db.get(USERS_COLLECTION, "u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_legacy_sign_in_never_creates_profile() {
        let (auth, db) = session(LegacyBehavior::default()).await;
        let vc = auth.sign_in("u1", Some("Grace".into()), None).await.unwrap();

        assert_eq!(vc.profile.unwrap().display_name, "John Doe");
        assert!(db.get(USERS_COLLECTION, "u1").await.unwrap().is_none());
    }
}
