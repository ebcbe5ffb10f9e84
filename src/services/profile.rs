// ProfileService - user profile documents at `users/{uid}`

use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::LegacyBehavior;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{fields, DatabaseInterface, DocumentQuery, Write};
use crate::models::{current_time_millis, ProfilePatch, UserProfile, USERS_COLLECTION};

#[derive(Clone)]
pub struct ProfileService {
    db: Arc<dyn DatabaseInterface>,
    legacy: LegacyBehavior,
}

impl ProfileService {
    pub fn new(db: Arc<dyn DatabaseInterface>, legacy: LegacyBehavior) -> Self {
        Self { db, legacy }
    }

    /// Read a profile. With `profile_exists_always_true` set, a missing
    /// document reads back as the blank default profile instead of `None`.
    pub async fn get_user_profile(&self, uid: &str) -> AppResult<Option<UserProfile>> {
        match self.db.get(USERS_COLLECTION, uid).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None if self.legacy.profile_exists_always_true => Ok(Some(UserProfile::default())),
            None => Ok(None),
        }
    }

    /// Overwrite the whole profile document.
    pub async fn set_user_profile(&self, uid: &str, profile: &UserProfile) -> AppResult<()> {
        self.db
            .commit_batch(vec![Write::set(USERS_COLLECTION, uid, profile)?])
            .await
    }

    /// Merge fields into an existing profile and stamp `updatedAt`.
    pub async fn update_user_profile(&self, uid: &str, patch: ProfilePatch) -> AppResult<()> {
        let mut changes = patch.into_fields()?;
        changes.insert("updatedAt".to_string(), json!(current_time_millis()));

        self.db.update(USERS_COLLECTION, uid, changes).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound(format!("Profile {} not found", uid)),
            other => other,
        })
    }

    pub async fn upsert_user_profile(&self, uid: &str, patch: ProfilePatch) -> AppResult<()> {
        match self.get_user_profile(uid).await? {
            None => {
                let now = current_time_millis();
                let mut profile = UserProfile {
                    created_at: now,
                    updated_at: now,
                    ..UserProfile::default()
                };
                profile.apply(patch);
                self.set_user_profile(uid, &profile).await
            }
            Some(_) => self.update_user_profile(uid, patch).await,
        }
    }

    /// Create the profile with default values; caller-supplied fields take
    /// precedence. An existing profile is returned unchanged.
    pub async fn create_user_profile(&self, uid: &str, patch: ProfilePatch) -> AppResult<UserProfile> {
        let now = current_time_millis();
        let mut profile = UserProfile {
            created_at: now,
            updated_at: now,
            ..UserProfile::default()
        };
        profile.apply(patch);

        match self
            .db
            .commit_batch(vec![Write::create(USERS_COLLECTION, uid, &profile)?])
            .await
        {
            Ok(()) => {
                info!(user_id = uid, "created user profile");
                Ok(profile)
            }
            Err(AppError::Conflict(_)) => {
                warn!(user_id = uid, "user profile already exists, returning stored profile");
                self.db
                    .get(USERS_COLLECTION, uid)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", uid)))?
                    .decode()
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete_user_profile(&self, uid: &str) -> AppResult<()> {
        self.db.delete(USERS_COLLECTION, uid).await?;
        Ok(())
    }

    /// Store the device token used for push delivery.
    pub async fn register_push_token(&self, uid: &str, token: &str) -> AppResult<()> {
        if token.trim().is_empty() {
            return Err(AppError::Validation("Push token must not be empty.".to_string()));
        }
        self.db
            .update(
                USERS_COLLECTION,
                uid,
                fields([
                    ("fcmToken", json!(token)),
                    ("updatedAt", json!(current_time_millis())),
                ]),
            )
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotFound(format!("Profile {} not found", uid)),
                other => other,
            })
    }

    /// `(uid, token)` for every profile with a registered push token.
    pub async fn push_tokens(&self) -> AppResult<Vec<(String, String)>> {
        let docs = self.db.query(DocumentQuery::new(USERS_COLLECTION)).await?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| {
                let token = doc.field("fcmToken")?.as_str()?.to_string();
                (!token.is_empty()).then(|| (doc.id, token))
            })
            .collect())
    }

    /// Push token of one user, if registered.
    pub async fn push_token(&self, uid: &str) -> AppResult<Option<String>> {
        Ok(self
            .db
            .get(USERS_COLLECTION, uid)
            .await?
            .and_then(|doc| doc.field("fcmToken").and_then(|t| t.as_str()).map(str::to_string))
            .filter(|t| !t.is_empty()))
    }
}
