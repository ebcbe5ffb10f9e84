use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Male,
    Female,
    #[default]
    Animal,
}

/// Profile document stored at `users/{uid}`. Missing fields decode to the
/// default profile values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub display_name: String,
    pub username: String,
    pub bio: String,
    pub color: String,
    pub profile_picture: String,
    pub banner: String,
    pub goals: Vec<String>,
    pub resume_file: String,
    pub jellyfish_name: String,
    pub voice: Voice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            display_name: "John Doe".to_string(),
            username: "username".to_string(),
            bio: "Hi! I am a jellyfish!".to_string(),
            color: "#6d5ef5".to_string(),
            profile_picture: String::new(),
            banner: String::new(),
            goals: Vec::new(),
            resume_file: String::new(),
            jellyfish_name: "Auri".to_string(),
            voice: Voice::Animal,
            fcm_token: None,
            created_at: 0,
            updated_at: 0,
        }
    }
}

impl UserProfile {
    pub fn apply(&mut self, patch: ProfilePatch) {
        if let Some(v) = patch.display_name {
            self.display_name = v;
        }
        if let Some(v) = patch.username {
            self.username = v;
        }
        if let Some(v) = patch.bio {
            self.bio = v;
        }
        if let Some(v) = patch.color {
            self.color = v;
        }
        if let Some(v) = patch.profile_picture {
            self.profile_picture = v;
        }
        if let Some(v) = patch.banner {
            self.banner = v;
        }
        if let Some(v) = patch.goals {
            self.goals = v;
        }
        if let Some(v) = patch.resume_file {
            self.resume_file = v;
        }
        if let Some(v) = patch.jellyfish_name {
            self.jellyfish_name = v;
        }
        if let Some(v) = patch.voice {
            self.voice = v;
        }
        if let Some(v) = patch.fcm_token {
            self.fcm_token = Some(v);
        }
    }
}

/// Partial profile used by update and create calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jellyfish_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<Voice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
}

impl ProfilePatch {
    pub fn into_fields(self) -> AppResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}
