use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub ai: AiConfig,
    pub messaging: MessagingConfig,
    pub tasks: TaskQueueConfig,
    pub legacy: LegacyBehavior,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub primary_model: String,
    pub fallback_models: Vec<String>,
    pub attempts_per_model: u32,
    pub base_delay_ms: u64,
}

impl AiConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            primary_model: "models/gemini-2.5-pro".to_string(),
            fallback_models: vec![
                "models/gemini-1.5-pro".to_string(),
                "models/gemini-2.5-flash-lite".to_string(),
            ],
            attempts_per_model: 3,
            base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    pub base_url: String,
    pub project_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueueConfig {
    pub base_url: String,
    pub project_id: String,
    pub queue: String,
    pub location: String,
    pub function_base_url: String,
    pub access_token: String,
}

/// Switches for behaviour the product owner has not yet confirmed as a bug.
/// Every flag defaults to `true`, which reproduces the current behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyBehavior {
    /// Accepted booking requests land in `userIds` instead of `participantIds`.
    pub accept_writes_user_ids: bool,
    /// Booking search compares serialized UTC strings instead of instants.
    pub lexical_time_search: bool,
    /// A missing profile reads back as a blank profile.
    pub profile_exists_always_true: bool,
}

impl Default for LegacyBehavior {
    fn default() -> Self {
        Self {
            accept_writes_user_ids: true,
            lexical_time_search: true,
            profile_exists_always_true: true,
        }
    }
}

impl LegacyBehavior {
    pub fn corrected() -> Self {
        Self {
            accept_writes_user_ids: false,
            lexical_time_search: false,
            profile_exists_always_true: false,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: FromStr + Display>(key: &str, default: T) -> T {
    parse_or(key, env::var(key).ok(), default)
}

/// Parse an override, keeping `default` (with a warning) when it is malformed.
fn parse_or<T: FromStr + Display>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(variable = key, value = %value, default = %default, "invalid value, using default");
                default
            }
        },
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let ai_defaults = AiConfig::default();
        let fallback_models = match env::var("AI_FALLBACK_MODELS") {
            Ok(list) => list
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            Err(_) => ai_defaults.fallback_models.clone(),
        };

        let legacy_defaults = LegacyBehavior::default();

        Ok(Self {
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", "sqlite:aurify.db"),
            },
            server: ServerConfig {
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port: env_parsed("SERVER_PORT", 3000),
            },
            ai: AiConfig {
                api_key: env_or("GOOGLE_API_KEY", ""),
                base_url: env_or("AI_BASE_URL", &ai_defaults.base_url),
                primary_model: env_or("AI_PRIMARY_MODEL", &ai_defaults.primary_model),
                fallback_models,
                attempts_per_model: env_parsed("AI_ATTEMPTS_PER_MODEL", 3),
                base_delay_ms: env_parsed("AI_BASE_DELAY_MS", 200),
            },
            messaging: MessagingConfig {
                base_url: env_or("FCM_BASE_URL", "https://fcm.googleapis.com"),
                project_id: env_or("PROJECT_ID", ""),
                access_token: env_or("FCM_ACCESS_TOKEN", ""),
            },
            tasks: TaskQueueConfig {
                base_url: env_or("CLOUD_TASKS_BASE_URL", "https://cloudtasks.googleapis.com"),
                project_id: env_or("PROJECT_ID", ""),
                queue: env_or("QUEUE_NAME", ""),
                location: env_or("LOCATION", ""),
                function_base_url: env_or("CLOUD_FUNCTION_BASE_URL", ""),
                access_token: env_or("GOOGLE_ACCESS_TOKEN", ""),
            },
            legacy: LegacyBehavior {
                accept_writes_user_ids: env_flag(
                    "AURIFY_LEGACY_ACCEPT_WRITES_USER_IDS",
                    legacy_defaults.accept_writes_user_ids,
                ),
                lexical_time_search: env_flag(
                    "AURIFY_LEGACY_LEXICAL_TIME_SEARCH",
                    legacy_defaults.lexical_time_search,
                ),
                profile_exists_always_true: env_flag(
                    "AURIFY_LEGACY_PROFILE_EXISTS",
                    legacy_defaults.profile_exists_always_true,
                ),
            },
        })
    }

    /// Configuration for tests and local tooling: in-memory store, no
    /// provider credentials, no retry delay.
    pub fn for_tests() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            ai: AiConfig {
                base_delay_ms: 0,
                ..AiConfig::default()
            },
            messaging: MessagingConfig {
                base_url: "http://localhost".to_string(),
                project_id: "demo-aurify".to_string(),
                access_token: String::new(),
            },
            tasks: TaskQueueConfig {
                base_url: "http://localhost".to_string(),
                project_id: "demo-aurify".to_string(),
                queue: "reminders".to_string(),
                location: "us-central1".to_string(),
                function_base_url: "http://localhost:5001/demo-aurify/us-central1".to_string(),
                access_token: String::new(),
            },
            legacy: LegacyBehavior::default(),
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_defaults_reproduce_current_behaviour() {
        let legacy = LegacyBehavior::default();
        assert!(legacy.accept_writes_user_ids);
        assert!(legacy.lexical_time_search);
        assert!(legacy.profile_exists_always_true);
        assert_ne!(legacy, LegacyBehavior::corrected());
    }

    #[test]
    fn test_ai_defaults() {
        let ai = AiConfig::default();
        assert_eq!(ai.primary_model, "models/gemini-2.5-pro");
        assert_eq!(ai.fallback_models.len(), 2);
        assert_eq!(ai.attempts_per_model, 3);
        assert_eq!(ai.base_delay(), Duration::from_millis(200));
    }

    #[test]
    fn test_malformed_numeric_override_keeps_default() {
        assert_eq!(parse_or("SERVER_PORT", Some("80x".to_string()), 3000u16), 3000);
        assert_eq!(parse_or("SERVER_PORT", Some(" 8080 ".to_string()), 3000u16), 8080);
        assert_eq!(parse_or("AI_BASE_DELAY_MS", None, 200u64), 200);
    }

    #[test]
    fn test_server_address() {
        let mut config = Config::for_tests();
        config.server.port = 8080;
        assert_eq!(config.server_address(), "127.0.0.1:8080");
    }
}
