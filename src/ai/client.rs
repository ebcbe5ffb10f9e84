// Generation client - provider trait, Gemini REST client and the model chain
// that retries each model with exponential backoff before moving on.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Generate text for `prompt` with the given model id.
    async fn generate_content(&self, model_id: &str, prompt: &str) -> AppResult<String>;
}

pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(config: &AiConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn generate_url(&self, model_id: &str) -> String {
        format!("{}/v1beta/{}:generateContent", self.base_url, model_id)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate_content(&self, model_id: &str, prompt: &str) -> AppResult<String> {
        if self.api_key.is_empty() {
            return Err(AppError::ConfigurationError(
                "No AI API key configured".to_string(),
            ));
        }

        let response = self
            .http_client
            .post(self.generate_url(model_id))
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("{} returned {}: {}", model_id, status, text)));
        }

        let body: GenerateResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AppError::Provider(format!("{} returned no text", model_id)));
        }
        Ok(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts_per_model: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait after the `attempt`-th failure (1-based): `2^attempt * base_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Ordered list of model ids tried against one provider.
pub struct ModelChain {
    provider: Arc<dyn GenerativeModel>,
    model_ids: Vec<String>,
    policy: RetryPolicy,
}

impl ModelChain {
    pub fn new(provider: Arc<dyn GenerativeModel>, model_ids: Vec<String>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            model_ids,
            policy,
        }
    }

    pub fn from_config(provider: Arc<dyn GenerativeModel>, config: &AiConfig) -> Self {
        let mut model_ids = vec![config.primary_model.clone()];
        model_ids.extend(config.fallback_models.iter().cloned());
        Self::new(
            provider,
            model_ids,
            RetryPolicy {
                attempts_per_model: config.attempts_per_model.max(1),
                base_delay: config.base_delay(),
            },
        )
    }

    pub fn model_ids(&self) -> &[String] {
        &self.model_ids
    }

    /// Try every model in order. A configuration error stops the chain at once.
    pub async fn generate(&self, prompt: &str) -> AppResult<String> {
        for model_id in &self.model_ids {
            let mut attempt = 0;
            while attempt < self.policy.attempts_per_model {
                match self.provider.generate_content(model_id, prompt).await {
                    Ok(text) => {
                        debug!(model = %model_id, attempt = attempt + 1, "generation succeeded");
                        return Ok(text);
                    }
                    Err(e @ AppError::ConfigurationError(_)) => return Err(e),
                    Err(e) => {
                        attempt += 1;
                        warn!(model = %model_id, attempt, error = %e, "generation attempt failed");
                        if attempt < self.policy.attempts_per_model {
                            tokio::time::sleep(self.policy.delay_after(attempt)).await;
                        }
                    }
                }
            }
            warn!(model = %model_id, "falling back to next model");
        }
        Err(AppError::Provider("All models failed".to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Replays scripted replies in order; every call is recorded.
    #[derive(Default)]
    pub(crate) struct ScriptedModel {
        replies: Mutex<VecDeque<AppResult<String>>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(replies: Vec<AppResult<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn replying(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        pub(crate) fn failing() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate_content(&self, model_id: &str, _prompt: &str) -> AppResult<String> {
            self.calls.lock().await.push(model_id.to_string());
            self.replies
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Provider("503 model overloaded".into())))
        }
    }

    pub(crate) fn chain(model: Arc<ScriptedModel>) -> ModelChain {
        let mut config = AiConfig::default();
        config.base_delay_ms = 0;
        ModelChain::from_config(model, &config)
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            attempts_per_model: 3,
            base_delay: Duration::from_millis(200),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(400));
        assert_eq!(policy.delay_after(2), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_chain_exhausts_every_model() {
        let model = Arc::new(ScriptedModel::failing());
        let err = chain(model.clone()).generate("prompt").await.unwrap_err();
        assert_eq!(err.to_string(), "Provider error: All models failed");

        let calls = model.calls.lock().await;
        assert_eq!(calls.len(), 9);
        assert_eq!(calls[0], "models/gemini-2.5-pro");
        assert_eq!(calls[3], "models/gemini-1.5-pro");
        assert_eq!(calls[8], "models/gemini-2.5-flash-lite");
    }

    #[tokio::test]
    async fn test_chain_falls_back_to_next_model() {
        let replies = vec![
            Err(AppError::Provider("429".into())),
            Err(AppError::Provider("429".into())),
            Err(AppError::Provider("429".into())),
            Ok("from fallback".to_string()),
        ];
        let model = Arc::new(ScriptedModel::new(replies));
        let text = chain(model.clone()).generate("prompt").await.unwrap();

        assert_eq!(text, "from fallback");
        assert_eq!(model.calls.lock().await.last().map(String::as_str), Some("models/gemini-1.5-pro"));
    }

    #[tokio::test]
    async fn test_missing_key_stops_immediately() {
        let client = GeminiClient::new(&AiConfig::default()).unwrap();
        let chain = ModelChain::from_config(Arc::new(client), &AiConfig::default());
        let err = chain.generate("prompt").await.unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));
    }

    #[test]
    fn test_generate_url() {
        let client = GeminiClient::new(&AiConfig::default()).unwrap();
        assert_eq!(
            client.generate_url("models/gemini-2.5-pro"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }
}
