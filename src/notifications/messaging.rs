// Push delivery - provider trait plus the FCM HTTP v1 client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::config::MessagingConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Notification and data payload shared by every send variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FcmPayload {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

impl FcmPayload {
    pub fn notification(title: &str, body: Option<&str>) -> Self {
        Self {
            data: BTreeMap::new(),
            notification: Some(Notification {
                title: title.to_string(),
                body: body.map(str::to_string),
            }),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub token: String,
    pub payload: FcmPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MulticastMessage {
    pub tokens: Vec<String>,
    pub payload: FcmPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendResponse {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Per-message outcome of a batch send, in request order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResponse {
    pub responses: Vec<SendResponse>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl BatchResponse {
    pub fn from_responses(responses: Vec<SendResponse>) -> Self {
        let success_count = responses.iter().filter(|r| r.success).count();
        let failure_count = responses.len() - success_count;
        Self {
            responses,
            success_count,
            failure_count,
        }
    }
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Send one message, returning the provider's message id.
    async fn send(&self, message: Message) -> AppResult<String>;

    async fn send_each(&self, messages: Vec<Message>) -> AppResult<BatchResponse> {
        let mut responses = Vec::with_capacity(messages.len());
        for message in messages {
            responses.push(match self.send(message).await {
                Ok(id) => SendResponse {
                    success: true,
                    message_id: Some(id),
                    error: None,
                },
                Err(e) => SendResponse {
                    success: false,
                    message_id: None,
                    error: Some(e.to_string()),
                },
            });
        }
        Ok(BatchResponse::from_responses(responses))
    }

    async fn send_each_for_multicast(&self, message: MulticastMessage) -> AppResult<BatchResponse> {
        let payload = message.payload;
        let messages = message
            .tokens
            .into_iter()
            .map(|token| Message {
                token,
                payload: payload.clone(),
            })
            .collect();
        self.send_each(messages).await
    }
}

/// FCM HTTP v1 client.
pub struct FcmClient {
    http_client: reqwest::Client,
    base_url: String,
    project_id: String,
    access_token: String,
}

impl FcmClient {
    pub fn new(config: &MessagingConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn send_url(&self) -> String {
        format!("{}/v1/projects/{}/messages:send", self.base_url, self.project_id)
    }
}

#[derive(Deserialize)]
struct FcmSendResponse {
    name: String,
}

#[async_trait]
impl MessagingProvider for FcmClient {
    async fn send(&self, message: Message) -> AppResult<String> {
        let mut body = serde_json::to_value(&message.payload)?;
        body["token"] = json!(message.token);

        let response = self
            .http_client
            .post(self.send_url())
            .bearer_auth(&self.access_token)
            .json(&json!({ "message": body }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("FCM returned {}: {}", status, text)));
        }

        let sent: FcmSendResponse = response.json().await?;
        debug!(message_id = %sent.name, "push message sent");
        Ok(sent.name)
    }
}
