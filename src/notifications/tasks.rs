// Delayed sends - task queue trait plus the Cloud Tasks REST client.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use crate::config::TaskQueueConfig;
use crate::error::{AppError, AppResult};

/// A future POST to `{function_base_url}/{function_name}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub function_name: String,
    pub schedule_time: DateTime<Utc>,
    pub body: Option<Value>,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Schedule the request, returning the task name.
    async fn enqueue(&self, request: TaskRequest) -> AppResult<String>;
}

pub struct CloudTasksClient {
    http_client: reqwest::Client,
    config: TaskQueueConfig,
}

#[derive(Deserialize)]
struct CreatedTask {
    name: String,
}

impl CloudTasksClient {
    pub fn new(config: &TaskQueueConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.config.project_id, self.config.location, self.config.queue
        )
    }

    fn create_url(&self) -> String {
        format!(
            "{}/v2/{}/tasks",
            self.config.base_url.trim_end_matches('/'),
            self.queue_path()
        )
    }

    /// Task resource for the create call. The HTTP body is base64 encoded.
    fn build_task(&self, request: &TaskRequest) -> AppResult<Value> {
        let mut http_request = json!({
            "httpMethod": "POST",
            "url": format!(
                "{}/{}",
                self.config.function_base_url.trim_end_matches('/'),
                request.function_name
            ),
            "headers": { "Content-Type": "application/json" },
        });
        if let Some(body) = &request.body {
            let raw = serde_json::to_vec(body)?;
            http_request["body"] = json!(base64::engine::general_purpose::STANDARD.encode(raw));
        }

        Ok(json!({
            "task": {
                "httpRequest": http_request,
                "scheduleTime": request.schedule_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            }
        }))
    }
}

#[async_trait]
impl TaskQueue for CloudTasksClient {
    async fn enqueue(&self, request: TaskRequest) -> AppResult<String> {
        let task = self.build_task(&request)?;
        let response = self
            .http_client
            .post(self.create_url())
            .bearer_auth(&self.config.access_token)
            .json(&task)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("Cloud Tasks returned {}: {}", status, text)));
        }

        let created: CreatedTask = response.json().await?;
        info!(
            task = %created.name,
            function = %request.function_name,
            schedule_time = %request.schedule_time,
            "task enqueued"
        );
        Ok(created.name)
    }
}
