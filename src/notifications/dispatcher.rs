// NotificationDispatcher - push fan-out for booking changes, reminders and
// client-requested sends. Delivery is best effort: per-recipient failures are
// logged and reported, never raised.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::messaging::{BatchResponse, FcmPayload, Message, MessagingProvider, MulticastMessage};
use super::tasks::{TaskQueue, TaskRequest};
use crate::error::{AppError, AppResult};
use crate::models::BookingSession;
use crate::services::{BookingObserver, ProfileService};

pub const SESSION_REMINDER_FUNCTION: &str = "sendSessionReminder";
pub const SESSION_REMINDER_TITLE: &str = "Meeting starts in 10 minutes";
pub const DAILY_REMINDER_TITLE: &str = "Daily check-in";
pub const DAILY_REMINDER_BODY: &str = "Log in for rewards";
pub const JOIN_REQUEST_TITLE: &str = "Join request";
pub const JOIN_REQUEST_BODY: &str = "These users want to join your session";
pub const PARTICIPANTS_TITLE: &str = "New participants";
pub const PARTICIPANTS_BODY: &str = "New users joined your session";

/// Minutes before session start at which the reminder fires.
const REMINDER_LEAD_MINUTES: i64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub failed_tokens: Vec<String>,
}

impl DeliveryReport {
    fn from_batch(tokens: &[String], batch: &BatchResponse) -> Self {
        let failed_tokens = batch
            .responses
            .iter()
            .zip(tokens)
            .filter(|(response, _)| !response.success)
            .map(|(_, token)| token.clone())
            .collect();
        Self {
            success_count: batch.success_count,
            failure_count: batch.failure_count,
            failed_tokens,
        }
    }

    fn all_failed(tokens: &[String]) -> Self {
        Self {
            success_count: 0,
            failure_count: tokens.len(),
            failed_tokens: tokens.to_vec(),
        }
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    messaging: Arc<dyn MessagingProvider>,
    tasks: Arc<dyn TaskQueue>,
    profiles: Arc<ProfileService>,
}

impl NotificationDispatcher {
    pub fn new(
        messaging: Arc<dyn MessagingProvider>,
        tasks: Arc<dyn TaskQueue>,
        profiles: Arc<ProfileService>,
    ) -> Self {
        Self {
            messaging,
            tasks,
            profiles,
        }
    }

    pub async fn send_single_notification(&self, token: &str, payload: FcmPayload) -> DeliveryReport {
        let message = Message {
            token: token.to_string(),
            payload,
        };
        match self.messaging.send(message).await {
            Ok(message_id) => {
                info!(message_id = %message_id, "notification sent");
                DeliveryReport {
                    success_count: 1,
                    failure_count: 0,
                    failed_tokens: Vec::new(),
                }
            }
            Err(e) => {
                error!(error = %e, "error sending notification");
                DeliveryReport::all_failed(&[token.to_string()])
            }
        }
    }

    /// One payload per token, index-aligned.
    #[instrument(skip_all, fields(count = tokens.len()))]
    pub async fn send_multiple_notifications(
        &self,
        tokens: Vec<String>,
        payloads: Vec<FcmPayload>,
    ) -> AppResult<DeliveryReport> {
        if tokens.len() != payloads.len() {
            return Err(AppError::Validation(
                "Tokens and payloads must have the same length".to_string(),
            ));
        }
        if tokens.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let messages = tokens
            .iter()
            .zip(payloads)
            .map(|(token, payload)| Message {
                token: token.clone(),
                payload,
            })
            .collect();

        Ok(match self.messaging.send_each(messages).await {
            Ok(batch) => self.report(&tokens, &batch),
            Err(e) => {
                error!(error = %e, "error sending notifications");
                DeliveryReport::all_failed(&tokens)
            }
        })
    }

    /// Same payload to every token.
    #[instrument(skip_all, fields(count = tokens.len()))]
    pub async fn multicast_notifications(&self, tokens: Vec<String>, payload: FcmPayload) -> DeliveryReport {
        if tokens.is_empty() {
            return DeliveryReport::default();
        }

        let message = MulticastMessage {
            tokens: tokens.clone(),
            payload,
        };
        match self.messaging.send_each_for_multicast(message).await {
            Ok(batch) => self.report(&tokens, &batch),
            Err(e) => {
                error!(error = %e, "error sending multicast notification");
                DeliveryReport::all_failed(&tokens)
            }
        }
    }

    pub async fn send_session_reminder(&self, tokens: Vec<String>) -> DeliveryReport {
        self.multicast_notifications(tokens, FcmPayload::notification(SESSION_REMINDER_TITLE, None))
            .await
    }

    /// Fan the daily check-in out to every registered device.
    pub async fn daily_reminder(&self) -> AppResult<DeliveryReport> {
        let tokens: Vec<String> = self
            .profiles
            .push_tokens()
            .await?
            .into_iter()
            .map(|(_, token)| token)
            .collect();

        if tokens.is_empty() {
            info!("no push tokens registered, skipping daily reminder");
            return Ok(DeliveryReport::default());
        }

        Ok(self
            .multicast_notifications(
                tokens,
                FcmPayload::notification(DAILY_REMINDER_TITLE, Some(DAILY_REMINDER_BODY)),
            )
            .await)
    }

    /// Enqueue the reminder for a new session at start minus ten minutes.
    pub async fn schedule_session_reminder(&self, session: &BookingSession) -> AppResult<Option<String>> {
        let Some(start) = session_start(session) else {
            warn!(session_id = %session.session_id, "session has no parseable start time");
            return Ok(None);
        };

        let mut users = vec![session.owner.clone()];
        for user in session.accepted_users() {
            if !users.contains(&user) {
                users.push(user);
            }
        }
        let tokens = self.tokens_for(&users).await?;
        if tokens.is_empty() {
            return Ok(None);
        }

        let task = self
            .tasks
            .enqueue(TaskRequest {
                function_name: SESSION_REMINDER_FUNCTION.to_string(),
                schedule_time: start - Duration::minutes(REMINDER_LEAD_MINUTES),
                body: Some(json!({ "tokens": tokens, "sessionId": session.session_id })),
            })
            .await?;
        Ok(Some(task))
    }

    /// Tell the owner about join requests and participants added since `before`.
    pub async fn notify_booking_changes(
        &self,
        before: &BookingSession,
        after: &BookingSession,
    ) -> AppResult<Vec<DeliveryReport>> {
        let new_requests = added(&before.requests, &after.requests);
        let new_participants = added(&before.accepted_users(), &after.accepted_users());
        if new_requests.is_empty() && new_participants.is_empty() {
            return Ok(Vec::new());
        }

        let Some(owner_token) = self.profiles.push_token(&after.owner).await? else {
            info!(owner = %after.owner, "session owner has no push token");
            return Ok(Vec::new());
        };

        let mut reports = Vec::new();
        if !new_requests.is_empty() {
            let payload = FcmPayload::notification(JOIN_REQUEST_TITLE, Some(JOIN_REQUEST_BODY))
                .with_data("newUserIds", json!(new_requests).to_string())
                .with_data("sessionId", after.session_id.clone());
            reports.push(self.send_single_notification(&owner_token, payload).await);
        }
        if !new_participants.is_empty() {
            let payload = FcmPayload::notification(PARTICIPANTS_TITLE, Some(PARTICIPANTS_BODY))
                .with_data("newParticipantIds", json!(new_participants).to_string())
                .with_data("sessionId", after.session_id.clone());
            reports.push(self.send_single_notification(&owner_token, payload).await);
        }
        Ok(reports)
    }

    async fn tokens_for(&self, users: &[String]) -> AppResult<Vec<String>> {
        let mut tokens = Vec::new();
        for user in users {
            if let Some(token) = self.profiles.push_token(user).await? {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    fn report(&self, tokens: &[String], batch: &BatchResponse) -> DeliveryReport {
        let report = DeliveryReport::from_batch(tokens, batch);
        if report.failure_count > 0 {
            warn!(failed_tokens = ?report.failed_tokens, "list of tokens that caused failures");
        }
        info!(
            success_count = report.success_count,
            failure_count = report.failure_count,
            "notifications sent"
        );
        report
    }
}

#[async_trait]
impl BookingObserver for NotificationDispatcher {
    async fn on_booking_created(&self, session: &BookingSession) {
        match self.schedule_session_reminder(session).await {
            Ok(Some(task)) => info!(session_id = %session.session_id, task = %task, "session reminder queued"),
            Ok(None) => {}
            Err(e) => error!(session_id = %session.session_id, error = %e, "failed to queue session reminder"),
        }
    }

    async fn on_booking_updated(&self, before: &BookingSession, after: &BookingSession) {
        if let Err(e) = self.notify_booking_changes(before, after).await {
            error!(session_id = %after.session_id, error = %e, "failed to notify booking changes");
        }
    }
}

fn added(before: &[String], after: &[String]) -> Vec<String> {
    after.iter().filter(|id| !before.contains(id)).cloned().collect()
}

/// Start instant, from the epoch field or else the serialized string.
fn session_start(session: &BookingSession) -> Option<DateTime<Utc>> {
    if session.start_time_ms > 0 {
        return DateTime::<Utc>::from_timestamp_millis(session.start_time_ms);
    }
    DateTime::parse_from_rfc2822(&session.start_time)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
